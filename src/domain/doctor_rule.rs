// ==========================================
// 诊所排班系统 - 医生组合规则领域模型
// ==========================================
// 职责: 出诊医生组合 → 各岗位最少/最多人数
// 键: (排序后的医生集合, 星期, 是否夜诊)
// ==========================================

use crate::domain::types::CategoryId;
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 通配医生集合在库中的存储值
pub const ANY_DOCTOR_KEY: &str = "*";

// ==========================================
// DoctorSet - 医生集合匹配条件
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoctorSet {
    Exact(BTreeSet<String>),
    Any,
}

impl DoctorSet {
    /// 解析库中存储的 doctor_key（"*" 或逗号分隔的医生ID）
    pub fn from_key(key: &str) -> Self {
        if key.trim() == ANY_DOCTOR_KEY {
            return DoctorSet::Any;
        }
        DoctorSet::Exact(
            key.split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
        )
    }

    pub fn to_key(&self) -> String {
        match self {
            DoctorSet::Any => ANY_DOCTOR_KEY.to_string(),
            DoctorSet::Exact(set) => set.iter().cloned().collect::<Vec<_>>().join(","),
        }
    }
}

// ==========================================
// StaffRange - 人数区间
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffRange {
    pub min: u32,
    pub max: u32,
}

// ==========================================
// DoctorCombination - 医生组合规则
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorCombination {
    pub doctors: DoctorSet,
    pub day_of_week: Option<Weekday>, // None = 任意星期
    pub night_shift: bool,
    pub requirements: BTreeMap<CategoryId, StaffRange>,
}

impl DoctorCombination {
    /// 规则是否适用于当天
    pub fn matches(&self, doctors: &BTreeSet<String>, weekday: Weekday, night_shift: bool) -> bool {
        if self.night_shift != night_shift {
            return false;
        }
        if let Some(dow) = self.day_of_week {
            if dow != weekday {
                return false;
            }
        }
        match &self.doctors {
            DoctorSet::Any => true,
            DoctorSet::Exact(set) => set == doctors,
        }
    }

    /// 特异度: 精确医生集合 > 指定星期
    ///
    /// 3 = 精确集合 + 指定星期, 2 = 精确集合, 1 = 通配 + 指定星期, 0 = 全通配
    pub fn specificity(&self) -> u8 {
        let set_score = match self.doctors {
            DoctorSet::Exact(_) => 2,
            DoctorSet::Any => 0,
        };
        let dow_score = if self.day_of_week.is_some() { 1 } else { 0 };
        set_score + dow_score
    }
}

// ==========================================
// DoctorDaySchedule - 单日出诊情况
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorDaySchedule {
    pub work_date: NaiveDate,
    pub day_doctors: BTreeSet<String>,   // 当天出诊的全部医生
    pub night_doctors: BTreeSet<String>, // 其中参加夜诊的医生
}

impl DoctorDaySchedule {
    pub fn has_night_session(&self) -> bool {
        !self.night_doctors.is_empty()
    }
}

/// 星期 ↔ 数字（1=周一 … 7=周日）
pub fn weekday_from_number(n: u32) -> Option<Weekday> {
    match n {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        7 => Some(Weekday::Sun),
        _ => None,
    }
}
