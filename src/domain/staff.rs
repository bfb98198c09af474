// ==========================================
// 诊所排班系统 - 员工领域模型
// ==========================================
// 职责: 员工档案、周出勤配额、跨岗能力集合
// ==========================================

use crate::domain::types::{CategoryId, EmploymentType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// Capability - 跨岗能力
// ==========================================
// 固定岗位员工只能填补本岗位；机动员工额外携带可填补的岗位集合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "categories", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    Fixed,
    Flexible(BTreeSet<CategoryId>),
}

impl Capability {
    /// 由逗号分隔的岗位列表构造（空串即固定岗位）
    pub fn from_csv(raw: &str) -> Self {
        let set: BTreeSet<CategoryId> = raw
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        if set.is_empty() {
            Capability::Fixed
        } else {
            Capability::Flexible(set)
        }
    }

    pub fn to_csv(&self) -> String {
        match self {
            Capability::Fixed => String::new(),
            Capability::Flexible(set) => set.iter().cloned().collect::<Vec<_>>().join(","),
        }
    }
}

// ==========================================
// Staff - 员工
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    pub staff_id: String,
    pub clinic_id: String,
    pub name: String,
    pub category_id: CategoryId,   // 本岗位
    pub weekly_quota: u32,         // 周出勤天数配额 (4 或 5)
    pub capability: Capability,
    pub employment: EmploymentType,
    pub active: bool,
}

// ==========================================
// Trait: FillCapability
// ==========================================
// 用途: Phase1/Phase2 判断员工能否填补某岗位缺口
pub trait FillCapability {
    /// 是否可以填补该岗位
    fn can_fill(&self, category_id: &str) -> bool;

    /// 填补该岗位是否属于跨岗（isFlexible）
    fn is_cross_category(&self, category_id: &str) -> bool;
}

impl FillCapability for Staff {
    fn can_fill(&self, category_id: &str) -> bool {
        if self.category_id == category_id {
            return true;
        }
        match &self.capability {
            Capability::Fixed => false,
            Capability::Flexible(set) => set.contains(category_id),
        }
    }

    fn is_cross_category(&self, category_id: &str) -> bool {
        self.category_id != category_id && self.can_fill(category_id)
    }
}

impl Staff {
    /// 是否参与自动排班及公平性均值计算
    pub fn is_schedulable(&self) -> bool {
        self.active && self.employment == EmploymentType::FullTime
    }
}
