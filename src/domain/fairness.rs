// ==========================================
// 诊所排班系统 - 公平性评分领域模型
// ==========================================
// 职责: (员工, 统计期) 五维偏差
// 说明: 员工表上的 fairness_* 字段只是镜像缓存，不作为数据源
// ==========================================

use crate::domain::types::FairnessDimension;
use serde::{Deserialize, Serialize};

/// 五维数值（次数或偏差）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DimensionValues {
    pub total_days: f64,
    pub night: f64,
    pub weekend: f64,
    pub holiday: f64,
    pub holiday_adjacent: f64,
}

impl DimensionValues {
    pub fn get(&self, dim: FairnessDimension) -> f64 {
        match dim {
            FairnessDimension::TotalDays => self.total_days,
            FairnessDimension::Night => self.night,
            FairnessDimension::Weekend => self.weekend,
            FairnessDimension::Holiday => self.holiday,
            FairnessDimension::HolidayAdjacent => self.holiday_adjacent,
        }
    }

    pub fn get_mut(&mut self, dim: FairnessDimension) -> &mut f64 {
        match dim {
            FairnessDimension::TotalDays => &mut self.total_days,
            FairnessDimension::Night => &mut self.night,
            FairnessDimension::Weekend => &mut self.weekend,
            FairnessDimension::Holiday => &mut self.holiday,
            FairnessDimension::HolidayAdjacent => &mut self.holiday_adjacent,
        }
    }
}

// ==========================================
// FairnessScore - 公平性评分
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessScore {
    pub clinic_id: String,
    pub staff_id: String,
    pub year: i32,
    pub month: u32,
    pub counts: DimensionValues,     // 本期原始次数
    pub deviations: DimensionValues, // 含上期结转的偏差
    pub overall: f64,                // 加权绝对偏差和，越低越公平
}
