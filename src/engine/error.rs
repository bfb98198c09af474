// ==========================================
// 诊所排班系统 - 引擎层错误与告警
// ==========================================
// 错误: 致命，中止当前操作（或当前周的落库）
// 告警: 非致命，收集进运行报告，不影响已提交数据
// ==========================================

use crate::domain::types::{CategoryId, ShiftType};
use crate::engine::validation::ValidationIssue;
use crate::repository::error::RepositoryError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 排班核心 =====
    /// Phase2 之后 OFF 总数与预算不一致，说明翻转逻辑存在缺陷
    #[error(
        "周对账不变量被破坏: week_start={week_start}, expected_off={expected}, actual_off={actual}, {detail}"
    )]
    ReconciliationInvariantViolation {
        week_start: NaiveDate,
        expected: i64,
        actual: i64,
        detail: String,
    },

    #[error("无效的统计期: {year}-{month}")]
    InvalidPeriod { year: i32, month: u32 },

    #[error("营业周不在统计期内: week_start={week_start}, period={year}-{month:02}")]
    WeekNotInPeriod {
        week_start: NaiveDate,
        year: i32,
        month: u32,
    },

    #[error("运行已取消: 已提交 {committed_weeks} 周")]
    Cancelled { committed_weeks: usize },

    // ===== 并发控制 =====
    #[error("同一统计期已有排班在运行: clinic={clinic_id}, period={year}-{month:02}, holder={holder}")]
    ConcurrentRunRejected {
        clinic_id: String,
        year: i32,
        month: u32,
        holder: String,
    },

    // ===== 备份 / 校验 =====
    #[error("备份不存在: backup_id={0}")]
    BackupNotFound(String),

    #[error("备份恢复行数不一致: backup_id={backup_id}, expected={expected}, actual={actual}")]
    RestoreMismatch {
        backup_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("自动修复失败: week_start={week_start}, 剩余问题 {} 项", remaining.len())]
    AutoFixFailed {
        week_start: NaiveDate,
        remaining: Vec<ValidationIssue>,
    },

    // ===== 依赖 =====
    #[error("配置读取失败: {0}")]
    Config(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;

// ==========================================
// EngineWarning - 运行告警
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineWarning {
    /// 当天医生组合无规则可匹配，当天不计入周需求
    UnresolvedDoctorCombination {
        date: NaiveDate,
        doctors: Vec<String>,
        night_shift: bool,
    },

    /// 穷尽合法翻转后员工仍未达到周配额
    QuotaUnmet {
        week_start: NaiveDate,
        staff_id: String,
        expected: u32,
        actual: u32,
    },

    /// 周内各岗位最低需求之和超过全员周出勤目标之和
    WeekUnderstaffed {
        week_start: NaiveDate,
        required_min: u32,
        work_capacity: u32,
    },

    /// Phase1 无法凑够当天某岗位的最低人数
    CoverageShortfall {
        date: NaiveDate,
        category_id: CategoryId,
        shift_type: ShiftType,
        required: u32,
        assigned: u32,
    },
}

impl fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineWarning::UnresolvedDoctorCombination {
                date,
                doctors,
                night_shift,
            } => write!(
                f,
                "医生组合无匹配规则: date={}, doctors=[{}], night={}",
                date,
                doctors.join(","),
                night_shift
            ),
            EngineWarning::QuotaUnmet {
                week_start,
                staff_id,
                expected,
                actual,
            } => write!(
                f,
                "周配额未满足: week_start={}, staff={}, expected={}, actual={}",
                week_start, staff_id, expected, actual
            ),
            EngineWarning::WeekUnderstaffed {
                week_start,
                required_min,
                work_capacity,
            } => write!(
                f,
                "营业周人手不足: week_start={}, required_min={}, work_capacity={}",
                week_start, required_min, work_capacity
            ),
            EngineWarning::CoverageShortfall {
                date,
                category_id,
                shift_type,
                required,
                assigned,
            } => write!(
                f,
                "岗位人手不足: date={}, category={}, shift={}, required={}, assigned={}",
                date, category_id, shift_type, required, assigned
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_message_carries_week_and_counts() {
        let err = EngineError::ReconciliationInvariantViolation {
            week_start: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            expected: 40,
            actual: 41,
            detail: "staff=S07 expected_work=4 actual_work=3".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2025-06-02"));
        assert!(msg.contains("expected_off=40"));
        assert!(msg.contains("actual_off=41"));
        assert!(msg.contains("S07"));
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() {
        let w = EngineWarning::QuotaUnmet {
            week_start: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            staff_id: "S01".to_string(),
            expected: 4,
            actual: 3,
        };
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["kind"], "QUOTA_UNMET");
        assert_eq!(json["staff_id"], "S01");
    }
}
