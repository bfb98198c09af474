// ==========================================
// 诊所排班系统 - 周排班备份领域模型
// ==========================================

use crate::domain::assignment::Assignment;
use crate::domain::types::BackupReason;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// WeekBackup - 单个营业周的完整快照
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekBackup {
    pub backup_id: String,
    pub clinic_id: String,
    pub week_start: NaiveDate,
    pub reason: BackupReason,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub assignments: Vec<Assignment>,
}

impl WeekBackup {
    pub fn record_count(&self) -> usize {
        self.assignments.len()
    }
}

/// 备份列表摘要（不含明细）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekBackupSummary {
    pub backup_id: String,
    pub clinic_id: String,
    pub week_start: NaiveDate,
    pub reason: BackupReason,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub record_count: usize,
}

// ==========================================
// BackupDiff - 快照与当前状态对比
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupDiff {
    pub added: Vec<Assignment>,                  // 当前有、快照无
    pub removed: Vec<Assignment>,                // 快照有、当前无
    pub changed: Vec<(Assignment, Assignment)>,  // (快照, 当前)
}

impl BackupDiff {
    pub fn is_identical(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}
