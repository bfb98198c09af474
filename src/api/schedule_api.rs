// ==========================================
// 诊所排班系统 - 排班 API
// ==========================================
// 职责: 面向管理前端的薄门面
//   - 自动排班 / 清空统计期
//   - 周校验（巡检或自动修复）
//   - 周备份 创建 / 列表 / 对比 / 恢复
//   - 公平性报表
// 约束: 写操作一律在统计期锁内进行
// ==========================================

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, ScheduleConfigReader};
use crate::domain::backup::{BackupDiff, WeekBackup, WeekBackupSummary};
use crate::domain::fairness::FairnessScore;
use crate::domain::types::{BackupReason, ValidationMode};
use crate::engine::{
    AutoAssignOrchestrator, BackupService, CancelFlag, PeriodLockGuard, RunOptions, RunReport,
    ScheduleRepositories, ValidationService, WeekValidationReport,
};

// ==========================================
// ScheduleApi
// ==========================================
pub struct ScheduleApi {
    repos: ScheduleRepositories,
    config: Arc<ConfigManager>,
    orchestrator: AutoAssignOrchestrator<ConfigManager>,
}

impl ScheduleApi {
    pub fn new(repos: ScheduleRepositories, config: Arc<ConfigManager>) -> Self {
        let orchestrator = AutoAssignOrchestrator::new(config.clone(), repos.clone());
        Self {
            repos,
            config,
            orchestrator,
        }
    }

    /// 使用自定义编排器（例如替换了 Phase2 实现）
    pub fn with_orchestrator(mut self, orchestrator: AutoAssignOrchestrator<ConfigManager>) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    async fn stale_secs(&self, clinic_id: &str) -> ApiResult<i64> {
        self.config
            .get_run_lock_stale_secs(clinic_id)
            .await
            .map_err(|e| ApiError::ConfigError(e.to_string()))
    }

    async fn full_week_days(&self, clinic_id: &str) -> ApiResult<u32> {
        self.config
            .get_full_week_days(clinic_id)
            .await
            .map_err(|e| ApiError::ConfigError(e.to_string()))
    }

    fn holder(prefix: &str) -> String {
        format!("{}-{}", prefix, Uuid::new_v4())
    }

    // ==========================================
    // 自动排班
    // ==========================================

    pub async fn run_auto_assign(
        &self,
        clinic_id: &str,
        year: i32,
        month: u32,
        options: RunOptions,
        cancel: &CancelFlag,
    ) -> ApiResult<RunReport> {
        Ok(self.orchestrator.run(clinic_id, year, month, options, cancel).await?)
    }

    /// 清空统计期排班
    ///
    /// # 返回
    /// 删除的行数
    pub async fn clear_schedule(&self, clinic_id: &str, year: i32, month: u32) -> ApiResult<usize> {
        if !(1..=12).contains(&month) {
            return Err(ApiError::InvalidInput(format!("无效的月份: {}", month)));
        }
        let stale = self.stale_secs(clinic_id).await?;
        let lock = PeriodLockGuard::acquire(
            self.repos.run_lock_repo.clone(),
            clinic_id,
            year,
            month,
            &Self::holder("clear"),
            stale,
        )?;
        let deleted = self.repos.assignment_repo.delete_period(clinic_id, year, month)?;
        lock.release()?;

        info!(clinic_id, year, month, deleted, "统计期排班已清空");
        Ok(deleted)
    }

    // ==========================================
    // 周校验
    // ==========================================

    /// 校验营业周；自动修复模式会写库，因此需要持有统计期锁
    pub async fn validate_week(
        &self,
        clinic_id: &str,
        year: i32,
        month: u32,
        week_start: NaiveDate,
        mode: ValidationMode,
    ) -> ApiResult<WeekValidationReport> {
        let full_week_days = self.full_week_days(clinic_id).await?;
        let lock = match mode {
            ValidationMode::AutoFix => Some(PeriodLockGuard::acquire(
                self.repos.run_lock_repo.clone(),
                clinic_id,
                year,
                month,
                &Self::holder("validate"),
                self.stale_secs(clinic_id).await?,
            )?),
            ValidationMode::PeriodicCheck => None,
        };

        let report = ValidationService::new(self.repos.clone()).validate_week(
            clinic_id,
            year,
            month,
            week_start,
            mode,
            full_week_days,
        );
        if let Some(lock) = lock {
            lock.release()?;
        }
        Ok(report?)
    }

    // ==========================================
    // 周备份
    // ==========================================

    pub fn create_backup(&self, clinic_id: &str, week_start: NaiveDate, created_by: &str) -> ApiResult<WeekBackup> {
        Ok(BackupService::new(self.repos.clone()).create(clinic_id, week_start, BackupReason::Manual, created_by)?)
    }

    pub fn list_backups(&self, clinic_id: &str, week_start: NaiveDate) -> ApiResult<Vec<WeekBackupSummary>> {
        Ok(BackupService::new(self.repos.clone()).list(clinic_id, week_start)?)
    }

    pub fn compare_backup(&self, backup_id: &str) -> ApiResult<BackupDiff> {
        Ok(BackupService::new(self.repos.clone()).compare(backup_id)?)
    }

    /// 恢复备份
    ///
    /// # 返回
    /// 恢复的行数
    pub async fn restore_backup(&self, clinic_id: &str, backup_id: &str) -> ApiResult<usize> {
        let stale = self.stale_secs(clinic_id).await?;
        let service = BackupService::new(self.repos.clone());
        Ok(service.restore(backup_id, &Self::holder("restore"), stale)?)
    }

    // ==========================================
    // 公平性报表
    // ==========================================

    pub fn get_fairness_report(&self, clinic_id: &str, year: i32, month: u32) -> ApiResult<Vec<FairnessScore>> {
        let mut scores = self.repos.fairness_repo.find_by_period(clinic_id, year, month)?;
        scores.sort_by(|a, b| b.overall.total_cmp(&a.overall).then_with(|| a.staff_id.cmp(&b.staff_id)));
        Ok(scores)
    }
}
