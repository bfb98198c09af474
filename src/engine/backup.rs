// ==========================================
// 诊所排班系统 - 周备份服务
// ==========================================
// 范围: 一个自然周（周一至周六）内该诊所的全部排班行，可能跨两个统计期
// 操作: 创建 / 列表 / 与当前状态对比 / 恢复（整体替换，报告恢复条数）
// 并发: 恢复期间持有涉及统计期的锁，运行中的统计期拒绝恢复
// ==========================================

use crate::domain::assignment::Assignment;
use crate::domain::backup::{BackupDiff, WeekBackup, WeekBackupSummary};
use crate::domain::calendar::monday_of;
use crate::domain::types::BackupReason;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::period_lock::PeriodLockGuard;
use crate::engine::repositories::ScheduleRepositories;
use crate::repository::ReplaceOutcome;
use chrono::{Datelike, Duration, Local, NaiveDate};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct BackupService {
    repos: ScheduleRepositories,
}

impl BackupService {
    pub fn new(repos: ScheduleRepositories) -> Self {
        Self { repos }
    }

    /// 自然周区间（周一至周六）
    pub fn week_range(week_start: NaiveDate) -> (NaiveDate, NaiveDate) {
        let monday = monday_of(week_start);
        (monday, monday + Duration::days(5))
    }

    /// 区间涉及的统计期（按时间顺序，去重）
    fn periods_of(start: NaiveDate, end: NaiveDate) -> Vec<(i32, u32)> {
        let mut periods = vec![(start.year(), start.month())];
        if (end.year(), end.month()) != periods[0] {
            periods.push((end.year(), end.month()));
        }
        periods
    }

    /// 创建备份
    #[instrument(skip(self), fields(clinic_id = %clinic_id, week_start = %week_start))]
    pub fn create(
        &self,
        clinic_id: &str,
        week_start: NaiveDate,
        reason: BackupReason,
        created_by: &str,
    ) -> EngineResult<WeekBackup> {
        let (start, end) = Self::week_range(week_start);
        let assignments = self.repos.assignment_repo.find_in_range(clinic_id, start, end)?;
        let backup = WeekBackup {
            backup_id: Uuid::new_v4().to_string(),
            clinic_id: clinic_id.to_string(),
            week_start: start,
            reason,
            created_by: created_by.to_string(),
            created_at: Local::now().naive_local(),
            assignments,
        };
        self.repos.backup_repo.insert(&backup)?;

        info!(
            backup_id = %backup.backup_id,
            reason = %reason,
            record_count = backup.record_count(),
            "周备份已创建"
        );
        Ok(backup)
    }

    pub fn list(&self, clinic_id: &str, week_start: NaiveDate) -> EngineResult<Vec<WeekBackupSummary>> {
        let (start, _) = Self::week_range(week_start);
        Ok(self.repos.backup_repo.list_by_week(clinic_id, start)?)
    }

    fn load(&self, backup_id: &str) -> EngineResult<WeekBackup> {
        self.repos
            .backup_repo
            .find_by_id(backup_id)?
            .ok_or_else(|| EngineError::BackupNotFound(backup_id.to_string()))
    }

    /// 快照与当前状态逐格对比
    pub fn compare(&self, backup_id: &str) -> EngineResult<BackupDiff> {
        let backup = self.load(backup_id)?;
        let (start, end) = Self::week_range(backup.week_start);
        let current = self
            .repos
            .assignment_repo
            .find_in_range(&backup.clinic_id, start, end)?;
        Ok(diff(&backup.assignments, &current))
    }

    /// 恢复备份（整体替换该自然周）
    ///
    /// # 返回
    /// 恢复的行数
    #[instrument(skip(self, stale_after_secs))]
    pub fn restore(&self, backup_id: &str, holder: &str, stale_after_secs: i64) -> EngineResult<usize> {
        let backup = self.load(backup_id)?;
        let (start, end) = Self::week_range(backup.week_start);

        let mut guards = Vec::new();
        for (year, month) in Self::periods_of(start, end) {
            guards.push(PeriodLockGuard::acquire(
                self.repos.run_lock_repo.clone(),
                &backup.clinic_id,
                year,
                month,
                holder,
                stale_after_secs,
            )?);
        }

        let outcome = self.repos.assignment_repo.replace_range_exact(
            &backup.clinic_id,
            start,
            end,
            &backup.assignments,
            backup.record_count(),
        )?;

        for guard in guards {
            guard.release()?;
        }

        match outcome {
            ReplaceOutcome::Written(restored) => {
                info!(backup_id, restored, week_start = %start, "周备份已恢复");
                Ok(restored)
            }
            ReplaceOutcome::CountMismatch { expected, actual } => {
                warn!(backup_id, expected, actual, "备份恢复行数不一致，已回滚");
                Err(EngineError::RestoreMismatch {
                    backup_id: backup_id.to_string(),
                    expected,
                    actual,
                })
            }
        }
    }
}

/// 按 (staff_id, work_date) 对比两组排班
pub fn diff(snapshot: &[Assignment], current: &[Assignment]) -> BackupDiff {
    let key = |a: &Assignment| (a.staff_id.clone(), a.work_date);
    let before: BTreeMap<(String, NaiveDate), &Assignment> = snapshot.iter().map(|a| (key(a), a)).collect();
    let after: BTreeMap<(String, NaiveDate), &Assignment> = current.iter().map(|a| (key(a), a)).collect();

    let mut result = BackupDiff::default();
    for (k, old) in &before {
        match after.get(k) {
            None => result.removed.push((*old).clone()),
            Some(new) if new != old => result.changed.push(((*old).clone(), (*new).clone())),
            Some(_) => {}
        }
    }
    for (k, new) in &after {
        if !before.contains_key(k) {
            result.added.push((*new).clone());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ShiftType;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn setup() -> (BackupService, ScheduleRepositories) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let repos = ScheduleRepositories::from_connection(Arc::new(Mutex::new(conn)));
        (BackupService::new(repos.clone()), repos)
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn row(staff_id: &str, day: u32, shift_type: ShiftType) -> Assignment {
        Assignment {
            clinic_id: "C1".to_string(),
            year: 2025,
            month: 6,
            staff_id: staff_id.to_string(),
            work_date: d(day),
            shift_type,
            category_id: "NURSE".to_string(),
            is_flexible: false,
            is_substitute: false,
        }
    }

    #[test]
    fn test_create_compare_restore_round() {
        let (service, repos) = setup();
        let original = vec![row("S1", 2, ShiftType::Day), row("S1", 3, ShiftType::Off)];
        repos.assignment_repo.replace_range("C1", d(2), d(7), &original).unwrap();

        let backup = service.create("C1", d(4), BackupReason::Manual, "tester").unwrap();
        assert_eq!(backup.week_start, d(2));
        assert_eq!(backup.record_count(), 2);
        assert!(service.compare(&backup.backup_id).unwrap().is_identical());

        // 改动当前状态
        let edited = vec![row("S1", 2, ShiftType::Off), row("S2", 5, ShiftType::Day)];
        repos.assignment_repo.replace_range("C1", d(2), d(7), &edited).unwrap();
        let delta = service.compare(&backup.backup_id).unwrap();
        assert_eq!(delta.changed.len(), 1);
        assert_eq!(delta.removed.len(), 1);
        assert_eq!(delta.added.len(), 1);

        let restored = service.restore(&backup.backup_id, "restore-1", 1800).unwrap();
        assert_eq!(restored, 2);
        assert_eq!(repos.assignment_repo.find_in_range("C1", d(2), d(7)).unwrap(), original);

        let listed = service.list("C1", d(2)).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].reason, BackupReason::Manual);
    }

    #[test]
    fn test_missing_backup_is_reported() {
        let (service, _) = setup();
        assert!(matches!(
            service.compare("nope"),
            Err(EngineError::BackupNotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_restore_is_rejected_while_period_is_locked() {
        let (service, repos) = setup();
        repos
            .assignment_repo
            .replace_range("C1", d(2), d(7), &[row("S1", 2, ShiftType::Day)])
            .unwrap();
        let backup = service.create("C1", d(2), BackupReason::Manual, "tester").unwrap();

        let _run = PeriodLockGuard::acquire(repos.run_lock_repo.clone(), "C1", 2025, 6, "run-1", 1800).unwrap();
        assert!(matches!(
            service.restore(&backup.backup_id, "restore-1", 1800),
            Err(EngineError::ConcurrentRunRejected { .. })
        ));
    }
}
