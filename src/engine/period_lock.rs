// ==========================================
// 诊所排班系统 - 统计期咨询锁
// ==========================================
// 约束: 单写者 / 统计期；并发的第二个运行或备份恢复直接拒绝，不排队
// 释放: 显式 release()，或 Drop 时尽力释放
// ==========================================

use crate::engine::error::{EngineError, EngineResult};
use crate::repository::RunLockRepository;
use chrono::Local;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct PeriodLockGuard {
    repo: Arc<RunLockRepository>,
    clinic_id: String,
    year: i32,
    month: u32,
    holder: String,
    released: bool,
}

impl PeriodLockGuard {
    /// 获取统计期锁
    ///
    /// # 返回
    /// - Err(ConcurrentRunRejected): 已被其他持有者占用（且未超过遗留时限）
    pub fn acquire(
        repo: Arc<RunLockRepository>,
        clinic_id: &str,
        year: i32,
        month: u32,
        holder: &str,
        stale_after_secs: i64,
    ) -> EngineResult<Self> {
        let now = Local::now().naive_local();
        if !repo.try_acquire(clinic_id, year, month, holder, now, stale_after_secs)? {
            let current = repo
                .current_holder(clinic_id, year, month)?
                .map(|(h, _)| h)
                .unwrap_or_default();
            warn!(clinic_id, year, month, holder = %current, "统计期已被占用，拒绝本次操作");
            return Err(EngineError::ConcurrentRunRejected {
                clinic_id: clinic_id.to_string(),
                year,
                month,
                holder: current,
            });
        }

        debug!(clinic_id, year, month, holder, "获取统计期锁");
        Ok(Self {
            repo,
            clinic_id: clinic_id.to_string(),
            year,
            month,
            holder: holder.to_string(),
            released: false,
        })
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn release(mut self) -> EngineResult<()> {
        self.released = true;
        self.repo
            .release(&self.clinic_id, self.year, self.month, &self.holder)?;
        debug!(clinic_id = %self.clinic_id, year = self.year, month = self.month, "释放统计期锁");
        Ok(())
    }
}

impl Drop for PeriodLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self
            .repo
            .release(&self.clinic_id, self.year, self.month, &self.holder)
        {
            warn!(
                clinic_id = %self.clinic_id,
                year = self.year,
                month = self.month,
                error = %e,
                "统计期锁释放失败，将在遗留时限后被接管"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup_repo() -> Arc<RunLockRepository> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        Arc::new(RunLockRepository::new(Arc::new(Mutex::new(conn))))
    }

    #[test]
    fn test_second_holder_is_rejected_until_release() {
        let repo = setup_repo();
        let first = PeriodLockGuard::acquire(repo.clone(), "C1", 2025, 6, "run-1", 1800).unwrap();

        match PeriodLockGuard::acquire(repo.clone(), "C1", 2025, 6, "run-2", 1800) {
            Err(EngineError::ConcurrentRunRejected { holder, .. }) => assert_eq!(holder, "run-1"),
            other => panic!("expected rejection, got {:?}", other.map(|g| g.holder().to_string())),
        }
        // 其他统计期不受影响
        let other_month = PeriodLockGuard::acquire(repo.clone(), "C1", 2025, 7, "run-2", 1800).unwrap();

        first.release().unwrap();
        let second = PeriodLockGuard::acquire(repo.clone(), "C1", 2025, 6, "run-2", 1800).unwrap();
        assert_eq!(second.holder(), "run-2");
        drop(other_month);
    }

    #[test]
    fn test_drop_releases_lock() {
        let repo = setup_repo();
        {
            let _guard = PeriodLockGuard::acquire(repo.clone(), "C1", 2025, 6, "run-1", 1800).unwrap();
        }
        assert!(repo.current_holder("C1", 2025, 6).unwrap().is_none());
    }
}
