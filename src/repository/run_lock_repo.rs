// ==========================================
// 诊所排班系统 - 统计期咨询锁仓储
// ==========================================
// 约束: 同一 (clinic, year, month) 同时仅允许一个持有者
// 说明: 超过 stale_after_secs 的锁视为遗留，可被接管
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{fmt_datetime, parse_datetime_column};
use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct RunLockRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RunLockRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 尝试获取锁
    ///
    /// # 返回
    /// - Ok(true): 获取成功
    /// - Ok(false): 已被其他持有者占用
    pub fn try_acquire(
        &self,
        clinic_id: &str,
        year: i32,
        month: u32,
        holder: &str,
        now: NaiveDateTime,
        stale_after_secs: i64,
    ) -> RepositoryResult<bool> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let stale_before = now - Duration::seconds(stale_after_secs);
        let released = tx.execute(
            "DELETE FROM schedule_run_lock WHERE clinic_id = ?1 AND year = ?2 AND month = ?3 AND acquired_at < ?4",
            params![clinic_id, year, month, fmt_datetime(stale_before)],
        )?;
        if released > 0 {
            tracing::warn!(clinic_id, year, month, "接管遗留的排班锁");
        }

        let inserted = tx.execute(
            r#"
            INSERT OR IGNORE INTO schedule_run_lock (clinic_id, year, month, holder, acquired_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![clinic_id, year, month, holder, fmt_datetime(now)],
        )?;
        tx.commit()?;
        Ok(inserted == 1)
    }

    /// 释放锁（仅释放自己持有的）
    pub fn release(&self, clinic_id: &str, year: i32, month: u32, holder: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM schedule_run_lock WHERE clinic_id = ?1 AND year = ?2 AND month = ?3 AND holder = ?4",
            params![clinic_id, year, month, holder],
        )?;
        Ok(deleted == 1)
    }

    /// 当前持有者
    pub fn current_holder(
        &self,
        clinic_id: &str,
        year: i32,
        month: u32,
    ) -> RepositoryResult<Option<(String, NaiveDateTime)>> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                "SELECT holder, acquired_at FROM schedule_run_lock WHERE clinic_id = ?1 AND year = ?2 AND month = ?3",
                params![clinic_id, year, month],
                |row| {
                    let raw: String = row.get(1)?;
                    Ok((row.get::<_, String>(0)?, parse_datetime_column(1, &raw)?))
                },
            )
            .optional()?;
        Ok(found)
    }
}
