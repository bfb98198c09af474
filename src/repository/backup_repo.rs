// ==========================================
// 诊所排班系统 - 周备份仓储
// ==========================================
// 存储: 快照明细以 JSON 存放于 payload_json
// ==========================================

use crate::domain::assignment::Assignment;
use crate::domain::backup::{WeekBackup, WeekBackupSummary};
use crate::domain::types::BackupReason;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{
    fmt_date, fmt_datetime, invalid_enum, parse_date_column, parse_datetime_column,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

pub struct BackupRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BackupRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_summary(row: &Row) -> SqliteResult<WeekBackupSummary> {
        let raw_week: String = row.get(2)?;
        let raw_reason: String = row.get(3)?;
        let raw_created: String = row.get(5)?;
        Ok(WeekBackupSummary {
            backup_id: row.get(0)?,
            clinic_id: row.get(1)?,
            week_start: parse_date_column(2, &raw_week)?,
            reason: BackupReason::parse(&raw_reason).ok_or_else(|| invalid_enum(3, &raw_reason))?,
            created_by: row.get(4)?,
            created_at: parse_datetime_column(5, &raw_created)?,
            record_count: row.get::<_, i64>(6)? as usize,
        })
    }

    pub fn insert(&self, backup: &WeekBackup) -> RepositoryResult<()> {
        let payload = serde_json::to_string(&backup.assignments)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO week_backup (
                backup_id, clinic_id, week_start, reason, created_by, created_at, record_count, payload_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                backup.backup_id,
                backup.clinic_id,
                fmt_date(backup.week_start),
                backup.reason.as_str(),
                backup.created_by,
                fmt_datetime(backup.created_at),
                backup.record_count() as i64,
                payload,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, backup_id: &str) -> RepositoryResult<Option<WeekBackup>> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                r#"
                SELECT backup_id, clinic_id, week_start, reason, created_by, created_at, record_count, payload_json
                FROM week_backup
                WHERE backup_id = ?1
                "#,
                params![backup_id],
                |row| Ok((Self::map_summary(row)?, row.get::<_, String>(7)?)),
            )
            .optional()?;

        match found {
            Some((summary, payload)) => {
                let assignments: Vec<Assignment> = serde_json::from_str(&payload)?;
                if assignments.len() != summary.record_count {
                    return Err(RepositoryError::ValidationError(format!(
                        "备份明细数与记录数不一致: backup_id={}, record_count={}, payload={}",
                        summary.backup_id,
                        summary.record_count,
                        assignments.len()
                    )));
                }
                Ok(Some(WeekBackup {
                    backup_id: summary.backup_id,
                    clinic_id: summary.clinic_id,
                    week_start: summary.week_start,
                    reason: summary.reason,
                    created_by: summary.created_by,
                    created_at: summary.created_at,
                    assignments,
                }))
            }
            None => Ok(None),
        }
    }

    /// 列出某营业周的备份（新→旧）
    pub fn list_by_week(&self, clinic_id: &str, week_start: NaiveDate) -> RepositoryResult<Vec<WeekBackupSummary>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT backup_id, clinic_id, week_start, reason, created_by, created_at, record_count
            FROM week_backup
            WHERE clinic_id = ?1 AND week_start = ?2
            ORDER BY created_at DESC, backup_id DESC
            "#,
        )?;
        let list = stmt
            .query_map(params![clinic_id, fmt_date(week_start)], Self::map_summary)?
            .collect::<SqliteResult<Vec<WeekBackupSummary>>>()?;
        Ok(list)
    }
}
