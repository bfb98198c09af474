// ==========================================
// 诊所排班系统 - 排班记录仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 约束: 主键 (clinic_id, staff_id, work_date)，写入一律 upsert
// 约束: 按周整批提交（单事务），不存在“半周”落库
// ==========================================

use crate::domain::assignment::Assignment;
use crate::domain::types::ShiftType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{fmt_date, invalid_enum, parse_date_column};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Result as SqliteResult, Row, Transaction};
use std::sync::{Arc, Mutex};

const ASSIGNMENT_COLUMNS: &str =
    "clinic_id, year, month, staff_id, work_date, shift_type, category_id, is_flexible, is_substitute";

/// 带行数核对的替换结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Written(usize),
    CountMismatch { expected: usize, actual: usize },
}

pub struct AssignmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AssignmentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> SqliteResult<Assignment> {
        let raw_date: String = row.get(4)?;
        let raw_shift: String = row.get(5)?;
        Ok(Assignment {
            clinic_id: row.get(0)?,
            year: row.get(1)?,
            month: row.get(2)?,
            staff_id: row.get(3)?,
            work_date: parse_date_column(4, &raw_date)?,
            shift_type: ShiftType::parse(&raw_shift).ok_or_else(|| invalid_enum(5, &raw_shift))?,
            category_id: row.get(6)?,
            is_flexible: row.get::<_, i64>(7)? != 0,
            is_substitute: row.get::<_, i64>(8)? != 0,
        })
    }

    /// 查询日期区间内的排班（按日期、员工排序）
    pub fn find_in_range(
        &self,
        clinic_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepositoryResult<Vec<Assignment>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}
            FROM shift_assignment
            WHERE clinic_id = ?1 AND work_date BETWEEN ?2 AND ?3
            ORDER BY work_date, staff_id
            "#,
            ASSIGNMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![clinic_id, fmt_date(start_date), fmt_date(end_date)],
                Self::map_row,
            )?
            .collect::<SqliteResult<Vec<Assignment>>>()?;
        Ok(rows)
    }

    /// 查询整个统计期的排班
    pub fn find_by_period(&self, clinic_id: &str, year: i32, month: u32) -> RepositoryResult<Vec<Assignment>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}
            FROM shift_assignment
            WHERE clinic_id = ?1 AND year = ?2 AND month = ?3
            ORDER BY work_date, staff_id
            "#,
            ASSIGNMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![clinic_id, year, month], Self::map_row)?
            .collect::<SqliteResult<Vec<Assignment>>>()?;
        Ok(rows)
    }

    pub fn count_by_period(&self, clinic_id: &str, year: i32, month: u32) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM shift_assignment WHERE clinic_id = ?1 AND year = ?2 AND month = ?3",
            params![clinic_id, year, month],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// 整体替换日期区间内的排班（单事务）
    ///
    /// 先删除区间内全部行，再逐行 upsert；任一步失败整体回滚
    ///
    /// # 返回
    /// 写入的行数
    pub fn replace_range(
        &self,
        clinic_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        rows: &[Assignment],
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM shift_assignment WHERE clinic_id = ?1 AND work_date BETWEEN ?2 AND ?3",
            params![clinic_id, fmt_date(start_date), fmt_date(end_date)],
        )?;

        let mut written = 0;
        for row in rows {
            if row.clinic_id != clinic_id || row.work_date < start_date || row.work_date > end_date {
                return Err(RepositoryError::ValidationError(format!(
                    "排班行越界: clinic={}, staff={}, date={}",
                    row.clinic_id, row.staff_id, row.work_date
                )));
            }
            written += Self::upsert_in_tx(&tx, row)?;
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(written)
    }

    /// 整体替换并核对写入后区间内的行数，不一致则回滚
    ///
    /// 用于备份恢复：载荷中若有重复键，upsert 会合并成一行，行数随之对不上
    pub fn replace_range_exact(
        &self,
        clinic_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        rows: &[Assignment],
        expected_count: usize,
    ) -> RepositoryResult<ReplaceOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM shift_assignment WHERE clinic_id = ?1 AND work_date BETWEEN ?2 AND ?3",
            params![clinic_id, fmt_date(start_date), fmt_date(end_date)],
        )?;
        for row in rows {
            if row.clinic_id != clinic_id || row.work_date < start_date || row.work_date > end_date {
                return Err(RepositoryError::ValidationError(format!(
                    "排班行越界: clinic={}, staff={}, date={}",
                    row.clinic_id, row.staff_id, row.work_date
                )));
            }
            Self::upsert_in_tx(&tx, row)?;
        }

        let actual: i64 = tx.query_row(
            "SELECT COUNT(*) FROM shift_assignment WHERE clinic_id = ?1 AND work_date BETWEEN ?2 AND ?3",
            params![clinic_id, fmt_date(start_date), fmt_date(end_date)],
            |row| row.get(0),
        )?;
        let actual = actual as usize;
        if actual != expected_count {
            // tx 未提交，drop 时回滚
            return Ok(ReplaceOutcome::CountMismatch {
                expected: expected_count,
                actual,
            });
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(ReplaceOutcome::Written(actual))
    }

    fn upsert_in_tx(tx: &Transaction, row: &Assignment) -> RepositoryResult<usize> {
        let affected = tx.execute(
            r#"
            INSERT INTO shift_assignment (
                clinic_id, year, month, staff_id, work_date, shift_type,
                category_id, is_flexible, is_substitute, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))
            ON CONFLICT(clinic_id, staff_id, work_date) DO UPDATE SET
                year = excluded.year,
                month = excluded.month,
                shift_type = excluded.shift_type,
                category_id = excluded.category_id,
                is_flexible = excluded.is_flexible,
                is_substitute = excluded.is_substitute,
                updated_at = excluded.updated_at
            "#,
            params![
                row.clinic_id,
                row.year,
                row.month,
                row.staff_id,
                fmt_date(row.work_date),
                row.shift_type.as_str(),
                row.category_id,
                row.is_flexible as i64,
                row.is_substitute as i64,
            ],
        )?;
        Ok(affected)
    }

    /// 清空统计期排班
    pub fn delete_period(&self, clinic_id: &str, year: i32, month: u32) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM shift_assignment WHERE clinic_id = ?1 AND year = ?2 AND month = ?3",
            params![clinic_id, year, month],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests;
