// ==========================================
// 诊所排班系统 - 请假申请仓储
// ==========================================
// 红线: 引擎只读取 CONFIRMED 申请
// ==========================================

use crate::domain::leave::LeaveRequest;
use crate::domain::types::{LeaveStatus, LeaveType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{fmt_date, parse_date_column};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

pub struct LeaveRequestRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LeaveRequestRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> SqliteResult<LeaveRequest> {
        let raw_date: String = row.get(3)?;
        Ok(LeaveRequest {
            request_id: row.get(0)?,
            clinic_id: row.get(1)?,
            staff_id: row.get(2)?,
            leave_date: parse_date_column(3, &raw_date)?,
            leave_type: LeaveType::parse(&row.get::<_, String>(4)?),
            status: LeaveStatus::parse(&row.get::<_, String>(5)?),
        })
    }

    /// 查询区间内已确认的请假，按 (日期, 员工) 排序
    pub fn find_confirmed_in_range(
        &self,
        clinic_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepositoryResult<Vec<LeaveRequest>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT request_id, clinic_id, staff_id, leave_date, leave_type, status
            FROM leave_request
            WHERE clinic_id = ?1
              AND status = 'CONFIRMED'
              AND leave_date BETWEEN ?2 AND ?3
            ORDER BY leave_date, staff_id, request_id
            "#,
        )?;
        let leaves = stmt
            .query_map(
                params![clinic_id, fmt_date(start_date), fmt_date(end_date)],
                Self::map_row,
            )?
            .collect::<SqliteResult<Vec<LeaveRequest>>>()?;
        Ok(leaves)
    }

    pub fn insert(&self, leave: &LeaveRequest) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO leave_request (request_id, clinic_id, staff_id, leave_date, leave_type, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                leave.request_id,
                leave.clinic_id,
                leave.staff_id,
                fmt_date(leave.leave_date),
                leave.leave_type.as_str(),
                leave.status.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn update_status(&self, request_id: &str, status: LeaveStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE leave_request SET status = ?1 WHERE request_id = ?2",
            params![status.as_str(), request_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "LeaveRequest".to_string(),
                id: request_id.to_string(),
            });
        }
        Ok(())
    }
}
