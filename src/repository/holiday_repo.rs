// ==========================================
// 诊所排班系统 - 节假日仓储
// ==========================================
// 说明: clinic_id='*' 为全局节假日，诊所级记录覆盖同日全局记录
// ==========================================

use crate::domain::calendar::Holiday;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{fmt_date, parse_date_column};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Result as SqliteResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// 全局节假日的 clinic_id
pub const GLOBAL_HOLIDAY_SCOPE: &str = "*";

pub struct HolidayRepository {
    conn: Arc<Mutex<Connection>>,
}

impl HolidayRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询区间内节假日（诊所级优先于全局）
    pub fn find_in_range(
        &self,
        clinic_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepositoryResult<Vec<Holiday>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT holiday_date, name, closed, clinic_id
            FROM holiday
            WHERE clinic_id IN (?1, ?2) AND holiday_date BETWEEN ?3 AND ?4
            ORDER BY holiday_date
            "#,
        )?;

        let rows = stmt
            .query_map(
                params![clinic_id, GLOBAL_HOLIDAY_SCOPE, fmt_date(start_date), fmt_date(end_date)],
                |row| {
                    let raw: String = row.get(0)?;
                    Ok((
                        Holiday {
                            holiday_date: parse_date_column(0, &raw)?,
                            name: row.get(1)?,
                            closed: row.get::<_, i64>(2)? != 0,
                        },
                        row.get::<_, String>(3)? != GLOBAL_HOLIDAY_SCOPE,
                    ))
                },
            )?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut by_date: BTreeMap<NaiveDate, (Holiday, bool)> = BTreeMap::new();
        for (holiday, clinic_specific) in rows {
            match by_date.get(&holiday.holiday_date) {
                Some((_, true)) if !clinic_specific => {}
                _ => {
                    by_date.insert(holiday.holiday_date, (holiday, clinic_specific));
                }
            }
        }
        Ok(by_date.into_values().map(|(h, _)| h).collect())
    }

    pub fn upsert(&self, clinic_id: &str, holiday: &Holiday) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO holiday (clinic_id, holiday_date, name, closed)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(clinic_id, holiday_date) DO UPDATE SET
                name = excluded.name,
                closed = excluded.closed
            "#,
            params![clinic_id, fmt_date(holiday.holiday_date), holiday.name, holiday.closed as i64],
        )?;
        Ok(())
    }
}
