// ==========================================
// 诊所排班系统 - 公平性评分仓储
// ==========================================
// 主键: (clinic_id, staff_id, year, month)
// ==========================================

use crate::domain::fairness::{DimensionValues, FairnessScore};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

pub struct FairnessScoreRepository {
    conn: Arc<Mutex<Connection>>,
}

impl FairnessScoreRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> SqliteResult<FairnessScore> {
        Ok(FairnessScore {
            clinic_id: row.get(0)?,
            staff_id: row.get(1)?,
            year: row.get(2)?,
            month: row.get(3)?,
            counts: DimensionValues {
                total_days: row.get(4)?,
                night: row.get(5)?,
                weekend: row.get(6)?,
                holiday: row.get(7)?,
                holiday_adjacent: row.get(8)?,
            },
            deviations: DimensionValues {
                total_days: row.get(9)?,
                night: row.get(10)?,
                weekend: row.get(11)?,
                holiday: row.get(12)?,
                holiday_adjacent: row.get(13)?,
            },
            overall: row.get(14)?,
        })
    }

    /// 查询某统计期全部评分（按 staff_id 排序）
    pub fn find_by_period(&self, clinic_id: &str, year: i32, month: u32) -> RepositoryResult<Vec<FairnessScore>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                clinic_id, staff_id, year, month,
                count_total_days, count_night, count_weekend, count_holiday, count_holiday_adjacent,
                dev_total_days, dev_night, dev_weekend, dev_holiday, dev_holiday_adjacent,
                overall
            FROM fairness_score
            WHERE clinic_id = ?1 AND year = ?2 AND month = ?3
            ORDER BY staff_id
            "#,
        )?;
        let scores = stmt
            .query_map(params![clinic_id, year, month], Self::map_row)?
            .collect::<SqliteResult<Vec<FairnessScore>>>()?;
        Ok(scores)
    }

    /// 批量 upsert 评分（单事务）
    pub fn upsert_batch(&self, scores: &[FairnessScore]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        for s in scores {
            written += tx.execute(
                r#"
                INSERT INTO fairness_score (
                    clinic_id, staff_id, year, month,
                    count_total_days, count_night, count_weekend, count_holiday, count_holiday_adjacent,
                    dev_total_days, dev_night, dev_weekend, dev_holiday, dev_holiday_adjacent,
                    overall, computed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, datetime('now'))
                ON CONFLICT(clinic_id, staff_id, year, month) DO UPDATE SET
                    count_total_days = excluded.count_total_days,
                    count_night = excluded.count_night,
                    count_weekend = excluded.count_weekend,
                    count_holiday = excluded.count_holiday,
                    count_holiday_adjacent = excluded.count_holiday_adjacent,
                    dev_total_days = excluded.dev_total_days,
                    dev_night = excluded.dev_night,
                    dev_weekend = excluded.dev_weekend,
                    dev_holiday = excluded.dev_holiday,
                    dev_holiday_adjacent = excluded.dev_holiday_adjacent,
                    overall = excluded.overall,
                    computed_at = excluded.computed_at
                "#,
                params![
                    s.clinic_id,
                    s.staff_id,
                    s.year,
                    s.month,
                    s.counts.total_days,
                    s.counts.night,
                    s.counts.weekend,
                    s.counts.holiday,
                    s.counts.holiday_adjacent,
                    s.deviations.total_days,
                    s.deviations.night,
                    s.deviations.weekend,
                    s.deviations.holiday,
                    s.deviations.holiday_adjacent,
                    s.overall,
                ],
            )?;
        }
        tx.commit()?;
        Ok(written)
    }
}
