// ==========================================
// 诊所排班系统 - 员工数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::fairness::FairnessScore;
use crate::domain::staff::{Capability, Staff};
use crate::domain::types::EmploymentType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const STAFF_COLUMNS: &str = "staff_id, clinic_id, name, category_id, weekly_quota, flex_categories, employment_type, active";

// ==========================================
// StaffRepository - 员工仓储
// ==========================================
pub struct StaffRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StaffRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> SqliteResult<Staff> {
        let flex: String = row.get(5)?;
        let employment: String = row.get(6)?;
        Ok(Staff {
            staff_id: row.get(0)?,
            clinic_id: row.get(1)?,
            name: row.get(2)?,
            category_id: row.get(3)?,
            weekly_quota: row.get(4)?,
            capability: Capability::from_csv(&flex),
            employment: EmploymentType::parse(&employment),
            active: row.get::<_, i64>(7)? != 0,
        })
    }

    /// 查询诊所全部员工（含停用/兼职，由引擎自行过滤），按 staff_id 排序
    pub fn find_by_clinic(&self, clinic_id: &str) -> RepositoryResult<Vec<Staff>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM staff WHERE clinic_id = ?1 ORDER BY staff_id",
            STAFF_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let staff = stmt
            .query_map(params![clinic_id], Self::map_row)?
            .collect::<SqliteResult<Vec<Staff>>>()?;
        Ok(staff)
    }

    pub fn find_by_id(&self, staff_id: &str) -> RepositoryResult<Option<Staff>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM staff WHERE staff_id = ?1", STAFF_COLUMNS);
        let staff = conn
            .query_row(&sql, params![staff_id], Self::map_row)
            .optional()?;
        Ok(staff)
    }

    /// 插入或更新员工档案（不触碰公平性镜像字段）
    pub fn upsert(&self, staff: &Staff) -> RepositoryResult<()> {
        if !(1..=6).contains(&staff.weekly_quota) {
            return Err(RepositoryError::FieldValueError {
                field: "weekly_quota".to_string(),
                message: format!("staff_id={} quota={} 超出 1..=6", staff.staff_id, staff.weekly_quota),
            });
        }
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO staff (
                staff_id, clinic_id, name, category_id, weekly_quota,
                flex_categories, employment_type, active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(staff_id) DO UPDATE SET
                clinic_id = excluded.clinic_id,
                name = excluded.name,
                category_id = excluded.category_id,
                weekly_quota = excluded.weekly_quota,
                flex_categories = excluded.flex_categories,
                employment_type = excluded.employment_type,
                active = excluded.active
            "#,
            params![
                staff.staff_id,
                staff.clinic_id,
                staff.name,
                staff.category_id,
                staff.weekly_quota,
                staff.capability.to_csv(),
                staff.employment.as_str(),
                staff.active as i64,
            ],
        )?;
        Ok(())
    }

    /// 覆写员工表上的公平性镜像（缓存，每次运行后整体覆盖）
    ///
    /// 本诊所未出现在 scores 中的员工镜像置空，避免残留旧统计期数据
    ///
    /// # 返回
    /// 更新的员工行数
    pub fn overwrite_fairness_mirror(&self, clinic_id: &str, scores: &[FairnessScore]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            UPDATE staff SET
                fairness_total_days = NULL,
                fairness_night = NULL,
                fairness_weekend = NULL,
                fairness_holiday = NULL,
                fairness_holiday_adjacent = NULL,
                fairness_period = NULL
            WHERE clinic_id = ?1
            "#,
            params![clinic_id],
        )?;
        let mut updated = 0;
        for score in scores {
            updated += tx.execute(
                r#"
                UPDATE staff SET
                    fairness_total_days = ?1,
                    fairness_night = ?2,
                    fairness_weekend = ?3,
                    fairness_holiday = ?4,
                    fairness_holiday_adjacent = ?5,
                    fairness_period = ?6
                WHERE staff_id = ?7 AND clinic_id = ?8
                "#,
                params![
                    score.deviations.total_days,
                    score.deviations.night,
                    score.deviations.weekend,
                    score.deviations.holiday,
                    score.deviations.holiday_adjacent,
                    format!("{:04}-{:02}", score.year, score.month),
                    score.staff_id,
                    clinic_id,
                ],
            )?;
        }
        tx.commit()?;
        Ok(updated)
    }

    /// 读取镜像字段（仅供前端展示/测试核对，引擎不读取）
    pub fn read_fairness_mirror(&self, staff_id: &str) -> RepositoryResult<Option<(f64, String)>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT fairness_total_days, fairness_period FROM staff WHERE staff_id = ?1 AND fairness_period IS NOT NULL",
                params![staff_id],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(value)
    }
}
