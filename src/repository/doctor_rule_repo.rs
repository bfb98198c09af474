// ==========================================
// 诊所排班系统 - 医生组合规则 / 出诊表仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 存储: doctor_combination 每行一个岗位要求，读取时按 (医生集合, 星期, 夜诊) 聚合
// ==========================================

use crate::domain::doctor_rule::{
    weekday_from_number, DoctorCombination, DoctorDaySchedule, DoctorSet, StaffRange,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_utils::{fmt_date, parse_date_column};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Result as SqliteResult};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

pub struct DoctorRuleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DoctorRuleRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 医生组合规则
    // ==========================================

    /// 查询诊所全部组合规则
    pub fn find_rules(&self, clinic_id: &str) -> RepositoryResult<Vec<DoctorCombination>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT doctor_key, day_of_week, night_shift, category_id, min_staff, max_staff
            FROM doctor_combination
            WHERE clinic_id = ?1
            ORDER BY doctor_key, day_of_week, night_shift, category_id
            "#,
        )?;

        let rows = stmt
            .query_map(params![clinic_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<u32>>(1)?,
                    row.get::<_, i64>(2)? != 0,
                    row.get::<_, String>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, u32>(5)?,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut grouped: BTreeMap<(String, Option<u32>, bool), DoctorCombination> = BTreeMap::new();
        for (doctor_key, dow, night, category_id, min, max) in rows {
            let day_of_week = match dow {
                Some(n) => Some(weekday_from_number(n).ok_or_else(|| RepositoryError::FieldValueError {
                    field: "day_of_week".to_string(),
                    message: format!("无效星期: {}", n),
                })?),
                None => None,
            };
            let rule = grouped
                .entry((doctor_key.clone(), dow, night))
                .or_insert_with(|| DoctorCombination {
                    doctors: DoctorSet::from_key(&doctor_key),
                    day_of_week,
                    night_shift: night,
                    requirements: BTreeMap::new(),
                });
            rule.requirements.insert(category_id, StaffRange { min, max });
        }

        Ok(grouped.into_values().collect())
    }

    /// 写入一条组合规则（每个岗位一行）
    pub fn insert_rule(&self, clinic_id: &str, rule: &DoctorCombination) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let doctor_key = rule.doctors.to_key();
        let dow = rule.day_of_week.map(|d| d.number_from_monday());
        let mut inserted = 0;
        for (category_id, range) in &rule.requirements {
            inserted += tx.execute(
                r#"
                INSERT INTO doctor_combination (
                    clinic_id, doctor_key, day_of_week, night_shift, category_id, min_staff, max_staff
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    clinic_id,
                    doctor_key,
                    dow,
                    rule.night_shift as i64,
                    category_id,
                    range.min,
                    range.max
                ],
            )?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    // ==========================================
    // 医生出诊表
    // ==========================================

    /// 查询日期区间内每天的出诊医生（无医生出诊的日期不出现在结果中）
    pub fn find_schedules(
        &self,
        clinic_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepositoryResult<BTreeMap<NaiveDate, DoctorDaySchedule>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT work_date, doctor_id, night_shift
            FROM doctor_schedule
            WHERE clinic_id = ?1 AND work_date BETWEEN ?2 AND ?3
            ORDER BY work_date, doctor_id
            "#,
        )?;

        let rows = stmt
            .query_map(params![clinic_id, fmt_date(start_date), fmt_date(end_date)], |row| {
                let raw: String = row.get(0)?;
                Ok((
                    parse_date_column(0, &raw)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? != 0,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut schedules: BTreeMap<NaiveDate, DoctorDaySchedule> = BTreeMap::new();
        for (date, doctor_id, night) in rows {
            let entry = schedules.entry(date).or_insert_with(|| DoctorDaySchedule {
                work_date: date,
                day_doctors: BTreeSet::new(),
                night_doctors: BTreeSet::new(),
            });
            if night {
                entry.night_doctors.insert(doctor_id.clone());
            }
            entry.day_doctors.insert(doctor_id);
        }
        Ok(schedules)
    }

    /// 登记医生出诊
    pub fn upsert_schedule(
        &self,
        clinic_id: &str,
        work_date: NaiveDate,
        doctor_id: &str,
        night_shift: bool,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO doctor_schedule (clinic_id, work_date, doctor_id, night_shift)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(clinic_id, work_date, doctor_id) DO UPDATE SET night_shift = excluded.night_shift
            "#,
            params![clinic_id, fmt_date(work_date), doctor_id, night_shift as i64],
        )?;
        Ok(())
    }
}
