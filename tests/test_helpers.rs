// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、仓储装配、员工/规则/请假/节假日夹具
// ==========================================
#![allow(dead_code)]

use chrono::NaiveDate;
use clinic_shift_scheduler::config::ConfigManager;
use clinic_shift_scheduler::db::{ensure_schema, open_sqlite_connection};
use clinic_shift_scheduler::domain::calendar::Holiday;
use clinic_shift_scheduler::domain::doctor_rule::{DoctorCombination, DoctorSet, StaffRange};
use clinic_shift_scheduler::domain::leave::LeaveRequest;
use clinic_shift_scheduler::domain::staff::{Capability, Staff};
use clinic_shift_scheduler::domain::types::{EmploymentType, LeaveStatus, LeaveType};
use clinic_shift_scheduler::engine::ScheduleRepositories;
use clinic_shift_scheduler::logging;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub const CLINIC: &str = "C1";

/// 测试环境（temp_file 需要保持存活）
pub struct TestEnv {
    pub temp_file: NamedTempFile,
    pub db_path: String,
    pub conn: Arc<Mutex<Connection>>,
    pub repos: ScheduleRepositories,
    pub config: Arc<ConfigManager>,
}

/// 创建临时测试数据库并初始化 schema
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_string_lossy().to_string();
    let conn = open_sqlite_connection(&db_path)?;
    ensure_schema(&conn)?;
    Ok((temp_file, db_path))
}

pub fn setup_env() -> TestEnv {
    logging::init_test();
    let (temp_file, db_path) = create_test_db().unwrap();
    let conn = Arc::new(Mutex::new(open_sqlite_connection(&db_path).unwrap()));
    let repos = ScheduleRepositories::from_connection(conn.clone());
    let config = Arc::new(ConfigManager::from_connection(conn.clone()));
    TestEnv {
        temp_file,
        db_path,
        conn,
        repos,
        config,
    }
}

pub fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn make_staff(id: &str, category: &str, quota: u32) -> Staff {
    Staff {
        staff_id: id.to_string(),
        clinic_id: CLINIC.to_string(),
        name: id.to_string(),
        category_id: category.to_string(),
        weekly_quota: quota,
        capability: Capability::Fixed,
        employment: EmploymentType::FullTime,
        active: true,
    }
}

/// 登记一组同岗位员工: <prefix>1 .. <prefix>n
pub fn seed_staff(repos: &ScheduleRepositories, prefix: &str, category: &str, quota: u32, count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| {
            let id = format!("{}{:02}", prefix, i);
            repos.staff_repo.upsert(&make_staff(&id, category, quota)).unwrap();
            id
        })
        .collect()
}

/// 通配规则（任意医生、任意星期）
pub fn seed_wildcard_rule(repos: &ScheduleRepositories, night: bool, reqs: &[(&str, u32, u32)]) {
    let requirements: BTreeMap<String, StaffRange> = reqs
        .iter()
        .map(|(c, min, max)| (c.to_string(), StaffRange { min: *min, max: *max }))
        .collect();
    repos
        .doctor_rule_repo
        .insert_rule(
            CLINIC,
            &DoctorCombination {
                doctors: DoctorSet::Any,
                day_of_week: None,
                night_shift: night,
                requirements,
            },
        )
        .unwrap();
}

pub fn seed_leave(repos: &ScheduleRepositories, staff_id: &str, date: NaiveDate) {
    repos
        .leave_repo
        .insert(&LeaveRequest {
            request_id: format!("L-{}-{}", staff_id, date),
            clinic_id: CLINIC.to_string(),
            staff_id: staff_id.to_string(),
            leave_date: date,
            leave_type: LeaveType::Annual,
            status: LeaveStatus::Confirmed,
        })
        .unwrap();
}

pub fn seed_holiday(repos: &ScheduleRepositories, date: NaiveDate, closed: bool) {
    repos
        .holiday_repo
        .upsert(
            CLINIC,
            &Holiday {
                holiday_date: date,
                name: "holiday".to_string(),
                closed,
            },
        )
        .unwrap();
}
