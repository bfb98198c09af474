// ==========================================
// 诊所排班系统 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合排班引擎所需的所有 Repository
// 目标: 编排器 / 校验 / 备份服务共用同一组仓储与同一条连接
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    AssignmentRepository, BackupRepository, DoctorRuleRepository, FairnessScoreRepository,
    HolidayRepository, LeaveRequestRepository, RunLockRepository, StaffRepository,
};

/// 排班引擎仓储集合
///
/// # 包含的仓储
/// - `staff_repo`: 员工档案与公平性镜像
/// - `doctor_rule_repo`: 医生组合规则与出诊表
/// - `holiday_repo`: 节假日
/// - `leave_repo`: 请假申请
/// - `assignment_repo`: 排班结果
/// - `fairness_repo`: 公平性评分
/// - `backup_repo`: 周备份
/// - `run_lock_repo`: 统计期运行锁
#[derive(Clone)]
pub struct ScheduleRepositories {
    pub staff_repo: Arc<StaffRepository>,
    pub doctor_rule_repo: Arc<DoctorRuleRepository>,
    pub holiday_repo: Arc<HolidayRepository>,
    pub leave_repo: Arc<LeaveRequestRepository>,
    pub assignment_repo: Arc<AssignmentRepository>,
    pub fairness_repo: Arc<FairnessScoreRepository>,
    pub backup_repo: Arc<BackupRepository>,
    pub run_lock_repo: Arc<RunLockRepository>,
}

impl ScheduleRepositories {
    /// 基于共享连接创建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            staff_repo: Arc::new(StaffRepository::new(conn.clone())),
            doctor_rule_repo: Arc::new(DoctorRuleRepository::new(conn.clone())),
            holiday_repo: Arc::new(HolidayRepository::new(conn.clone())),
            leave_repo: Arc::new(LeaveRequestRepository::new(conn.clone())),
            assignment_repo: Arc::new(AssignmentRepository::new(conn.clone())),
            fairness_repo: Arc::new(FairnessScoreRepository::new(conn.clone())),
            backup_repo: Arc::new(BackupRepository::new(conn.clone())),
            run_lock_repo: Arc::new(RunLockRepository::new(conn)),
        }
    }
}
