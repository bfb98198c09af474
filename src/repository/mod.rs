// ==========================================
// 诊所排班系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod assignment_repo;
pub mod backup_repo;
pub mod doctor_rule_repo;
pub mod error;
pub mod fairness_repo;
pub mod holiday_repo;
pub mod leave_repo;
pub mod run_lock_repo;
pub mod sql_utils;
pub mod staff_repo;

// 重导出核心仓储
pub use assignment_repo::{AssignmentRepository, ReplaceOutcome};
pub use backup_repo::BackupRepository;
pub use doctor_rule_repo::DoctorRuleRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use fairness_repo::FairnessScoreRepository;
pub use holiday_repo::HolidayRepository;
pub use leave_repo::LeaveRequestRepository;
pub use run_lock_repo::RunLockRepository;
pub use staff_repo::StaffRepository;
