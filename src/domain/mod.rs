// ==========================================
// 诊所排班系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod assignment;
pub mod backup;
pub mod calendar;
pub mod doctor_rule;
pub mod fairness;
pub mod leave;
pub mod staff;
pub mod types;

// 重导出核心类型
pub use assignment::{Assignment, GridCell, ScheduleGrid};
pub use backup::{BackupDiff, WeekBackup, WeekBackupSummary};
pub use calendar::{BusinessWeek, CalendarContext, Holiday};
pub use doctor_rule::{DoctorCombination, DoctorDaySchedule, DoctorSet, StaffRange};
pub use fairness::{DimensionValues, FairnessScore};
pub use leave::LeaveRequest;
pub use staff::{Capability, FillCapability, Staff};
pub use types::{
    BackupReason, CategoryId, EmploymentType, FairnessDimension, LeaveStatus, LeaveType, RunMode,
    ShiftType, ValidationMode,
};
