// ==========================================
// 诊所排班系统 - 引擎层
// ==========================================
// 流程: 日历上下文 → 岗位需求 → Phase1 初始分配 → Phase2 周配额对账
//       → 逐周落库 → 公平性重算 → 周校验
// 红线: 引擎不拼 SQL，数据读写一律经由 ScheduleRepositories
// ==========================================

pub mod allocator;
pub mod backup;
pub mod calendar;
pub mod error;
pub mod fairness;
pub mod orchestrator;
pub mod period_lock;
pub mod reconciler;
pub mod repositories;
pub mod slot_calculator;
pub mod snapshot;
pub mod validation;

// 重导出核心引擎
pub use allocator::{Phase1Allocator, Phase1Result};
pub use backup::BackupService;
pub use calendar::CalendarContextBuilder;
pub use error::{EngineError, EngineResult, EngineWarning};
pub use fairness::{CarriedDeviations, FairnessScorer, FairnessSettings, RankingLedger};
pub use orchestrator::{AutoAssignOrchestrator, CancelFlag, RunOptions, RunReport};
pub use period_lock::PeriodLockGuard;
pub use reconciler::{
    verify_off_budget, Phase2Reconciler, UnmetQuota, WeekLedger, WeekOutcome, WeekReconcileRequest,
    WeekReconciler, WeekTargets,
};
pub use repositories::ScheduleRepositories;
pub use slot_calculator::{DayDemand, SlotDemand, WeekDemandTotals, WeeklySlotCalculator};
pub use snapshot::PeriodSnapshot;
pub use validation::{ValidationIssue, ValidationIssueType, ValidationService, WeekValidationReport};
