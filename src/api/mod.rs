// ==========================================
// 诊所排班系统 - API 层
// ==========================================
// 职责: 对外接口，错误统一转换为 ApiError
// ==========================================

pub mod error;
pub mod schedule_api;

pub use error::{ApiError, ApiResult};
pub use schedule_api::ScheduleApi;
