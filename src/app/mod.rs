// ==========================================
// 诊所排班系统 - 应用层
// ==========================================
// 职责: 连接与 API 装配
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
