// ==========================================
// 诊所排班系统 - 配置层
// ==========================================
// 职责: 排班参数管理，支持诊所级覆写全局
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod schedule_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, ConfigScope};
pub use schedule_config_trait::ScheduleConfigReader;
