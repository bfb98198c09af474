// ==========================================
// 诊所排班系统 - 应用状态
// ==========================================
// 职责: 打开唯一一条共享连接，装配仓储、配置与 API
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::ScheduleApi;
use crate::config::ConfigManager;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::ScheduleRepositories;

/// 应用状态
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 排班API
    pub schedule_api: Arc<ScheduleApi>,

    /// 配置管理器（写配置时直接使用）
    pub config_manager: Arc<ConfigManager>,

    /// 仓储集合（数据维护、测试夹具）
    pub repos: ScheduleRepositories,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 返回
    /// - Err(String): 数据库打开或建表失败
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!(db_path = %db_path, "初始化AppState");

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        let repos = ScheduleRepositories::from_connection(conn.clone());
        let config_manager = Arc::new(ConfigManager::from_connection(conn));
        let schedule_api = Arc::new(ScheduleApi::new(repos.clone(), config_manager.clone()));

        tracing::info!("AppState初始化完成");
        Ok(Self {
            db_path,
            schedule_api,
            config_manager,
            repos,
        })
    }
}

/// 默认数据库路径
///
/// 优先级: 环境变量 CLINIC_SHIFT_DB_PATH → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("CLINIC_SHIFT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./clinic_shift.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("clinic-shift-scheduler");
        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("clinic_shift.db");
        }
    }
    path.to_string_lossy().to_string()
}
