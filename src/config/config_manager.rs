// ==========================================
// 诊所排班系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 优先级: clinic:<id> > global > 内置默认值
// ==========================================

use crate::config::schedule_config_trait::ScheduleConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::fairness::DimensionValues;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 读取单个作用域的配置值
    fn get_scoped_value(&self, scope: &ConfigScope, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![scope.scope_id(), key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取配置值（诊所级 → 全局）
    pub fn get_value(&self, clinic_id: &str, key: &str) -> ConfigResult<Option<String>> {
        let clinic_scope = ConfigScope::Clinic {
            clinic_id: clinic_id.to_string(),
        };
        if let Some(v) = self.get_scoped_value(&clinic_scope, key)? {
            return Ok(Some(v));
        }
        self.get_scoped_value(&ConfigScope::Global, key)
    }

    /// 读取并解析配置值，缺失时返回默认值；格式错误直接报错，不静默回退
    fn get_parsed_or_default<T>(&self, clinic_id: &str, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_value(clinic_id, key)? {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|e| format!("配置项格式错误: key={}, value={}, err={}", key, raw, e).into()),
            None => Ok(default),
        }
    }

    /// 写入配置值（upsert）
    pub fn set_value(&self, scope: &ConfigScope, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![scope.scope_id(), key, value],
        )?;
        Ok(())
    }

    /// 获取诊所生效配置快照（JSON格式，诊所级已覆盖全局）
    ///
    /// # 用途
    /// - 写入运行日志，便于复盘某次排班使用的参数
    pub fn get_config_snapshot(&self, clinic_id: &str) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT scope_id, key, value FROM config_kv WHERE scope_id IN ('global', ?1) ORDER BY key",
        )?;
        let clinic_scope = ConfigScope::Clinic {
            clinic_id: clinic_id.to_string(),
        }
        .scope_id();

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map(params![clinic_scope], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut clinic_keys = Vec::new();
        for row in rows {
            let (scope_id, key, value) = row?;
            if scope_id == clinic_scope {
                clinic_keys.push(key.clone());
                config_map.insert(key, value);
            } else if !clinic_keys.contains(&key) {
                config_map.entry(key).or_insert(value);
            }
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

#[async_trait]
impl ScheduleConfigReader for ConfigManager {
    async fn get_carry_over_weight(&self, clinic_id: &str) -> ConfigResult<f64> {
        let weight = self.get_parsed_or_default(clinic_id, config_keys::FAIRNESS_CARRY_OVER_WEIGHT, 0.9)?;
        if !(0.0..=1.0).contains(&weight) {
            return Err(format!("fairness_carry_over_weight 必须在 [0, 1] 内: {}", weight).into());
        }
        Ok(weight)
    }

    async fn get_dimension_weights(&self, clinic_id: &str) -> ConfigResult<DimensionValues> {
        Ok(DimensionValues {
            total_days: self.get_parsed_or_default(clinic_id, config_keys::FAIRNESS_WEIGHT_TOTAL, 1.0)?,
            night: self.get_parsed_or_default(clinic_id, config_keys::FAIRNESS_WEIGHT_NIGHT, 1.5)?,
            weekend: self.get_parsed_or_default(clinic_id, config_keys::FAIRNESS_WEIGHT_WEEKEND, 1.2)?,
            holiday: self.get_parsed_or_default(clinic_id, config_keys::FAIRNESS_WEIGHT_HOLIDAY, 2.0)?,
            holiday_adjacent: self.get_parsed_or_default(
                clinic_id,
                config_keys::FAIRNESS_WEIGHT_HOLIDAY_ADJACENT,
                1.0,
            )?,
        })
    }

    async fn get_phase2_max_passes(&self, clinic_id: &str) -> ConfigResult<usize> {
        self.get_parsed_or_default(clinic_id, config_keys::PHASE2_MAX_PASSES, 64)
    }

    async fn get_run_lock_stale_secs(&self, clinic_id: &str) -> ConfigResult<i64> {
        self.get_parsed_or_default(clinic_id, config_keys::RUN_LOCK_STALE_SECS, 1800)
    }

    async fn get_full_week_days(&self, clinic_id: &str) -> ConfigResult<u32> {
        let days = self.get_parsed_or_default(clinic_id, config_keys::FULL_WEEK_DAYS, 6)?;
        if days == 0 || days > 6 {
            return Err(format!("full_week_days 必须在 1..=6 内: {}", days).into());
        }
        Ok(days)
    }

    async fn get_effective_config(&self, clinic_id: &str) -> ConfigResult<String> {
        self.get_config_snapshot(clinic_id)
    }
}

// ==========================================
// ConfigScope - 配置作用域
// ==========================================
#[derive(Debug, Clone)]
pub enum ConfigScope {
    Global,                        // 全局
    Clinic { clinic_id: String },  // 诊所
}

impl ConfigScope {
    pub fn scope_id(&self) -> String {
        match self {
            ConfigScope::Global => "global".to_string(),
            ConfigScope::Clinic { clinic_id } => format!("clinic:{}", clinic_id),
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 公平性
    pub const FAIRNESS_CARRY_OVER_WEIGHT: &str = "fairness_carry_over_weight";
    pub const FAIRNESS_WEIGHT_TOTAL: &str = "fairness_weight_total";
    pub const FAIRNESS_WEIGHT_NIGHT: &str = "fairness_weight_night";
    pub const FAIRNESS_WEIGHT_WEEKEND: &str = "fairness_weight_weekend";
    pub const FAIRNESS_WEIGHT_HOLIDAY: &str = "fairness_weight_holiday";
    pub const FAIRNESS_WEIGHT_HOLIDAY_ADJACENT: &str = "fairness_weight_holiday_adjacent";

    // 引擎
    pub const PHASE2_MAX_PASSES: &str = "phase2_max_passes";
    pub const RUN_LOCK_STALE_SECS: &str = "run_lock_stale_secs";
    pub const FULL_WEEK_DAYS: &str = "full_week_days";
}
