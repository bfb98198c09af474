// ==========================================
// 诊所排班系统 - 排班配置读取 Trait
// ==========================================
// 职责: 定义引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::fairness::DimensionValues;
use async_trait::async_trait;
use std::error::Error;

// ==========================================
// ScheduleConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取，诊所级覆盖全局）
#[async_trait]
pub trait ScheduleConfigReader: Send + Sync {
    /// 上期偏差结转系数
    ///
    /// # 默认值
    /// - 0.9
    async fn get_carry_over_weight(&self, clinic_id: &str) -> Result<f64, Box<dyn Error + Send + Sync>>;

    /// 各维度权重（用于综合公平分）
    ///
    /// # 默认值
    /// - total=1.0, night=1.5, weekend=1.2, holiday=2.0, holiday_adjacent=1.0
    async fn get_dimension_weights(
        &self,
        clinic_id: &str,
    ) -> Result<DimensionValues, Box<dyn Error + Send + Sync>>;

    /// Phase2 单周最大轮次
    ///
    /// # 默认值
    /// - 64
    async fn get_phase2_max_passes(&self, clinic_id: &str) -> Result<usize, Box<dyn Error + Send + Sync>>;

    /// 遗留锁判定秒数
    ///
    /// # 默认值
    /// - 1800
    async fn get_run_lock_stale_secs(&self, clinic_id: &str) -> Result<i64, Box<dyn Error + Send + Sync>>;

    /// 完整营业周天数（周一至周六）
    ///
    /// # 默认值
    /// - 6
    async fn get_full_week_days(&self, clinic_id: &str) -> Result<u32, Box<dyn Error + Send + Sync>>;

    /// 诊所生效配置（JSON 对象，诊所级已覆盖全局；未设置的键不出现）
    async fn get_effective_config(&self, clinic_id: &str) -> Result<String, Box<dyn Error + Send + Sync>>;
}
