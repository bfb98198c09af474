// ==========================================
// 诊所排班系统 - API层错误类型
// ==========================================
// 职责: 将仓储层 / 引擎层错误转换为调用方可读的错误
// 约束: 错误信息必须带出定位所需的周、员工、期望值与实际值
// ==========================================

use crate::engine::error::EngineError;
use crate::engine::validation::ValidationIssue;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 排班不变量被破坏（致命）
    #[error("排班不变量被破坏: {0}")]
    InvariantViolation(String),

    #[error("自动修复失败: {reason}")]
    AutoFixFailed {
        reason: String,
        remaining: Vec<ValidationIssue>,
    },

    #[error("操作已取消: {0}")]
    Cancelled(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("统计期正在被占用: {0}")]
    ConcurrentRunRejected(String),

    // ==========================================
    // 数据访问 / 配置错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => ApiError::DatabaseTransactionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::ValidationError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::ValidationError(format!("外键约束违反: {}", msg))
            }
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Repository(e) => ApiError::from(e),
            EngineError::ConcurrentRunRejected { .. } => ApiError::ConcurrentRunRejected(err.to_string()),
            EngineError::ReconciliationInvariantViolation { .. }
            | EngineError::RestoreMismatch { .. } => ApiError::InvariantViolation(err.to_string()),
            EngineError::BackupNotFound(_) => ApiError::NotFound(err.to_string()),
            EngineError::InvalidPeriod { .. } | EngineError::WeekNotInPeriod { .. } => {
                ApiError::InvalidInput(err.to_string())
            }
            EngineError::Cancelled { .. } => ApiError::Cancelled(err.to_string()),
            EngineError::AutoFixFailed { .. } => {
                let reason = err.to_string();
                match err {
                    EngineError::AutoFixFailed { remaining, .. } => ApiError::AutoFixFailed { reason, remaining },
                    _ => ApiError::InternalError(reason),
                }
            }
            EngineError::Config(msg) => ApiError::ConfigError(msg),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_engine_errors_keep_diagnostic_detail() {
        let err: ApiError = EngineError::ReconciliationInvariantViolation {
            week_start: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            expected: 8,
            actual: 9,
            detail: "staff=S1".to_string(),
        }
        .into();
        let text = err.to_string();
        assert!(matches!(err, ApiError::InvariantViolation(_)));
        assert!(text.contains("2025-06-02"));
        assert!(text.contains("expected_off=8"));
        assert!(text.contains("staff=S1"));
    }

    #[test]
    fn test_repository_errors_pass_through_engine() {
        let err: ApiError = EngineError::Repository(RepositoryError::LockError("poisoned".to_string())).into();
        assert!(matches!(err, ApiError::DatabaseConnectionError(msg) if msg.contains("poisoned")));
    }
}
