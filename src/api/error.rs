// ==========================================
// 动态裕度计算服务 - API层错误类型
// ==========================================
// 职责: 把仓储/引擎错误转换为对调用方稳定的业务错误
// 每个错误带稳定业务码（code），供传输层映射
// ==========================================

use crate::client::error::{ClientError, ComputationError};
use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;
use uuid::Uuid;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 未找到
    // ==========================================
    #[error("参数集不存在: {0}")]
    ParametersNotFound(Uuid),

    #[error("计算结果不存在: {0}")]
    ResultNotFound(Uuid),

    #[error("计算引擎不存在: {0}")]
    ProviderNotFound(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 校验错误
    // ==========================================
    #[error("过滤器不存在: {}", format_ids(.ids))]
    MissingFilters { ids: Vec<Uuid> },

    #[error("预想事故列表为空")]
    ContingencyListEmpty,

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 外部服务 / 数据访问
    // ==========================================
    #[error("外部服务调用失败: {0}")]
    TransportFailure(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 稳定业务码
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::ParametersNotFound(_) => "dynamicMarginCalculation.parametersNotFound",
            ApiError::ResultNotFound(_) => "dynamicMarginCalculation.resultNotFound",
            ApiError::ProviderNotFound(_) => "dynamicMarginCalculation.providerNotFound",
            ApiError::NotFound(_) => "dynamicMarginCalculation.notFound",
            ApiError::MissingFilters { .. } => "dynamicMarginCalculation.filtersNotFound",
            ApiError::ContingencyListEmpty => "dynamicMarginCalculation.contingencyListEmpty",
            ApiError::ValidationError(_) => "dynamicMarginCalculation.invalidInput",
            ApiError::TransportFailure(_) => "dynamicMarginCalculation.remoteError",
            ApiError::DatabaseError(_) | ApiError::DatabaseConnectionError(_) => {
                "dynamicMarginCalculation.databaseError"
            }
            ApiError::InternalError(_) | ApiError::Other(_) => {
                "dynamicMarginCalculation.internalError"
            }
        }
    }

    /// 是否属于"未找到"类错误
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApiError::ParametersNotFound(_)
                | ApiError::ResultNotFound(_)
                | ApiError::ProviderNotFound(_)
                | ApiError::NotFound(_)
        )
    }
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
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg)
            | RepositoryError::UniqueConstraintViolation(msg)
            | RepositoryError::ForeignKeyViolation(msg) => ApiError::DatabaseError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::ValidationError(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::SerializationError(msg) | RepositoryError::InternalError(msg) => {
                ApiError::InternalError(msg)
            }
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound { service, id } => {
                ApiError::NotFound(format!("{}: {}", service, id))
            }
            other => ApiError::TransportFailure(other.to_string()),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ParametersNotFound(id) => ApiError::ParametersNotFound(id),
            EngineError::ProviderNotFound(provider) => ApiError::ProviderNotFound(provider),
            EngineError::MissingFilters { ids } => ApiError::MissingFilters { ids },
            EngineError::ContingencyListEmpty => ApiError::ContingencyListEmpty,
            EngineError::Client(e) => e.into(),
            EngineError::Repository(e) => e.into(),
            EngineError::Computation(ComputationError::Cancelled) => {
                ApiError::InternalError("计算已取消".to_string())
            }
            EngineError::Computation(ComputationError::Engine(msg)) => ApiError::InternalError(msg),
            EngineError::Codec(e) => ApiError::InternalError(e.to_string()),
            EngineError::Serialization(e) => ApiError::InternalError(e.to_string()),
            EngineError::Archive(msg) => ApiError::InternalError(msg),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

fn format_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_keep_business_codes() {
        let id = Uuid::new_v4();
        let err: ApiError = EngineError::MissingFilters { ids: vec![id] }.into();
        assert_eq!(err.code(), "dynamicMarginCalculation.filtersNotFound");
        assert!(err.to_string().contains(&id.to_string()));

        let err: ApiError = EngineError::ProviderNotFound("Unknown".to_string()).into();
        assert_eq!(err.code(), "dynamicMarginCalculation.providerNotFound");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unavailable_client_is_transport_failure() {
        let err: ApiError =
            EngineError::Client(ClientError::unavailable("directory-server", "timeout")).into();
        assert!(matches!(err, ApiError::TransportFailure(_)));
    }

    #[test]
    fn test_repository_lock_error_maps_to_connection_error() {
        let err: ApiError = RepositoryError::LockError("poisoned".to_string()).into();
        assert!(matches!(err, ApiError::DatabaseConnectionError(_)));
    }
}
