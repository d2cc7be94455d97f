// ==========================================
// 动态裕度计算服务 - 外部协作方错误类型
// ==========================================

use thiserror::Error;

/// 外部服务调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("{service} 不可用: {message}")]
    Unavailable { service: String, message: String },

    #[error("{service} 未找到: {id}")]
    NotFound { service: String, id: String },

    #[error("{service} 响应无效: {message}")]
    InvalidResponse { service: String, message: String },
}

impl ClientError {
    pub fn unavailable(service: &str, message: impl ToString) -> Self {
        ClientError::Unavailable {
            service: service.to_string(),
            message: message.to_string(),
        }
    }

    pub fn not_found(service: &str, id: impl ToString) -> Self {
        ClientError::NotFound {
            service: service.to_string(),
            id: id.to_string(),
        }
    }

    pub fn invalid_response(service: &str, message: impl ToString) -> Self {
        ClientError::InvalidResponse {
            service: service.to_string(),
            message: message.to_string(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// 计算引擎错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputationError {
    #[error("计算引擎失败: {0}")]
    Engine(String),

    #[error("计算已取消")]
    Cancelled,
}
