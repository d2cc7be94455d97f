// ==========================================
// 动态裕度计算服务 - 引擎层错误类型
// ==========================================

use crate::client::error::{ClientError, ComputationError};
use crate::engine::codec::CodecError;
use crate::repository::error::RepositoryError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("参数集不存在: {0}")]
    ParametersNotFound(Uuid),

    #[error("计算引擎不存在: {0}")]
    ProviderNotFound(String),

    /// 引用的过滤器不存在（列出全部缺失 id）
    #[error("过滤器不存在: {}", format_ids(.ids))]
    MissingFilters { ids: Vec<Uuid> },

    #[error("预想事故列表为空")]
    ContingencyListEmpty,

    #[error("外部服务调用失败: {0}")]
    Client(#[from] ClientError),

    #[error("仓储错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Computation(#[from] ComputationError),

    #[error("运行消息编解码失败: {0}")]
    Codec(#[from] CodecError),

    #[error("运行消息序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("调试包打包失败: {0}")]
    Archive(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

fn format_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
