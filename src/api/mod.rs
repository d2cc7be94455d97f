// ==========================================
// 动态裕度计算服务 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供传输层（HTTP / 消息）调用
// ==========================================

pub mod computation_api;
pub mod error;
pub mod parameters_api;

// 重导出核心类型
pub use computation_api::ComputationApi;
pub use error::{ApiError, ApiResult};
pub use parameters_api::ParametersApi;
