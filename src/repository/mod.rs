// ==========================================
// 动态裕度计算服务 - 数据仓储层
// ==========================================
// 红线: Repository 不含编排逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod parameters_repo;
pub mod result_repo;
pub mod run_queue_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use parameters_repo::ParametersRepository;
pub use result_repo::ResultRepository;
pub use run_queue_repo::{QueueMessageStatus, RunMessage, RunQueueRepository};
