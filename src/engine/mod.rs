// ==========================================
// 动态裕度计算服务 - 引擎层
// ==========================================
// 职责: 运行上下文构建、作业编排、停止竞争、调试包
// 红线: Engine 不拼 SQL，数据访问全部经由仓储
// ==========================================

pub mod codec;
pub mod debug_archive;
pub mod error;
pub mod events;
pub mod loads_variation;
pub mod orchestrator;
pub mod run_context_builder;
pub mod stop_registry;
pub mod worker;

// 重导出核心类型
pub use debug_archive::{zip_directory, DebugArchiver};
pub use error::{EngineError, EngineResult};
pub use events::{
    ComputationEvent, ComputationEventType, NoOpNotificationGateway, NotificationGateway,
    RecordingNotificationGateway,
};
pub use loads_variation::{ensure_filters_exist, resolve_active_loads_variations};
pub use orchestrator::{JobOrchestrator, OrchestratorDeps};
pub use run_context_builder::RunContextBuilder;
pub use stop_registry::{StopRegistry, StopRequest};
pub use worker::{RunWorker, WorkerShutdown};
