// ==========================================
// 动态裕度计算服务 - 核心库
// ==========================================
// 职责: 参数集管理 + 异步计算作业编排（提交/停止/结果/调试包）
// 技术栈: Tokio + Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 参数集、结果树、运行上下文
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 外部协作方接口
pub mod client;

// 引擎层 - 作业编排
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 依赖装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{CalculationType, ComputationStatus, ExecutionStatus, LoadModelsRule};

// 领域实体
pub use domain::{
    LoadsVariation, MarginCalculationParameters, MarginCalculationResult, RunContext, RunRequest,
};

// 引擎
pub use engine::{ComputationEvent, ComputationEventType, JobOrchestrator, NotificationGateway};

// API
pub use api::{ApiError, ApiResult, ComputationApi, ParametersApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "动态裕度计算服务";
