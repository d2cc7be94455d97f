// ==========================================
// 动态裕度计算服务 - 领域模型层
// ==========================================
// 职责: 定义参数集、结果树、运行上下文、作业状态
// 红线: 不含数据访问逻辑,不含编排逻辑
// ==========================================

pub mod merge;
pub mod parameters;
pub mod report;
pub mod result;
pub mod run_context;
pub mod types;

// 重导出核心类型
pub use merge::{plan_loads_variation_merge, MergeError, MergePlan, MergedLoadsVariation};
pub use parameters::{FilterRef, LoadsVariation, MarginCalculationParameters};
pub use report::{ReportEntry, ReportNode, ReportSnapshot};
pub use result::{FailedCriterion, LoadIncreaseResult, MarginCalculationResult, ScenarioResult};
pub use run_context::{
    Contingency, DynamicModelConfig, EngineRunParameters, Equipment, FrozenRunContext,
    NetworkContext, ReportInfos, ResolvedLoadsVariation, RunContext, RunRequest,
};
pub use types::{CalculationType, ComputationStatus, ExecutionStatus, LoadModelsRule};
