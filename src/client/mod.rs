// ==========================================
// 动态裕度计算服务 - 外部协作方接口层
// ==========================================
// 职责: 以 trait 描述外部服务，编排层只依赖接口
// ==========================================

pub mod computation;
pub mod error;
pub mod sources;
pub mod storage;

pub use computation::{
    ComputationCanceller, ComputationEngine, ComputationFuture, ComputationHandle,
};
pub use error::{ClientError, ClientResult, ComputationError};
pub use sources::{
    DirectoryResolver, FilterDefinition, FilterResolver, SecurityAnalysisParametersValues,
    SecurityAnalysisSource, SimulationParametersSource, SimulationParametersValues,
};
pub use storage::{LocalDirObjectStore, LoggingReportSink, ObjectStore, ReportSink};
