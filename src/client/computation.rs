// ==========================================
// 动态裕度计算服务 - 计算引擎接口
// ==========================================
// run_async 立即返回句柄:
// - completion: 计算完成 future（Ok(None) 表示引擎未产出结果）
// - canceller: 同步取消请求，返回是否被接受
// ==========================================

use crate::client::error::ComputationError;
use crate::domain::report::ReportNode;
use crate::domain::result::MarginCalculationResult;
use crate::domain::run_context::FrozenRunContext;
use futures::future::BoxFuture;

pub type ComputationFuture =
    BoxFuture<'static, Result<Option<MarginCalculationResult>, ComputationError>>;

/// 取消器
pub trait ComputationCanceller: Send + Sync {
    /// 请求取消正在运行的计算；已完成或无法中断时返回 false
    fn cancel(&self) -> bool;
}

impl<F> ComputationCanceller for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn cancel(&self) -> bool {
        self()
    }
}

/// 运行中计算的句柄
pub struct ComputationHandle {
    pub completion: ComputationFuture,
    pub canceller: Box<dyn ComputationCanceller>,
}

impl ComputationHandle {
    pub fn new(completion: ComputationFuture, canceller: impl ComputationCanceller + 'static) -> Self {
        Self {
            completion,
            canceller: Box::new(canceller),
        }
    }
}

impl std::fmt::Debug for ComputationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputationHandle").finish_non_exhaustive()
    }
}

// ==========================================
// ComputationEngine - 计算引擎
// ==========================================
pub trait ComputationEngine: Send + Sync {
    /// 引擎名称（即 provider 名）
    fn name(&self) -> &str;

    /// 启动计算；启动失败同步返回错误
    fn run_async(
        &self,
        context: FrozenRunContext,
        report: ReportNode,
    ) -> Result<ComputationHandle, ComputationError>;
}
