// ==========================================
// 动态裕度计算服务 - 计算作业 API
// ==========================================
// 职责: 提交/停止作业、状态查询与失效、结果查询与删除、结果计数、调试包下载
// 提交同步校验: 参数集存在、provider 可用、过滤器存在
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::result::MarginCalculationResult;
use crate::domain::run_context::RunRequest;
use crate::domain::types::ComputationStatus;
use crate::engine::debug_archive::DebugArchiver;
use crate::engine::orchestrator::JobOrchestrator;
use crate::engine::run_context_builder::RunContextBuilder;
use crate::repository::{ResultRepository, RunQueueRepository};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

// ==========================================
// ComputationApi - 计算作业API
// ==========================================
pub struct ComputationApi {
    builder: Arc<RunContextBuilder>,
    orchestrator: Arc<JobOrchestrator>,
    results: Arc<ResultRepository>,
    queue: Arc<RunQueueRepository>,
    debug: Arc<DebugArchiver>,
    default_provider: String,
}

impl ComputationApi {
    pub fn new(
        builder: Arc<RunContextBuilder>,
        orchestrator: Arc<JobOrchestrator>,
        results: Arc<ResultRepository>,
        queue: Arc<RunQueueRepository>,
        debug: Arc<DebugArchiver>,
        default_provider: impl Into<String>,
    ) -> Self {
        Self {
            builder,
            orchestrator,
            results,
            queue,
            debug,
            default_provider: default_provider.into(),
        }
    }

    /// 提交计算作业
    ///
    /// # 返回
    /// - Ok(Uuid): job_id，返回时状态已是 RUNNING
    /// - Err(ParametersNotFound / ProviderNotFound / MissingFilters): 同步校验失败，不入队
    pub async fn submit_run(&self, request: RunRequest) -> ApiResult<Uuid> {
        let context = self.builder.build(request).await?;
        Ok(self.orchestrator.submit(&context)?)
    }

    pub fn get_status(&self, job_id: Uuid) -> ApiResult<Option<ComputationStatus>> {
        Ok(self.results.find_status(job_id)?)
    }

    /// 把已有作业的状态置为 NOT_DONE
    ///
    /// # 返回
    /// 实际被更新的 job_id（不存在的 id 不会被创建）
    pub fn invalidate_status(&self, job_ids: &[Uuid]) -> ApiResult<Vec<Uuid>> {
        let updated = self
            .results
            .update_status(job_ids, ComputationStatus::NotDone)?;
        info!(requested = job_ids.len(), updated = updated.len(), "作业状态已失效");
        Ok(updated)
    }

    /// 请求停止作业；结果以 stopped / cancel-failed 通知送达
    pub fn stop(&self, job_id: Uuid, receiver: Option<String>) {
        self.orchestrator.stop(job_id, receiver);
    }

    pub fn get_result(&self, job_id: Uuid) -> ApiResult<Option<MarginCalculationResult>> {
        Ok(self.results.find_result(job_id)?)
    }

    /// 删除单个作业的状态、结果、调试包位置与排队消息；不存在时静默成功
    pub fn delete_result(&self, job_id: Uuid) -> ApiResult<()> {
        self.results.delete(job_id)?;
        self.queue.delete_by_job(job_id)?;
        Ok(())
    }

    /// 批量删除；None 表示删除全部
    pub fn delete_results(&self, job_ids: Option<&[Uuid]>) -> ApiResult<()> {
        match job_ids {
            Some(ids) => {
                for id in ids {
                    self.delete_result(*id)?;
                }
                info!(count = ids.len(), "作业结果已删除");
            }
            None => {
                self.results.delete_all()?;
                let messages = self.queue.delete_all()?;
                info!(messages, "全部作业结果已删除");
            }
        }
        Ok(())
    }

    /// 已保存的结果数量（监控用）
    pub fn get_results_count(&self) -> ApiResult<i64> {
        Ok(self.results.count()?)
    }

    pub fn list_providers(&self) -> Vec<String> {
        vec![self.orchestrator.engine_name().to_string()]
    }

    pub fn get_default_provider(&self) -> &str {
        &self.default_provider
    }

    /// 下载调试包
    ///
    /// # 返回
    /// - Err(NotFound): 作业未记录调试包位置
    pub async fn download_debug_file(&self, job_id: Uuid) -> ApiResult<Vec<u8>> {
        let location = self
            .results
            .find_debug_file_location(job_id)?
            .ok_or_else(|| ApiError::NotFound(format!("作业{}无调试包", job_id)))?;
        Ok(self.debug.store().get(&location).await?)
    }
}
