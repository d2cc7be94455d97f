// ==========================================
// 动态裕度计算服务 - 作业编排器
// ==========================================
// 状态机: RUNNING → {SUCCEED, FAILED}；NOT_DONE 由 invalidate 设置；删除 → ABSENT
//
// 提交: 写 RUNNING → 入队 → 唤醒 Worker（顺序固定）
// Worker: preRun → 登记停止通道 → 派发计算 → select!(完成, 停止)
//   - 完成先到: 落库结果+状态 → 发布 result；残留停止请求回复 cancel-failed
//   - 停止先到且取消被接受、无报告子节点: 删除记录与报告 → 发布 stopped
//   - 停止先到且取消被接受、已有报告子节点: 写 FAILED + 发送报告 → 发布 cancel-failed
//   - 停止先到但取消被拒绝: 等待完成走正常落库 → 再发布 cancel-failed
// 任何 Worker 侧失败: 写 FAILED → 发布 runFailed（先落库后通知）
// ==========================================

use crate::client::computation::{ComputationEngine, ComputationHandle};
use crate::client::error::ComputationError;
use crate::client::sources::{FilterResolver, SecurityAnalysisSource, SimulationParametersSource};
use crate::client::storage::ReportSink;
use crate::domain::report::ReportNode;
use crate::domain::result::MarginCalculationResult;
use crate::domain::run_context::{EngineRunParameters, FrozenRunContext, RunContext};
use crate::domain::types::ComputationStatus;
use crate::engine::codec;
use crate::engine::debug_archive::DebugArchiver;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{publish_logged, ComputationEvent, NotificationGateway};
use crate::engine::loads_variation::resolve_active_loads_variations;
use crate::engine::stop_registry::{StopRegistry, StopRequest};
use crate::repository::{ResultRepository, RunMessage, RunQueueRepository};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const REPORT_KEY: &str = "dynamicMarginCalculation";

/// 编排器依赖
pub struct OrchestratorDeps {
    pub results: Arc<ResultRepository>,
    pub queue: Arc<RunQueueRepository>,
    pub filters: Arc<dyn FilterResolver>,
    pub security_analysis: Arc<dyn SecurityAnalysisSource>,
    pub simulation: Arc<dyn SimulationParametersSource>,
    pub engine: Arc<dyn ComputationEngine>,
    pub reports: Arc<dyn ReportSink>,
    pub notifications: Arc<dyn NotificationGateway>,
    pub debug: Arc<DebugArchiver>,
    /// 调试目录根（每个作业一个子目录）
    pub debug_root_dir: PathBuf,
}

/// 竞争结果
enum RaceOutcome {
    Completed(Result<Option<MarginCalculationResult>, ComputationError>),
    StopRequested(StopRequest),
}

// ==========================================
// JobOrchestrator
// ==========================================
pub struct JobOrchestrator {
    results: Arc<ResultRepository>,
    queue: Arc<RunQueueRepository>,
    filters: Arc<dyn FilterResolver>,
    security_analysis: Arc<dyn SecurityAnalysisSource>,
    simulation: Arc<dyn SimulationParametersSource>,
    engine: Arc<dyn ComputationEngine>,
    reports: Arc<dyn ReportSink>,
    notifications: Arc<dyn NotificationGateway>,
    debug: Arc<DebugArchiver>,
    debug_root_dir: PathBuf,
    stops: StopRegistry,
    queue_signal: Arc<Notify>,
}

impl JobOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            results: deps.results,
            queue: deps.queue,
            filters: deps.filters,
            security_analysis: deps.security_analysis,
            simulation: deps.simulation,
            engine: deps.engine,
            reports: deps.reports,
            notifications: deps.notifications,
            debug: deps.debug,
            debug_root_dir: deps.debug_root_dir,
            stops: StopRegistry::new(),
            queue_signal: Arc::new(Notify::new()),
        }
    }

    /// 入队唤醒信号（Worker 等待此信号）
    pub fn queue_signal(&self) -> Arc<Notify> {
        self.queue_signal.clone()
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    // ==========================================
    // 提交
    // ==========================================

    /// 提交作业，立即返回 job_id
    pub fn submit(&self, context: &RunContext) -> EngineResult<Uuid> {
        let job_id = Uuid::new_v4();
        let payload = encode_run_context(context)?;

        self.results
            .insert_status(&[job_id], ComputationStatus::Running)?;
        if let Err(e) = self.queue.enqueue(job_id, &payload) {
            // 未入队的作业不应留下 RUNNING 记录
            if let Err(cleanup) = self.results.delete(job_id) {
                warn!(job_id = %job_id, error = %cleanup, "入队失败后清理状态失败");
            }
            return Err(e.into());
        }
        self.queue_signal.notify_one();

        info!(
            job_id = %job_id,
            network_uuid = %context.network.network_uuid,
            provider = %context.provider,
            debug = context.debug,
            "作业已提交"
        );
        Ok(job_id)
    }

    // ==========================================
    // 停止
    // ==========================================

    /// 请求停止作业；结果通过通知异步送达，从不阻塞
    pub fn stop(&self, job_id: Uuid, receiver: Option<String>) {
        match self.stops.request_stop(job_id, StopRequest::new(receiver)) {
            Ok(()) => info!(job_id = %job_id, "停止请求已转交运行中的作业"),
            Err(request) => {
                info!(job_id = %job_id, "作业未在计算中，停止请求无法生效");
                publish_logged(
                    self.notifications.as_ref(),
                    ComputationEvent::cancel_failed(job_id, request.receiver, "job is not running"),
                );
            }
        }
    }

    // ==========================================
    // Worker 入口
    // ==========================================

    /// 处理一条运行消息（处理结束后确认并删除消息）
    pub async fn process_message(&self, message: RunMessage) {
        let job_id = message.job_id;
        debug!(job_id = %job_id, message_id = %message.message_id, "运行消息已出队");

        match decode_run_context(&message.payload) {
            Ok(context) => match self.results.find_status(job_id) {
                Ok(None) => info!(job_id = %job_id, "作业记录已删除，跳过执行"),
                Ok(Some(_)) => self.execute(job_id, context).await,
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "读取作业状态失败");
                    self.mark_failed(job_id, None, &EngineError::from(e));
                }
            },
            Err(e) => {
                error!(job_id = %job_id, error = %e, "运行消息无法解码");
                self.mark_failed(job_id, None, &e);
            }
        }

        if let Err(e) = self.queue.acknowledge(message.message_id) {
            warn!(job_id = %job_id, error = %e, "运行消息确认失败");
        }
    }

    /// 执行单个作业的完整流程
    pub async fn execute(&self, job_id: Uuid, context: RunContext) {
        let started = Instant::now();
        let report = ReportNode::root(
            REPORT_KEY,
            format!("Dynamic margin calculation ({})", context.provider),
        );

        // ===== preRun =====
        let frozen = match self.pre_run(job_id, &context).await {
            Ok(frozen) => frozen,
            Err(e) => {
                self.fail(job_id, &context, &report, e).await;
                return;
            }
        };
        let debug_dir = frozen.run_parameters.debug_dir.clone();
        debug!(job_id = %job_id, "preRun 完成，运行上下文已冻结");

        // ===== dispatch =====
        let mut stop_rx = self.stops.register(job_id);
        let ComputationHandle {
            mut completion,
            canceller,
        } = match self.engine.run_async(frozen, report.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                let late = self.stops.unregister(job_id, &mut stop_rx);
                self.fail(job_id, &context, &report, e.into()).await;
                self.answer_late_stops(job_id, &context, late, "computation failed to start");
                self.spawn_debug_upload(job_id, &context, debug_dir);
                return;
            }
        };
        info!(job_id = %job_id, provider = %context.provider, "计算已派发");

        // ===== race =====
        let first = tokio::select! {
            outcome = &mut completion => RaceOutcome::Completed(outcome),
            Some(stop) = stop_rx.recv() => RaceOutcome::StopRequested(stop),
        };

        match first {
            RaceOutcome::Completed(outcome) => {
                let late = self.stops.unregister(job_id, &mut stop_rx);
                self.complete(job_id, &context, &report, outcome, started).await;
                self.answer_late_stops(job_id, &context, late, "computation already finished");
                self.spawn_debug_upload(job_id, &context, debug_dir);
            }
            RaceOutcome::StopRequested(stop) => {
                let receiver = stop.receiver.clone().or_else(|| context.receiver.clone());
                let accepted = canceller.cancel();

                if accepted && !report.has_children() {
                    // 干净停止：计算尚未产出任何内容
                    let late = self.stops.unregister(job_id, &mut stop_rx);
                    drop(completion);
                    if let Err(e) = self.results.delete(job_id) {
                        error!(job_id = %job_id, error = %e, "停止后删除作业记录失败");
                    }
                    self.delete_report(job_id, &context).await;
                    info!(job_id = %job_id, "作业已停止，记录已删除");
                    publish_logged(
                        self.notifications.as_ref(),
                        ComputationEvent::stopped(job_id, receiver),
                    );
                    self.answer_late_stops(job_id, &context, late, "computation already stopped");
                    discard_debug_dir(job_id, debug_dir).await;
                } else if accepted {
                    // 已有部分产出：保留记录并标记失败
                    let late = self.stops.unregister(job_id, &mut stop_rx);
                    drop(completion);
                    if let Err(e) = self
                        .results
                        .insert_status(&[job_id], ComputationStatus::Failed)
                    {
                        error!(job_id = %job_id, error = %e, "停止后写入 FAILED 失败");
                    }
                    self.send_report(job_id, &context, &report).await;
                    warn!(job_id = %job_id, "停止到达时计算已有产出，作业标记为 FAILED");
                    publish_logged(
                        self.notifications.as_ref(),
                        ComputationEvent::cancel_failed(
                            job_id,
                            receiver,
                            "computation already produced partial output",
                        ),
                    );
                    self.answer_late_stops(job_id, &context, late, "computation already stopped");
                    self.spawn_debug_upload(job_id, &context, debug_dir);
                } else {
                    // 取消被拒绝：按正常完成处理后再回复
                    info!(job_id = %job_id, "计算拒绝取消，等待其完成");
                    let outcome = completion.await;
                    let late = self.stops.unregister(job_id, &mut stop_rx);
                    self.complete(job_id, &context, &report, outcome, started).await;
                    publish_logged(
                        self.notifications.as_ref(),
                        ComputationEvent::cancel_failed(
                            job_id,
                            receiver,
                            "computation could not be interrupted",
                        ),
                    );
                    self.answer_late_stops(job_id, &context, late, "computation already finished");
                    self.spawn_debug_upload(job_id, &context, debug_dir);
                }
            }
        }
    }

    // ==========================================
    // preRun
    // ==========================================

    /// 补全外部输入并冻结运行上下文
    async fn pre_run(&self, job_id: Uuid, context: &RunContext) -> EngineResult<FrozenRunContext> {
        let network = &context.network;

        let security = self
            .security_analysis
            .get_parameters_values(context.dynamic_security_analysis_parameters_uuid, network)
            .await?;
        if security.contingencies.is_empty() {
            return Err(EngineError::ContingencyListEmpty);
        }

        let simulation = self
            .simulation
            .get_parameters_values(&context.dynamic_simulation_parameters_json, network)
            .await?;

        let loads_variations = resolve_active_loads_variations(
            self.filters.as_ref(),
            &context.parameters.loads_variations,
            network,
        )
        .await?;

        let debug_dir = if context.debug {
            let dir = self.debug_root_dir.join(job_id.to_string());
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| EngineError::Archive(format!("{}: {}", dir.display(), e)))?;
            Some(dir)
        } else {
            None
        };

        let p = &context.parameters;
        let run_parameters = EngineRunParameters {
            start_time: p.start_time,
            stop_time: p.stop_time,
            margin_calculation_start_time: p.margin_calculation_start_time,
            load_increase_start_time: p.load_increase_start_time,
            load_increase_stop_time: p.load_increase_stop_time,
            contingencies_start_time: security.contingencies_start_time,
            calculation_type: p.calculation_type,
            accuracy: p.accuracy,
            load_models_rule: p.load_models_rule,
            engine_parameters: simulation.engine_parameters,
            debug_dir,
        };

        info!(
            job_id = %job_id,
            network_uuid = %network.network_uuid,
            start_time = ?run_parameters.start_time,
            stop_time = ?run_parameters.stop_time,
            margin_calculation_start_time = ?run_parameters.margin_calculation_start_time,
            contingencies = security.contingencies.len(),
            "运行裕度计算"
        );

        Ok(FrozenRunContext {
            job_id,
            run: context.clone(),
            dynamic_model: simulation.dynamic_model,
            contingencies: security.contingencies,
            loads_variations,
            run_parameters,
        })
    }

    // ==========================================
    // 完成 / 失败
    // ==========================================

    async fn complete(
        &self,
        job_id: Uuid,
        context: &RunContext,
        report: &ReportNode,
        outcome: Result<Option<MarginCalculationResult>, ComputationError>,
        started: Instant,
    ) {
        let result = match outcome {
            Ok(Some(result)) => result,
            Ok(None) => {
                warn!(job_id = %job_id, "计算未产出结果，作业状态保持不变");
                return;
            }
            Err(e) => {
                self.fail(job_id, context, report, e.into()).await;
                return;
            }
        };

        let status = result.computation_status();
        if let Err(e) = self.results.insert_result(job_id, &result, status) {
            self.fail(job_id, context, report, e.into()).await;
            return;
        }
        self.send_report(job_id, context, report).await;

        info!(
            job_id = %job_id,
            status = %status,
            outcome = result.outcome_tag(),
            duration_ms = started.elapsed().as_millis() as u64,
            "计算完成"
        );
        publish_logged(
            self.notifications.as_ref(),
            ComputationEvent::result(job_id, context.receiver.clone()),
        );
    }

    /// Worker 侧失败：写 FAILED，保留诊断报告，发布 runFailed
    async fn fail(&self, job_id: Uuid, context: &RunContext, report: &ReportNode, e: EngineError) {
        error!(job_id = %job_id, error = %e, "作业失败");
        report.add_child("dynamicMarginCalculationFailure", e.to_string());
        self.mark_failed(job_id, context.receiver.clone(), &e);
        self.send_report(job_id, context, report).await;
    }

    fn mark_failed(&self, job_id: Uuid, receiver: Option<String>, e: &EngineError) {
        if let Err(write) = self
            .results
            .insert_status(&[job_id], ComputationStatus::Failed)
        {
            error!(job_id = %job_id, error = %write, "写入 FAILED 状态失败");
        }
        publish_logged(
            self.notifications.as_ref(),
            ComputationEvent::run_failed(job_id, receiver, e.to_string()),
        );
    }

    async fn send_report(&self, job_id: Uuid, context: &RunContext, report: &ReportNode) {
        let Some(report_uuid) = context.report_infos.report_uuid else {
            return;
        };
        if let Err(e) = self
            .reports
            .send_report(
                report_uuid,
                context.report_infos.reporter_id.as_deref(),
                &report.snapshot(),
            )
            .await
        {
            warn!(job_id = %job_id, report_uuid = %report_uuid, error = %e, "报告发送失败");
        }
    }

    /// 干净停止后删除已登记的报告
    async fn delete_report(&self, job_id: Uuid, context: &RunContext) {
        let Some(report_uuid) = context.report_infos.report_uuid else {
            return;
        };
        if let Err(e) = self
            .reports
            .delete_report(report_uuid, &context.report_infos.computation_type)
            .await
        {
            warn!(job_id = %job_id, report_uuid = %report_uuid, error = %e, "报告删除失败");
        }
    }

    fn answer_late_stops(
        &self,
        job_id: Uuid,
        context: &RunContext,
        late: Vec<StopRequest>,
        reason: &str,
    ) {
        for stop in late {
            info!(job_id = %job_id, reason, "迟到的停止请求");
            publish_logged(
                self.notifications.as_ref(),
                ComputationEvent::cancel_failed(
                    job_id,
                    stop.receiver.or_else(|| context.receiver.clone()),
                    reason,
                ),
            );
        }
    }

    fn spawn_debug_upload(&self, job_id: Uuid, context: &RunContext, debug_dir: Option<PathBuf>) {
        let Some(dir) = debug_dir else {
            return;
        };
        let archiver = self.debug.clone();
        let receiver = context.receiver.clone();
        tokio::spawn(async move {
            archiver.archive_and_publish(job_id, receiver, dir).await;
        });
    }
}

async fn discard_debug_dir(job_id: Uuid, debug_dir: Option<PathBuf>) {
    if let Some(dir) = debug_dir {
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            debug!(job_id = %job_id, error = %e, "调试目录清理失败");
        }
    }
}

// ==========================================
// 运行消息编解码
// ==========================================

/// RunContext → 队列载荷（仿真参数原文先压缩）
pub fn encode_run_context(context: &RunContext) -> EngineResult<String> {
    let mut packed = context.clone();
    packed.dynamic_simulation_parameters_json =
        codec::compress(&context.dynamic_simulation_parameters_json)?;
    Ok(serde_json::to_string(&packed)?)
}

pub fn decode_run_context(payload: &str) -> EngineResult<RunContext> {
    let mut context: RunContext = serde_json::from_str(payload)?;
    context.dynamic_simulation_parameters_json =
        codec::decompress(&context.dynamic_simulation_parameters_json)?;
    Ok(context)
}
