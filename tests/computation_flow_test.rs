// ==========================================
// 计算作业流程集成测试
// ==========================================
// 测试范围:
// 1. 提交: 同步校验、立即可见 RUNNING
// 2. Worker: preRun → 派发 → 结果分类落库 → 通知
// 3. 失败分类: 执行异常 / 引擎错误 / 预想事故为空
// 4. 状态失效、结果删除、调试包上传与下载
// ==========================================


use dynamic_margin_calc::api::ApiError;
use dynamic_margin_calc::client::ComputationError;
use dynamic_margin_calc::domain::LoadsVariation;
use dynamic_margin_calc::engine::codec;
use dynamic_margin_calc::{ComputationEventType, ComputationStatus, ExecutionStatus};
use std::sync::atomic::Ordering;
use test_helpers::*;
use uuid::Uuid;

fn queued_count(env: &TestEnv) -> i64 {
    env.state.run_queue_repo.total_count().unwrap()
}

// ==========================================
// 提交
// ==========================================

#[tokio::test]
async fn test_submit_is_running_before_any_processing() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let params_id = env.create_parameters();

    let job_id = env
        .state
        .computation_api
        .submit_run(env.run_request(params_id))
        .await
        .unwrap();

    assert_eq!(
        env.state.computation_api.get_status(job_id).unwrap(),
        Some(ComputationStatus::Running)
    );
    assert_eq!(env.state.run_queue_repo.pending_count().unwrap(), 1);
    assert!(env.notifications.events().is_empty());
}

#[tokio::test]
async fn test_submit_validation_errors_are_synchronous() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let api = &env.state.computation_api;

    // 参数集不存在
    let missing = Uuid::new_v4();
    let err = api.submit_run(env.run_request(missing)).await.unwrap_err();
    assert!(matches!(err, ApiError::ParametersNotFound(id) if id == missing));

    // provider 不可用
    let params_id = env.create_parameters();
    let mut request = env.run_request(params_id);
    request.provider = Some("Unknown".to_string());
    let err = api.submit_run(request).await.unwrap_err();
    assert!(matches!(err, ApiError::ProviderNotFound(ref p) if p == "Unknown"));
    assert_eq!(err.code(), "dynamicMarginCalculation.providerNotFound");

    // active 负荷变化引用的过滤器缺失，全部列出
    let known = Uuid::new_v4();
    env.filters.add(known);
    let (missing_a, missing_b) = (Uuid::new_v4(), Uuid::new_v4());
    let mut params = env
        .state
        .parameters_api
        .get(params_id, None)
        .await
        .unwrap();
    params.loads_variations = vec![
        LoadsVariation::new(vec![known, missing_a], 5.0, true),
        LoadsVariation::new(vec![missing_b], 10.0, true),
        LoadsVariation::new(vec![Uuid::new_v4()], 1.0, false),
    ];
    env.state.parameters_api.update(params_id, Some(&params)).unwrap();
    match api.submit_run(env.run_request(params_id)).await {
        Err(ApiError::MissingFilters { ids }) => assert_eq!(ids, vec![missing_a, missing_b]),
        other => panic!("应返回 MissingFilters, 实际: {:?}", other),
    }

    // 校验失败的提交不入队
    assert_eq!(env.state.run_queue_repo.pending_count().unwrap(), 0);
}

// ==========================================
// 正常完成
// ==========================================

#[tokio::test]
async fn test_criteria_non_respected_is_succeed() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let filter = Uuid::new_v4();
    env.filters.add(filter);
    let mut params = dynamic_margin_calc::MarginCalculationParameters::default_values(ENGINE_NAME);
    params.loads_variations = vec![
        LoadsVariation::new(vec![filter], 5.0, true),
        LoadsVariation::new(vec![Uuid::new_v4()], 9.0, false),
    ];
    let params_id = env.state.parameters_api.create(&params).unwrap();
    let (_worker, _shutdown) = env.state.start_worker();

    let request = env.run_request(params_id);
    let sim_json = request.dynamic_simulation_parameters_json.clone();
    let job_id = env.state.computation_api.submit_run(request).await.unwrap();
    env.engine.wait_dispatched(job_id).await;

    // 冻结的运行上下文
    let frozen = env.engine.dispatched_context(job_id).unwrap();
    assert_eq!(frozen.contingencies.len(), 1);
    assert_eq!(frozen.loads_variations.len(), 1);
    assert_eq!(frozen.loads_variations[0].variation, 5.0);
    assert_eq!(frozen.run_parameters.contingencies_start_time, Some(105.0));
    assert_eq!(frozen.run_parameters.stop_time, Some(200.0));
    assert!(frozen.run_parameters.debug_dir.is_none());
    assert_eq!(frozen.run.dynamic_simulation_parameters_json, sim_json);

    let expected = result_with(ExecutionStatus::CriteriaNonRespected);
    env.engine.finish(job_id, Ok(Some(expected.clone())));

    wait_until(|| env.notifications.count(job_id, ComputationEventType::Result) == 1).await;
    let api = &env.state.computation_api;
    assert_eq!(api.get_status(job_id).unwrap(), Some(ComputationStatus::Succeed));
    assert_eq!(api.get_result(job_id).unwrap(), Some(expected));

    let events = env.notifications.events_for(job_id);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].receiver.as_deref(), Some("receiver-1"));
    wait_until(|| queued_count(&env) == 0).await;
    assert_eq!(env.reports.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_execution_problem_is_failed_with_result() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let params_id = env.create_parameters();
    let (_worker, _shutdown) = env.state.start_worker();

    let job_id = env
        .state
        .computation_api
        .submit_run(env.run_request(params_id))
        .await
        .unwrap();
    env.engine.wait_dispatched(job_id).await;
    env.engine
        .finish(job_id, Ok(Some(result_with(ExecutionStatus::ExecutionProblem))));

    wait_until(|| env.notifications.count(job_id, ComputationEventType::Result) == 1).await;
    let api = &env.state.computation_api;
    assert_eq!(api.get_status(job_id).unwrap(), Some(ComputationStatus::Failed));
    let stored = api.get_result(job_id).unwrap().unwrap();
    assert_eq!(stored.load_increase_results.len(), 2);
    assert_eq!(stored.load_increase_results[1].status, ExecutionStatus::ExecutionProblem);
}

#[tokio::test]
async fn test_engine_error_marks_failed_and_notifies() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let params_id = env.create_parameters();
    let (_worker, _shutdown) = env.state.start_worker();

    let job_id = env
        .state
        .computation_api
        .submit_run(env.run_request(params_id))
        .await
        .unwrap();
    env.engine.wait_dispatched(job_id).await;
    env.engine
        .finish(job_id, Err(ComputationError::Engine("solver crashed".to_string())));

    wait_until(|| env.notifications.count(job_id, ComputationEventType::RunFailed) == 1).await;
    assert_eq!(
        env.state.computation_api.get_status(job_id).unwrap(),
        Some(ComputationStatus::Failed)
    );
    let failed = &env.notifications.events_for(job_id)[0];
    assert!(failed.message.as_deref().unwrap_or_default().contains("solver crashed"));
    assert_eq!(env.notifications.count(job_id, ComputationEventType::Result), 0);

    // 诊断报告带失败节点
    wait_until(|| !env.reports.sent.lock().unwrap().is_empty()).await;
    let sent = env.reports.sent.lock().unwrap();
    assert!(sent[0]
        .1
        .children
        .iter()
        .any(|c| c.message.contains("solver crashed")));
}

#[tokio::test]
async fn test_empty_contingency_list_fails_before_dispatch() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    env.security_analysis.empty.store(true, Ordering::SeqCst);
    let params_id = env.create_parameters();
    let (_worker, _shutdown) = env.state.start_worker();

    let job_id = env
        .state
        .computation_api
        .submit_run(env.run_request(params_id))
        .await
        .unwrap();

    wait_until(|| env.notifications.count(job_id, ComputationEventType::RunFailed) == 1).await;
    assert_eq!(
        env.state.computation_api.get_status(job_id).unwrap(),
        Some(ComputationStatus::Failed)
    );
    assert!(env.engine.dispatched_context(job_id).is_none());
}

#[tokio::test]
async fn test_engine_without_result_leaves_status_untouched() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let params_id = env.create_parameters();
    let (_worker, _shutdown) = env.state.start_worker();

    let job_id = env
        .state
        .computation_api
        .submit_run(env.run_request(params_id))
        .await
        .unwrap();
    env.engine.wait_dispatched(job_id).await;
    env.engine.finish(job_id, Ok(None));

    wait_until(|| queued_count(&env) == 0).await;
    assert_eq!(
        env.state.computation_api.get_status(job_id).unwrap(),
        Some(ComputationStatus::Running)
    );
    assert!(env.notifications.events_for(job_id).is_empty());
}

#[tokio::test]
async fn test_job_deleted_before_start_is_skipped() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let params_id = env.create_parameters();
    let job_id = env
        .state
        .computation_api
        .submit_run(env.run_request(params_id))
        .await
        .unwrap();
    env.state.computation_api.delete_result(job_id).unwrap();
    // 排队消息随作业一起删除
    assert_eq!(queued_count(&env), 0);

    // 之后提交的作业照常执行，被删除的作业不会派发
    let (_worker, _shutdown) = env.state.start_worker();
    let next_job = env
        .state
        .computation_api
        .submit_run(env.run_request(params_id))
        .await
        .unwrap();
    env.engine.wait_dispatched(next_job).await;

    assert!(env.engine.dispatched_context(job_id).is_none());
    assert_eq!(env.state.computation_api.get_status(job_id).unwrap(), None);
    assert!(env.notifications.events_for(job_id).is_empty());
}

// ==========================================
// 状态失效 / 删除
// ==========================================

#[tokio::test]
async fn test_invalidate_only_touches_existing_jobs() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let params_id = env.create_parameters();
    let api = &env.state.computation_api;
    let job_a = api.submit_run(env.run_request(params_id)).await.unwrap();
    let job_b = api.submit_run(env.run_request(params_id)).await.unwrap();
    let unknown = Uuid::new_v4();

    let updated = api.invalidate_status(&[job_a, unknown]).unwrap();

    assert_eq!(updated, vec![job_a]);
    assert_eq!(api.get_status(job_a).unwrap(), Some(ComputationStatus::NotDone));
    assert_eq!(api.get_status(job_b).unwrap(), Some(ComputationStatus::Running));
    assert_eq!(api.get_status(unknown).unwrap(), None);
}

#[tokio::test]
async fn test_delete_results_selected_and_all() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let params_id = env.create_parameters();
    let api = &env.state.computation_api;
    let job_a = api.submit_run(env.run_request(params_id)).await.unwrap();
    let job_b = api.submit_run(env.run_request(params_id)).await.unwrap();
    let job_c = api.submit_run(env.run_request(params_id)).await.unwrap();

    // 未知 id 静默成功
    api.delete_result(Uuid::new_v4()).unwrap();
    api.delete_results(Some(&[job_a, Uuid::new_v4()])).unwrap();
    assert_eq!(api.get_status(job_a).unwrap(), None);
    assert!(api.get_status(job_b).unwrap().is_some());

    api.delete_results(None).unwrap();
    assert_eq!(api.get_status(job_b).unwrap(), None);
    assert_eq!(api.get_status(job_c).unwrap(), None);
    assert_eq!(queued_count(&env), 0);
}

#[tokio::test]
async fn test_finished_jobs_leave_no_queue_rows_and_are_counted() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let params_id = env.create_parameters();
    let (_worker, _shutdown) = env.state.start_worker();
    let api = &env.state.computation_api;

    let mut jobs = Vec::new();
    for _ in 0..5 {
        let job_id = api.submit_run(env.run_request(params_id)).await.unwrap();
        env.engine.wait_dispatched(job_id).await;
        env.engine
            .finish(job_id, Ok(Some(result_with(ExecutionStatus::Convergence))));
        jobs.push(job_id);
    }

    wait_until(|| {
        jobs.iter()
            .all(|id| env.notifications.count(*id, ComputationEventType::Result) == 1)
    })
    .await;
    wait_until(|| queued_count(&env) == 0).await;
    assert_eq!(api.get_results_count().unwrap(), 5);

    api.delete_result(jobs[0]).unwrap();
    assert_eq!(api.get_results_count().unwrap(), 4);

    api.delete_results(None).unwrap();
    assert_eq!(api.get_results_count().unwrap(), 0);
    assert_eq!(queued_count(&env), 0);
}

#[tokio::test]
async fn test_providers() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    assert_eq!(env.state.computation_api.list_providers(), vec![ENGINE_NAME.to_string()]);
    assert_eq!(env.state.computation_api.get_default_provider(), ENGINE_NAME);
}

// ==========================================
// 调试包
// ==========================================

#[tokio::test]
async fn test_debug_bundle_is_uploaded_and_downloadable() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let params_id = env.create_parameters();
    let (_worker, _shutdown) = env.state.start_worker();

    let mut request = env.run_request(params_id);
    request.debug = true;
    let job_id = env.state.computation_api.submit_run(request).await.unwrap();
    env.engine.wait_dispatched(job_id).await;

    let debug_dir = env
        .engine
        .dispatched_context(job_id)
        .and_then(|c| c.run_parameters.debug_dir)
        .expect("调试模式应分配调试目录");
    assert!(debug_dir.starts_with(env.debug_root.path()));

    env.engine
        .finish(job_id, Ok(Some(result_with(ExecutionStatus::Convergence))));

    wait_until(|| env.notifications.count(job_id, ComputationEventType::DebugReady) == 1).await;
    let debug_event = env
        .notifications
        .events_for(job_id)
        .into_iter()
        .find(|e| e.event_type == ComputationEventType::DebugReady)
        .unwrap();
    assert!(debug_event.message.is_none());
    assert_eq!(env.notifications.count(job_id, ComputationEventType::Result), 1);

    let bytes = within(env.state.computation_api.download_debug_file(job_id))
        .await
        .unwrap();
    assert!(bytes.starts_with(b"PK"));
    assert!(!debug_dir.exists());
}

#[tokio::test]
async fn test_download_without_debug_bundle_is_not_found() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let params_id = env.create_parameters();
    let job_id = env
        .state
        .computation_api
        .submit_run(env.run_request(params_id))
        .await
        .unwrap();

    let err = env
        .state
        .computation_api
        .download_debug_file(job_id)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_simulation_payload_codec() {
    let raw = r#"{"solver":"IDA","startTime":0}"#;
    let packed = codec::compress(raw).unwrap();
    assert_ne!(packed, raw);
    assert_eq!(codec::decompress(&packed).unwrap(), raw);
}
