// ==========================================
// 停止与完成竞争 集成测试
// ==========================================
// 测试范围:
// 1. 及时停止: 记录删除 + 唯一一条 stopped
// 2. 迟到停止: 结果保留 + cancel-failed
// 3. 已有部分产出时停止: FAILED + 报告 + cancel-failed
// 4. 取消被拒绝: 正常落库后 cancel-failed
// 5. preRun 之前/期间停止: cancel-failed，作业继续
// 6. 干净停止时删除报告与调试目录
// ==========================================


use dynamic_margin_calc::domain::run_context::ReportInfos;
use dynamic_margin_calc::engine::events::CANCEL_FAILED_MESSAGE;
use dynamic_margin_calc::{ComputationEventType, ComputationStatus, ExecutionStatus};
use std::sync::atomic::Ordering;
use test_helpers::*;
use uuid::Uuid;

async fn submit(env: &TestEnv, debug: bool) -> Uuid {
    let params_id = env.create_parameters();
    let mut request = env.run_request(params_id);
    request.debug = debug;
    env.state.computation_api.submit_run(request).await.unwrap()
}

fn primary_count(env: &TestEnv, job_id: Uuid) -> usize {
    [
        ComputationEventType::Result,
        ComputationEventType::Stopped,
        ComputationEventType::RunFailed,
    ]
    .into_iter()
    .map(|t| env.notifications.count(job_id, t))
    .sum()
}

#[tokio::test]
async fn test_stop_in_time_deletes_record_and_notifies_once() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let (_worker, _shutdown) = env.state.start_worker();
    let job_id = submit(&env, false).await;
    env.engine.wait_dispatched(job_id).await;

    env.state
        .computation_api
        .stop(job_id, Some("stopper".to_string()));

    wait_until(|| env.notifications.count(job_id, ComputationEventType::Stopped) == 1).await;
    let api = &env.state.computation_api;
    assert_eq!(api.get_status(job_id).unwrap(), None);
    assert_eq!(api.get_result(job_id).unwrap(), None);
    assert_eq!(*env.engine.cancel_calls.lock().unwrap(), vec![job_id]);

    let events = env.notifications.events_for(job_id);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].receiver.as_deref(), Some("stopper"));
    assert_eq!(primary_count(&env, job_id), 1);

    // 已登记的报告随作业一起删除，不再发送
    let deleted = env.reports.deleted.lock().unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].1, ReportInfos::default().computation_type);
    assert!(env.reports.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_after_completion_keeps_result() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let (_worker, _shutdown) = env.state.start_worker();
    let job_id = submit(&env, false).await;
    env.engine.wait_dispatched(job_id).await;
    env.engine
        .finish(job_id, Ok(Some(result_with(ExecutionStatus::Convergence))));
    wait_until(|| env.notifications.count(job_id, ComputationEventType::Result) == 1).await;

    env.state.computation_api.stop(job_id, None);

    wait_until(|| env.notifications.count(job_id, ComputationEventType::CancelFailed) == 1).await;
    let api = &env.state.computation_api;
    assert_eq!(api.get_status(job_id).unwrap(), Some(ComputationStatus::Succeed));
    assert!(api.get_result(job_id).unwrap().is_some());
    assert_eq!(env.notifications.count(job_id, ComputationEventType::Stopped), 0);
    assert_eq!(primary_count(&env, job_id), 1);
    assert!(env.engine.cancel_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_after_partial_output_is_failed_not_deleted() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    env.engine.report_on_dispatch.store(true, Ordering::SeqCst);
    let (_worker, _shutdown) = env.state.start_worker();
    let job_id = submit(&env, false).await;
    env.engine.wait_dispatched(job_id).await;

    env.state.computation_api.stop(job_id, None);

    wait_until(|| env.notifications.count(job_id, ComputationEventType::CancelFailed) == 1).await;
    assert_eq!(
        env.state.computation_api.get_status(job_id).unwrap(),
        Some(ComputationStatus::Failed)
    );
    assert_eq!(env.notifications.count(job_id, ComputationEventType::Stopped), 0);
    assert_eq!(env.notifications.count(job_id, ComputationEventType::Result), 0);
    assert!(env.reports.deleted.lock().unwrap().is_empty());

    // 诊断报告照常发送
    let sent = env.reports.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.children[0].key, "loadIncrease");
}

#[tokio::test]
async fn test_refused_cancel_completes_then_reports_cancel_failed() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    env.engine.accept_cancel.store(false, Ordering::SeqCst);
    let (_worker, _shutdown) = env.state.start_worker();
    let job_id = submit(&env, false).await;
    env.engine.wait_dispatched(job_id).await;

    env.state.computation_api.stop(job_id, None);
    wait_until(|| env.engine.cancel_calls.lock().unwrap().contains(&job_id)).await;
    env.engine
        .finish(job_id, Ok(Some(result_with(ExecutionStatus::Divergence))));

    wait_until(|| env.notifications.count(job_id, ComputationEventType::CancelFailed) == 1).await;
    assert_eq!(
        env.state.computation_api.get_status(job_id).unwrap(),
        Some(ComputationStatus::Succeed)
    );
    assert_eq!(env.notifications.count(job_id, ComputationEventType::Result), 1);

    // 结果先于 cancel-failed 发布
    let types: Vec<_> = env
        .notifications
        .events_for(job_id)
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        vec![ComputationEventType::Result, ComputationEventType::CancelFailed]
    );
}

#[tokio::test]
async fn test_stop_before_dispatch_is_answered_and_job_continues() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let job_id = submit(&env, false).await;

    // Worker 尚未启动: 作业还未进入计算
    env.state.computation_api.stop(job_id, Some("early".to_string()));
    let events = env.notifications.events_for(job_id);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ComputationEventType::CancelFailed);
    assert!(events[0]
        .message
        .as_deref()
        .unwrap_or_default()
        .starts_with(CANCEL_FAILED_MESSAGE));

    let (_worker, _shutdown) = env.state.start_worker();
    env.engine.wait_dispatched(job_id).await;
    env.engine.finish(job_id, Ok(None));

    wait_until(|| env.state.run_queue_repo.total_count().unwrap() == 0).await;
    assert_eq!(
        env.state.computation_api.get_status(job_id).unwrap(),
        Some(ComputationStatus::Running)
    );
    assert_eq!(env.notifications.count(job_id, ComputationEventType::Stopped), 0);
    assert!(env.engine.cancel_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_while_pre_run_is_blocked_keeps_running() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    env.security_analysis.hold.store(true, Ordering::SeqCst);
    let (_worker, _shutdown) = env.state.start_worker();
    let job_id = submit(&env, false).await;
    wait_until(|| env.security_analysis.entered.load(Ordering::SeqCst)).await;

    env.state
        .computation_api
        .stop(job_id, Some("during-pre-run".to_string()));

    let events = env.notifications.events_for(job_id);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ComputationEventType::CancelFailed);
    assert_eq!(events[0].receiver.as_deref(), Some("during-pre-run"));
    assert_eq!(
        env.state.computation_api.get_status(job_id).unwrap(),
        Some(ComputationStatus::Running)
    );

    // preRun 放行后作业照常派发，停止请求不会迟到生效
    env.security_analysis.release();
    env.engine.wait_dispatched(job_id).await;
    env.engine.finish(job_id, Ok(None));

    wait_until(|| env.state.run_queue_repo.total_count().unwrap() == 0).await;
    assert_eq!(
        env.state.computation_api.get_status(job_id).unwrap(),
        Some(ComputationStatus::Running)
    );
    assert!(env.engine.cancel_calls.lock().unwrap().is_empty());
    assert_eq!(env.notifications.count(job_id, ComputationEventType::Result), 0);
    assert_eq!(env.notifications.count(job_id, ComputationEventType::Stopped), 0);
    assert_eq!(env.notifications.events_for(job_id).len(), 1);
}

#[tokio::test]
async fn test_stop_unknown_job_is_cancel_failed() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let unknown = Uuid::new_v4();

    env.state.computation_api.stop(unknown, Some("r".to_string()));

    assert_eq!(env.notifications.count(unknown, ComputationEventType::CancelFailed), 1);
}

#[tokio::test]
async fn test_clean_stop_discards_debug_directory() {
    let env = TestEnv::new().await.expect("无法创建测试环境");
    let (_worker, _shutdown) = env.state.start_worker();
    let job_id = submit(&env, true).await;
    env.engine.wait_dispatched(job_id).await;
    let debug_dir = env
        .engine
        .dispatched_context(job_id)
        .and_then(|c| c.run_parameters.debug_dir)
        .unwrap();

    env.state.computation_api.stop(job_id, None);

    wait_until(|| env.notifications.count(job_id, ComputationEventType::Stopped) == 1).await;
    wait_until(|| !debug_dir.exists()).await;
    assert_eq!(env.notifications.count(job_id, ComputationEventType::DebugReady), 0);
    assert!(env.object_store.objects.lock().unwrap().is_empty());
}
