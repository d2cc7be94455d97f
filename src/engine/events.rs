// ==========================================
// 动态裕度计算服务 - 作业生命周期通知
// ==========================================
// 职责: 定义通知发布 trait，实现依赖倒置
// 说明: 编排层只依赖 NotificationGateway，宿主注入消息总线适配器
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

pub const STOPPED_MESSAGE: &str = "Computation was stopped";
pub const CANCEL_FAILED_MESSAGE: &str = "Computation could not be stopped";

// ==========================================
// 通知类型
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComputationEventType {
    /// 结果已落库
    Result,
    /// Worker 侧失败（状态已写 FAILED）
    RunFailed,
    /// 停止成功，记录已删除
    Stopped,
    /// 停止未生效
    CancelFailed,
    /// 调试包已就绪（或打包失败，见 message）
    DebugReady,
}

impl ComputationEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputationEventType::Result => "result",
            ComputationEventType::RunFailed => "runFailed",
            ComputationEventType::Stopped => "stopped",
            ComputationEventType::CancelFailed => "cancelFailed",
            ComputationEventType::DebugReady => "debug",
        }
    }
}

/// 作业通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputationEvent {
    pub job_id: Uuid,
    pub event_type: ComputationEventType,
    /// 提交时给定的不透明接收方，原样回传
    pub receiver: Option<String>,
    pub message: Option<String>,
    pub emitted_at: DateTime<Utc>,
}

impl ComputationEvent {
    fn new(
        job_id: Uuid,
        event_type: ComputationEventType,
        receiver: Option<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            job_id,
            event_type,
            receiver,
            message,
            emitted_at: Utc::now(),
        }
    }

    pub fn result(job_id: Uuid, receiver: Option<String>) -> Self {
        Self::new(job_id, ComputationEventType::Result, receiver, None)
    }

    pub fn run_failed(job_id: Uuid, receiver: Option<String>, message: impl Into<String>) -> Self {
        Self::new(
            job_id,
            ComputationEventType::RunFailed,
            receiver,
            Some(message.into()),
        )
    }

    pub fn stopped(job_id: Uuid, receiver: Option<String>) -> Self {
        Self::new(
            job_id,
            ComputationEventType::Stopped,
            receiver,
            Some(STOPPED_MESSAGE.to_string()),
        )
    }

    pub fn cancel_failed(job_id: Uuid, receiver: Option<String>, reason: impl Into<String>) -> Self {
        Self::new(
            job_id,
            ComputationEventType::CancelFailed,
            receiver,
            Some(format!("{}: {}", CANCEL_FAILED_MESSAGE, reason.into())),
        )
    }

    /// error 为 None 表示打包上传成功
    pub fn debug_ready(job_id: Uuid, receiver: Option<String>, error: Option<String>) -> Self {
        Self::new(job_id, ComputationEventType::DebugReady, receiver, error)
    }
}

// ==========================================
// 通知发布 Trait
// ==========================================

/// 通知网关
///
/// 发布失败只记日志，不回滚已落库的状态
pub trait NotificationGateway: Send + Sync {
    fn publish(&self, event: ComputationEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作网关
#[derive(Debug, Clone, Default)]
pub struct NoOpNotificationGateway;

impl NotificationGateway for NoOpNotificationGateway {
    fn publish(&self, event: ComputationEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            job_id = %event.job_id,
            event_type = event.event_type.as_str(),
            "NoOpNotificationGateway: 跳过通知发布"
        );
        Ok(())
    }
}

/// 记录型网关（内存保存全部通知，供测试与嵌入方轮询）
#[derive(Debug, Default)]
pub struct RecordingNotificationGateway {
    events: Mutex<Vec<ComputationEvent>>,
}

impl RecordingNotificationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ComputationEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_for(&self, job_id: Uuid) -> Vec<ComputationEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.job_id == job_id)
            .collect()
    }

    pub fn count(&self, job_id: Uuid, event_type: ComputationEventType) -> usize {
        self.events_for(job_id)
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl NotificationGateway for RecordingNotificationGateway {
    fn publish(&self, event: ComputationEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

/// 发布并吞掉错误（记录 warn）
pub(crate) fn publish_logged(gateway: &dyn NotificationGateway, event: ComputationEvent) {
    let job_id = event.job_id;
    let event_type = event.event_type.as_str();
    match gateway.publish(event) {
        Ok(()) => tracing::debug!(job_id = %job_id, event_type, "通知已发布"),
        Err(e) => tracing::warn!(job_id = %job_id, event_type, error = %e, "通知发布失败"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constructors_echo_receiver() {
        let job = Uuid::new_v4();
        let event = ComputationEvent::cancel_failed(job, Some("studyA".to_string()), "already finished");

        assert_eq!(event.event_type, ComputationEventType::CancelFailed);
        assert_eq!(event.receiver.as_deref(), Some("studyA"));
        assert!(event.message.unwrap().contains("already finished"));
    }

    #[test]
    fn test_recording_gateway_counts_per_job() {
        let gateway = RecordingNotificationGateway::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        publish_logged(&gateway, ComputationEvent::result(a, None));
        publish_logged(&gateway, ComputationEvent::cancel_failed(a, None, "late"));
        publish_logged(&gateway, ComputationEvent::stopped(b, None));

        assert_eq!(gateway.count(a, ComputationEventType::Result), 1);
        assert_eq!(gateway.count(a, ComputationEventType::CancelFailed), 1);
        assert_eq!(gateway.count(b, ComputationEventType::Result), 0);
        assert_eq!(gateway.events().len(), 3);
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = ComputationEvent::stopped(Uuid::new_v4(), None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "stopped");
        assert!(json.get("jobId").is_some());
    }
}
