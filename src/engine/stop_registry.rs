// ==========================================
// 动态裕度计算服务 - 停止请求登记表
// ==========================================
// job_id → 停止请求通道
// - Worker 在派发计算前登记，结束时注销并排空残留请求
// - 未登记的作业（未开始 / preRun 中 / 已结束 / 未知）请求停止时立即返回 Err，
//   由调用方回复 cancel-failed
// 登记/注销/投递在同一把锁下完成，注销后排空即可拿到全部残留请求
// ==========================================

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use uuid::Uuid;

/// 停止请求
#[derive(Debug, Clone, PartialEq)]
pub struct StopRequest {
    pub receiver: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl StopRequest {
    pub fn new(receiver: Option<String>) -> Self {
        Self {
            receiver,
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct StopRegistry {
    senders: Mutex<HashMap<Uuid, mpsc::UnboundedSender<StopRequest>>>,
}

impl StopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记作业，返回该作业的停止请求接收端
    pub fn register(&self, job_id: Uuid) -> mpsc::UnboundedReceiver<StopRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, tx);
        if previous.is_some() {
            tracing::warn!(job_id = %job_id, "作业重复登记，旧的停止通道已替换");
        }
        rx
    }

    /// 投递停止请求；作业未登记时原样退回
    pub fn request_stop(&self, job_id: Uuid, request: StopRequest) -> Result<(), StopRequest> {
        let senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        match senders.get(&job_id) {
            Some(tx) => tx.send(request).map_err(|e| e.0),
            None => Err(request),
        }
    }

    /// 注销作业并排空残留的停止请求
    pub fn unregister(
        &self,
        job_id: Uuid,
        rx: &mut mpsc::UnboundedReceiver<StopRequest>,
    ) -> Vec<StopRequest> {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);

        let mut pending = Vec::new();
        while let Ok(request) = rx.try_recv() {
            pending.push(request);
        }
        pending
    }

    pub fn is_registered(&self, job_id: Uuid) -> bool {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_job_returns_request() {
        let registry = StopRegistry::new();
        let job = Uuid::new_v4();
        let request = StopRequest::new(Some("me".to_string()));

        let rejected = registry.request_stop(job, request.clone()).unwrap_err();
        assert_eq!(rejected, request);
    }

    #[tokio::test]
    async fn test_registered_job_receives_stop() {
        let registry = StopRegistry::new();
        let job = Uuid::new_v4();
        let mut rx = registry.register(job);

        registry.request_stop(job, StopRequest::new(None)).unwrap();
        assert!(rx.recv().await.is_some());
        assert!(registry.is_registered(job));
    }

    #[test]
    fn test_unregister_drains_and_rejects_later_stops() {
        let registry = StopRegistry::new();
        let job = Uuid::new_v4();
        let mut rx = registry.register(job);
        registry.request_stop(job, StopRequest::new(Some("a".to_string()))).unwrap();
        registry.request_stop(job, StopRequest::new(Some("b".to_string()))).unwrap();

        let drained = registry.unregister(job, &mut rx);

        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].receiver.as_deref(), Some("a"));
        assert!(!registry.is_registered(job));
        assert!(registry.request_stop(job, StopRequest::new(None)).is_err());
    }
}
