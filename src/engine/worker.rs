// ==========================================
// 动态裕度计算服务 - 运行队列 Worker
// ==========================================
// 循环: 取许可 → 出队 → 每个作业一个 tokio 任务
// 队列为空时等待入队信号（Notify 保存许可，不丢唤醒）
// 启动时把崩溃遗留的 TAKEN 消息放回队列
// ==========================================

use crate::engine::orchestrator::JobOrchestrator;
use crate::repository::RunQueueRepository;
use std::sync::Arc;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Worker 停机句柄
#[derive(Debug, Clone)]
pub struct WorkerShutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl WorkerShutdown {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct RunWorker {
    orchestrator: Arc<JobOrchestrator>,
    queue: Arc<RunQueueRepository>,
    signal: Arc<Notify>,
    permits: Arc<Semaphore>,
}

impl RunWorker {
    pub fn new(
        orchestrator: Arc<JobOrchestrator>,
        queue: Arc<RunQueueRepository>,
        concurrency: usize,
    ) -> Self {
        let signal = orchestrator.queue_signal();
        Self {
            orchestrator,
            queue,
            signal,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// 启动后台循环
    pub fn spawn(self) -> (JoinHandle<()>, WorkerShutdown) {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(rx));
        (handle, WorkerShutdown { tx: Arc::new(tx) })
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        match self.queue.recover_taken() {
            Ok(0) => {}
            Ok(n) => info!(recovered = n, "遗留运行消息已放回队列"),
            Err(e) => error!(error = %e, "恢复遗留运行消息失败"),
        }
        info!("运行队列 Worker 已启动");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                Ok(()) = shutdown.changed() => break,
            };

            match self.queue.dequeue() {
                Ok(Some(message)) => {
                    let orchestrator = self.orchestrator.clone();
                    tokio::spawn(async move {
                        orchestrator.process_message(message).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = self.signal.notified() => {}
                        Ok(()) = shutdown.changed() => break,
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "运行消息出队失败");
                    tokio::select! {
                        _ = self.signal.notified() => {}
                        _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
                        Ok(()) = shutdown.changed() => break,
                    }
                }
            }
        }

        info!("运行队列 Worker 已停止");
    }
}
