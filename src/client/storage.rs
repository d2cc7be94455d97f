// ==========================================
// 动态裕度计算服务 - 对象存储 / 报告服务
// ==========================================

use crate::client::error::{ClientError, ClientResult};
use crate::domain::report::ReportSnapshot;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

const OBJECT_STORE: &str = "object-store";

// ==========================================
// ObjectStore - 调试包存储
// ==========================================
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> ClientResult<()>;

    /// 对象不存在返回 ClientError::NotFound
    async fn get(&self, key: &str) -> ClientResult<Vec<u8>>;
}

/// 本地目录实现（key 即相对路径）
#[derive(Debug, Clone)]
pub struct LocalDirObjectStore {
    root: PathBuf,
}

impl LocalDirObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> ClientResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(ClientError::invalid_response(
                OBJECT_STORE,
                format!("非法对象键: {}", key),
            ));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalDirObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> ClientResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ClientError::unavailable(OBJECT_STORE, e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ClientError::unavailable(OBJECT_STORE, e))
    }

    async fn get(&self, key: &str) -> ClientResult<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ClientError::not_found(OBJECT_STORE, key))
            }
            Err(e) => Err(ClientError::unavailable(OBJECT_STORE, e)),
        }
    }
}

// ==========================================
// ReportSink - 报告服务
// ==========================================
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn send_report(
        &self,
        report_uuid: Uuid,
        reporter_id: Option<&str>,
        report: &ReportSnapshot,
    ) -> ClientResult<()>;

    async fn delete_report(&self, report_uuid: Uuid, computation_type: &str) -> ClientResult<()>;
}

/// 只写日志的报告服务（未接入报告服务时使用）
#[derive(Debug, Clone, Default)]
pub struct LoggingReportSink;

#[async_trait]
impl ReportSink for LoggingReportSink {
    async fn send_report(
        &self,
        report_uuid: Uuid,
        reporter_id: Option<&str>,
        report: &ReportSnapshot,
    ) -> ClientResult<()> {
        tracing::info!(
            report_uuid = %report_uuid,
            reporter_id = reporter_id.unwrap_or("-"),
            entries = report.children.len(),
            "报告已生成"
        );
        Ok(())
    }

    async fn delete_report(&self, report_uuid: Uuid, computation_type: &str) -> ClientResult<()> {
        tracing::info!(report_uuid = %report_uuid, computation_type, "报告已删除");
        Ok(())
    }
}
