// ==========================================
// 动态裕度计算服务 - 调试包打包上传
// ==========================================
// 流程: 压缩调试目录 → 上传对象存储 → 记录位置 → 发布 debug 通知
// 在独立任务中执行，不阻塞结果路径
// ==========================================

use crate::client::storage::ObjectStore;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{publish_logged, ComputationEvent, NotificationGateway};
use crate::repository::ResultRepository;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

/// 把目录（递归）压缩为 zip 字节
pub fn zip_directory(dir: &Path) -> EngineResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut files = Vec::new();
    collect_files(dir, &mut files).map_err(|e| EngineError::Archive(e.to_string()))?;
    files.sort();

    for path in files {
        let name = path
            .strip_prefix(dir)
            .map_err(|e| EngineError::Archive(e.to_string()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let contents = fs::read(&path).map_err(|e| EngineError::Archive(e.to_string()))?;
        zip.start_file(name, options)
            .map_err(|e| EngineError::Archive(e.to_string()))?;
        zip.write_all(&contents)
            .map_err(|e| EngineError::Archive(e.to_string()))?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| EngineError::Archive(e.to_string()))?;
    Ok(cursor.into_inner())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

// ==========================================
// DebugArchiver
// ==========================================
pub struct DebugArchiver {
    store: Arc<dyn ObjectStore>,
    results: Arc<ResultRepository>,
    notifications: Arc<dyn NotificationGateway>,
    key_prefix: String,
}

impl DebugArchiver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        results: Arc<ResultRepository>,
        notifications: Arc<dyn NotificationGateway>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            results,
            notifications,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn object_key(&self, job_id: Uuid) -> String {
        format!("{}/{}.zip", self.key_prefix.trim_end_matches('/'), job_id)
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// 打包上传并记录位置；成功或失败都发布 debug 通知
    pub async fn archive_and_publish(&self, job_id: Uuid, receiver: Option<String>, dir: PathBuf) {
        let outcome = self.archive(job_id, &dir).await;
        let error = match outcome {
            Ok(key) => {
                tracing::info!(job_id = %job_id, key = %key, "调试包已上传");
                None
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "调试包上传失败");
                Some(e.to_string())
            }
        };

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            tracing::debug!(job_id = %job_id, error = %e, "调试目录清理失败");
        }

        publish_logged(
            self.notifications.as_ref(),
            ComputationEvent::debug_ready(job_id, receiver, error),
        );
    }

    async fn archive(&self, job_id: Uuid, dir: &Path) -> EngineResult<String> {
        let source = dir.to_path_buf();
        let bytes = tokio::task::spawn_blocking(move || zip_directory(&source))
            .await
            .map_err(|e| EngineError::Archive(e.to_string()))??;

        let key = self.object_key(job_id);
        self.store.put(&key, bytes).await?;
        self.results.save_debug_file_location(job_id, &key)?;
        Ok(key)
    }
}
