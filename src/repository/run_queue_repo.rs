// ==========================================
// 动态裕度计算服务 - 运行消息持久队列
// ==========================================
// 状态流转: PENDING → TAKEN → 确认后删除
// 进程重启后 TAKEN 消息回滚为 PENDING（至少投递一次）
// 红线: 队列只保存未处理完的消息，作业删除时同步清理
// ==========================================

use crate::repository::error::{parse_uuid, RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// 队列消息状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMessageStatus {
    Pending,
    Taken,
}

impl QueueMessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueMessageStatus::Pending => "PENDING",
            QueueMessageStatus::Taken => "TAKEN",
        }
    }
}

/// 出队的运行消息
#[derive(Debug, Clone, PartialEq)]
pub struct RunMessage {
    pub message_id: Uuid,
    pub job_id: Uuid,
    /// 编码后的运行上下文
    pub payload: String,
}

pub struct RunQueueRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RunQueueRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 入队，返回消息 id
    pub fn enqueue(&self, job_id: Uuid, payload: &str) -> RepositoryResult<Uuid> {
        let conn = self.get_conn()?;
        let message_id = Uuid::new_v4();
        conn.execute(
            r#"INSERT INTO run_queue (message_id, job_id, payload, status, created_at)
               VALUES (?1, ?2, ?3, 'PENDING', ?4)"#,
            params![
                message_id.to_string(),
                job_id.to_string(),
                payload,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(message_id)
    }

    /// 取出最早的 PENDING 消息并标记为 TAKEN
    pub fn dequeue(&self) -> RepositoryResult<Option<RunMessage>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let row: Option<(String, String, String)> = tx
            .query_row(
                r#"SELECT message_id, job_id, payload FROM run_queue
                   WHERE status = 'PENDING'
                   ORDER BY created_at, rowid
                   LIMIT 1"#,
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((raw_message_id, raw_job_id, payload)) = row else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE run_queue SET status = 'TAKEN', taken_at = ?1 WHERE message_id = ?2",
            params![Utc::now().to_rfc3339(), &raw_message_id],
        )?;
        tx.commit()?;

        Ok(Some(RunMessage {
            message_id: parse_uuid("message_id", &raw_message_id)?,
            job_id: parse_uuid("job_id", &raw_job_id)?,
            payload,
        }))
    }

    /// 确认消息已处理完毕，删除该行（已被清理时静默成功）
    pub fn acknowledge(&self, message_id: Uuid) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "DELETE FROM run_queue WHERE message_id = ?1",
            params![message_id.to_string()],
        )?;
        Ok(())
    }

    /// 删除作业的全部消息，返回删除条数
    pub fn delete_by_job(&self, job_id: Uuid) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM run_queue WHERE job_id = ?1",
            params![job_id.to_string()],
        )?;
        Ok(deleted)
    }

    pub fn delete_all(&self) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute("DELETE FROM run_queue", [])?;
        Ok(deleted)
    }

    /// 启动时把未完成的 TAKEN 消息放回队列，返回回滚条数
    pub fn recover_taken(&self) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let recovered = conn.execute(
            "UPDATE run_queue SET status = 'PENDING', taken_at = NULL WHERE status = 'TAKEN'",
            [],
        )?;
        Ok(recovered)
    }

    pub fn count_by_status(&self, status: QueueMessageStatus) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM run_queue WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn pending_count(&self) -> RepositoryResult<i64> {
        self.count_by_status(QueueMessageStatus::Pending)
    }

    /// 队列中的消息总数（PENDING + TAKEN）
    pub fn total_count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM run_queue", [], |row| row.get(0))?;
        Ok(count)
    }
}
