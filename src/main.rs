// ==========================================
// 动态裕度计算服务 - 主入口
// ==========================================
// 职责: 初始化日志与数据库，恢复遗留运行消息，报告队列与结果数量
// 计算引擎与外部服务由宿主进程通过 AppState 注入
// ==========================================

use anyhow::Context;
use dynamic_margin_calc::app::get_default_db_path;
use dynamic_margin_calc::config::ConfigManager;
use dynamic_margin_calc::db::{init_schema, open_sqlite_connection, read_schema_version};
use dynamic_margin_calc::repository::{QueueMessageStatus, ResultRepository, RunQueueRepository};
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("DMC_LOG_JSON").is_ok_and(|v| v == "1") {
        dynamic_margin_calc::logging::init_json();
    } else {
        dynamic_margin_calc::logging::init();
    }

    tracing::info!("==================================================");
    tracing::info!("{}", dynamic_margin_calc::APP_NAME);
    tracing::info!("系统版本: {}", dynamic_margin_calc::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let conn = open_sqlite_connection(&db_path)
        .with_context(|| format!("无法打开数据库: {}", db_path))?;
    init_schema(&conn).context("建表失败")?;
    let schema_version = read_schema_version(&conn).context("读取 schema_version 失败")?;
    tracing::info!(schema_version = ?schema_version, "数据库就绪");

    let conn = Arc::new(Mutex::new(conn));

    let config = ConfigManager::from_connection(conn.clone())
        .map_err(|e| anyhow::anyhow!("无法创建ConfigManager: {}", e))?;
    let snapshot = config
        .get_config_snapshot()
        .map_err(|e| anyhow::anyhow!("读取配置失败: {}", e))?;
    tracing::info!(config = %snapshot, "配置已加载");

    let results = ResultRepository::new(conn.clone());
    let queue = RunQueueRepository::new(conn);
    let recovered = queue.recover_taken().context("恢复遗留运行消息失败")?;
    if recovered > 0 {
        tracing::warn!(recovered, "上次退出时仍在处理的运行消息已放回队列");
    }
    tracing::info!(
        pending = queue.count_by_status(QueueMessageStatus::Pending)?,
        taken = queue.count_by_status(QueueMessageStatus::Taken)?,
        stored_results = results.count()?,
        "运行队列与结果状态"
    );

    tracing::info!("服务就绪");
    Ok(())
}
