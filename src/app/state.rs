// ==========================================
// 动态裕度计算服务 - 应用状态
// ==========================================
// 职责: 装配仓储、引擎、API 实例，管理共享连接
// 外部协作方（过滤器/目录/参数源/计算引擎/报告/通知/对象存储）由宿主注入
// ==========================================

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::api::{ComputationApi, ParametersApi};
use crate::client::computation::ComputationEngine;
use crate::client::sources::{
    DirectoryResolver, FilterResolver, SecurityAnalysisSource, SimulationParametersSource,
};
use crate::client::storage::{ObjectStore, ReportSink};
use crate::config::{ConfigManager, ServiceConfigReader};
use crate::db::{configure_sqlite_connection, init_schema, open_sqlite_connection};
use crate::engine::{
    DebugArchiver, JobOrchestrator, NotificationGateway, OrchestratorDeps, RunContextBuilder,
    RunWorker, WorkerShutdown,
};
use crate::repository::{ParametersRepository, ResultRepository, RunQueueRepository};
use rusqlite::Connection;
use tokio::task::JoinHandle;

/// 外部协作方
pub struct Collaborators {
    pub filters: Arc<dyn FilterResolver>,
    pub directory: Arc<dyn DirectoryResolver>,
    pub security_analysis: Arc<dyn SecurityAnalysisSource>,
    pub simulation: Arc<dyn SimulationParametersSource>,
    pub engine: Arc<dyn ComputationEngine>,
    pub reports: Arc<dyn ReportSink>,
    pub notifications: Arc<dyn NotificationGateway>,
    pub object_store: Arc<dyn ObjectStore>,
}

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径（内存库为 ":memory:"）
    pub db_path: String,

    /// 参数集API
    pub parameters_api: Arc<ParametersApi>,

    /// 计算作业API
    pub computation_api: Arc<ComputationApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 运行队列仓储（启动时统计/恢复）
    pub run_queue_repo: Arc<RunQueueRepository>,

    orchestrator: Arc<JobOrchestrator>,
    worker_concurrency: usize,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - collaborators: 外部协作方
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub async fn new(db_path: String, collaborators: Collaborators) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        Self::from_connection(db_path, conn, collaborators).await
    }

    /// 从已打开的连接装配（测试使用内存库或临时文件）
    pub async fn from_connection(
        db_path: String,
        conn: Connection,
        collaborators: Collaborators,
    ) -> Result<Self, String> {
        configure_sqlite_connection(&conn).map_err(|e| format!("连接配置失败: {}", e))?;
        init_schema(&conn).map_err(|e| format!("建表失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let default_provider = config_manager
            .get_default_provider()
            .await
            .map_err(|e| format!("读取默认 provider 失败: {}", e))?;
        let debug_key_prefix = config_manager
            .get_debug_key_prefix()
            .await
            .map_err(|e| format!("读取调试包前缀失败: {}", e))?;
        let debug_root_dir: PathBuf = config_manager
            .get_debug_root_dir()
            .await
            .map_err(|e| format!("读取调试目录失败: {}", e))?;
        let worker_concurrency = config_manager
            .get_worker_concurrency()
            .await
            .map_err(|e| format!("读取 Worker 并发数失败: {}", e))?;

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let parameters_repo = Arc::new(ParametersRepository::new(conn.clone()));
        let result_repo = Arc::new(ResultRepository::new(conn.clone()));
        let run_queue_repo = Arc::new(RunQueueRepository::new(conn.clone()));

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let debug_archiver = Arc::new(DebugArchiver::new(
            collaborators.object_store.clone(),
            result_repo.clone(),
            collaborators.notifications.clone(),
            debug_key_prefix,
        ));

        let builder = Arc::new(RunContextBuilder::new(
            parameters_repo.clone(),
            collaborators.filters.clone(),
            collaborators.engine.name(),
            default_provider.clone(),
        ));

        let orchestrator = Arc::new(JobOrchestrator::new(OrchestratorDeps {
            results: result_repo.clone(),
            queue: run_queue_repo.clone(),
            filters: collaborators.filters.clone(),
            security_analysis: collaborators.security_analysis,
            simulation: collaborators.simulation,
            engine: collaborators.engine,
            reports: collaborators.reports,
            notifications: collaborators.notifications,
            debug: debug_archiver.clone(),
            debug_root_dir,
        }));

        // ==========================================
        // 初始化API层
        // ==========================================
        let parameters_api = Arc::new(ParametersApi::new(
            parameters_repo,
            collaborators.directory,
            collaborators.filters,
            default_provider.clone(),
        ));
        let computation_api = Arc::new(ComputationApi::new(
            builder,
            orchestrator.clone(),
            result_repo,
            run_queue_repo.clone(),
            debug_archiver,
            default_provider,
        ));

        tracing::info!(worker_concurrency, "AppState初始化完成");

        Ok(Self {
            db_path,
            parameters_api,
            computation_api,
            config_manager,
            run_queue_repo,
            orchestrator,
            worker_concurrency,
        })
    }

    /// 启动运行队列 Worker
    pub fn start_worker(&self) -> (JoinHandle<()>, WorkerShutdown) {
        RunWorker::new(
            self.orchestrator.clone(),
            self.run_queue_repo.clone(),
            self.worker_concurrency,
        )
        .spawn()
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

// ==========================================
// 默认数据库路径辅助函数
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - DMC_DB_PATH 环境变量（非空时）
/// - 否则: 用户本地数据目录/dynamic-margin-calc/dynamic_margin_calc.db
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var("DMC_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./dynamic_margin_calc.db");
    if let Some(data_dir) = dirs::data_local_dir() {
        let dir = data_dir.join("dynamic-margin-calc");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("dynamic_margin_calc.db");
        }
    }
    path.to_string_lossy().to_string()
}
