// ==========================================
// 动态裕度计算服务 - 运行配置读取 Trait
// ==========================================
// 职责: 定义装配/Worker 所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;
use std::path::PathBuf;

// ==========================================
// ServiceConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ServiceConfigReader: Send + Sync {
    /// 默认计算引擎
    ///
    /// # 默认值
    /// - Dynawo
    async fn get_default_provider(&self) -> Result<String, Box<dyn Error>>;

    /// 调试包在对象存储中的键前缀
    async fn get_debug_key_prefix(&self) -> Result<String, Box<dyn Error>>;

    /// 调试目录根
    ///
    /// # 默认值
    /// - 系统临时目录/dynamic-margin-calc-debug
    async fn get_debug_root_dir(&self) -> Result<PathBuf, Box<dyn Error>>;

    /// Worker 同时运行的作业数上限（至少为 1）
    async fn get_worker_concurrency(&self) -> Result<usize, Box<dyn Error>>;
}
