// ==========================================
// 动态裕度计算服务 - 配置层
// ==========================================
// 职责: 系统配置管理,支持运行时覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod service_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use service_config_trait::ServiceConfigReader;
