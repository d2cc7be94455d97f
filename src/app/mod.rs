// ==========================================
// 动态裕度计算服务 - 应用层
// ==========================================
// 职责: 依赖装配,连接传输层与业务层
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState, Collaborators};
