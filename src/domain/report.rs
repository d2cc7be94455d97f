// ==========================================
// 动态裕度计算服务 - 诊断报告节点
// ==========================================
// 计算引擎在运行过程中向报告根节点追加子节点；
// 编排器据"是否已有子节点"判断计算是否已产生部分产物
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// 报告条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub key: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// 报告快照（发送给报告服务）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub key: String,
    pub message: String,
    pub children: Vec<ReportEntry>,
}

/// 共享的报告根节点
///
/// clone 共享同一棵子节点列表
#[derive(Debug, Clone)]
pub struct ReportNode {
    key: String,
    message: String,
    children: Arc<Mutex<Vec<ReportEntry>>>,
}

impl ReportNode {
    pub fn root(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
            children: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 追加子节点
    pub fn add_child(&self, key: impl Into<String>, message: impl Into<String>) {
        let entry = ReportEntry {
            key: key.into(),
            message: message.into(),
            timestamp: Utc::now(),
        };
        // 报告只追加，锁中毒时沿用内部数据
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub fn has_children(&self) -> bool {
        !self
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub fn snapshot(&self) -> ReportSnapshot {
        ReportSnapshot {
            key: self.key.clone(),
            message: self.message.clone(),
            children: self
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
