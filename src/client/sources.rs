// ==========================================
// 动态裕度计算服务 - 外部数据源接口
// ==========================================
// 过滤器服务 / 目录服务 / 安全分析参数 / 动态仿真参数
// 实现者由宿主注入（HTTP 客户端、测试桩等）
// ==========================================

use crate::client::error::ClientResult;
use crate::domain::run_context::{Contingency, DynamicModelConfig, Equipment, NetworkContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 过滤器定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDefinition {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub equipment_type: String,
}

// ==========================================
// FilterResolver - 过滤器服务
// ==========================================
#[async_trait]
pub trait FilterResolver: Send + Sync {
    /// 批量查询过滤器定义；不存在的 id 不出现在返回值中
    async fn get_filters(&self, ids: &[Uuid]) -> ClientResult<Vec<FilterDefinition>>;

    /// 在给定网络/变体上对过滤器求值，返回命中的设备
    async fn resolve(&self, ids: &[Uuid], network: &NetworkContext)
        -> ClientResult<Vec<Equipment>>;
}

// ==========================================
// DirectoryResolver - 目录服务（展示名称）
// ==========================================
#[async_trait]
pub trait DirectoryResolver: Send + Sync {
    /// 批量查询元素名称；未知 id 不出现在返回值中
    async fn get_element_names(
        &self,
        ids: &[Uuid],
        user_id: &str,
    ) -> ClientResult<HashMap<Uuid, String>>;
}

/// 安全分析参数中与本计算相关的部分
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAnalysisParametersValues {
    #[serde(default)]
    pub contingencies: Vec<Contingency>,
    #[serde(default)]
    pub contingencies_start_time: Option<f64>,
}

#[async_trait]
pub trait SecurityAnalysisSource: Send + Sync {
    async fn get_parameters_values(
        &self,
        parameters_uuid: Uuid,
        network: &NetworkContext,
    ) -> ClientResult<SecurityAnalysisParametersValues>;
}

/// 动态仿真参数求值结果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParametersValues {
    #[serde(default)]
    pub dynamic_model: Vec<DynamicModelConfig>,
    #[serde(default)]
    pub engine_parameters: serde_json::Value,
}

#[async_trait]
pub trait SimulationParametersSource: Send + Sync {
    async fn get_parameters_values(
        &self,
        parameters_json: &str,
        network: &NetworkContext,
    ) -> ClientResult<SimulationParametersValues>;
}
