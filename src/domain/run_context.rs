// ==========================================
// 动态裕度计算服务 - 运行上下文
// ==========================================
// 两阶段:
// - RunContext: 提交时构建，随运行消息进入持久队列
// - FrozenRunContext: Worker preRun 补全外部输入后冻结，交给计算引擎
// ==========================================

use crate::domain::parameters::MarginCalculationParameters;
use crate::domain::types::{CalculationType, LoadModelsRule};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// 默认报告类型
pub const DEFAULT_REPORT_TYPE: &str = "DynamicMarginCalculation";

// ==========================================
// 网络上下文
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkContext {
    pub network_uuid: Uuid,
    /// None 表示初始变体
    #[serde(default)]
    pub variant_id: Option<String>,
}

impl NetworkContext {
    pub fn new(network_uuid: Uuid, variant_id: Option<String>) -> Self {
        Self {
            network_uuid,
            variant_id,
        }
    }
}

// ==========================================
// 报告信息
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInfos {
    #[serde(default)]
    pub report_uuid: Option<Uuid>,
    #[serde(default)]
    pub reporter_id: Option<String>,
    pub computation_type: String,
}

impl Default for ReportInfos {
    fn default() -> Self {
        Self {
            report_uuid: None,
            reporter_id: None,
            computation_type: DEFAULT_REPORT_TYPE.to_string(),
        }
    }
}

// ==========================================
// 提交请求
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub network_uuid: Uuid,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub report_infos: ReportInfos,
    pub user_id: String,
    /// 动态仿真参数原始 JSON
    pub dynamic_simulation_parameters_json: String,
    pub dynamic_security_analysis_parameters_uuid: Uuid,
    pub parameters_uuid: Uuid,
    #[serde(default)]
    pub debug: bool,
}

// ==========================================
// RunContext - 提交时构建的运行上下文
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunContext {
    pub network: NetworkContext,
    #[serde(default)]
    pub receiver: Option<String>,
    pub provider: String,
    pub report_infos: ReportInfos,
    pub user_id: String,
    /// 仅包含 active 的负荷变化
    pub parameters: MarginCalculationParameters,
    pub dynamic_simulation_parameters_json: String,
    pub dynamic_security_analysis_parameters_uuid: Uuid,
    pub debug: bool,
}

// ==========================================
// 外部输入形状
// ==========================================

/// 网络设备（过滤器求值结果）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub id: String,
    pub equipment_type: String,
}

impl Equipment {
    pub fn load(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            equipment_type: "LOAD".to_string(),
        }
    }
}

/// 预想事故
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contingency {
    pub id: String,
    #[serde(default)]
    pub element_ids: Vec<String>,
}

/// 动态模型配置（引擎不透明）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicModelConfig {
    pub model: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// 已解析的负荷变化: 具体负荷列表 + 变化量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLoadsVariation {
    pub loads: Vec<Equipment>,
    pub variation: f64,
}

// ==========================================
// 引擎运行参数（preRun 冻结）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineRunParameters {
    pub start_time: Option<f64>,
    pub stop_time: Option<f64>,
    pub margin_calculation_start_time: Option<f64>,
    pub load_increase_start_time: Option<f64>,
    pub load_increase_stop_time: Option<f64>,
    pub contingencies_start_time: Option<f64>,
    pub calculation_type: CalculationType,
    pub accuracy: Option<i32>,
    pub load_models_rule: LoadModelsRule,
    /// 引擎专有参数（来自动态仿真参数源）
    pub engine_parameters: serde_json::Value,
    pub debug_dir: Option<PathBuf>,
}

// ==========================================
// FrozenRunContext - 冻结后的运行上下文
// ==========================================
#[derive(Debug, Clone)]
pub struct FrozenRunContext {
    pub job_id: Uuid,
    pub run: RunContext,
    pub dynamic_model: Vec<DynamicModelConfig>,
    pub contingencies: Vec<Contingency>,
    pub loads_variations: Vec<ResolvedLoadsVariation>,
    pub run_parameters: EngineRunParameters,
}
