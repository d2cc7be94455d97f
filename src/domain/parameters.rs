// ==========================================
// 动态裕度计算服务 - 计算参数集
// ==========================================
// 职责: 参数集 / 负荷变化 / 过滤器引用 的载荷定义
// 红线: 参数集 id 只在创建时分配一次，更新时不可改写
// 红线: 负荷变化列表有序，读取时保持写入顺序
// ==========================================

use crate::domain::types::{CalculationType, LoadModelsRule};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

// ==========================================
// 引擎默认参数
// ==========================================
pub mod defaults {
    use crate::domain::types::{CalculationType, LoadModelsRule};

    pub const START_TIME: f64 = 0.0;
    pub const STOP_TIME: f64 = 200.0;
    pub const MARGIN_CALCULATION_START_TIME: f64 = 100.0;
    pub const LOAD_INCREASE_START_TIME: f64 = 10.0;
    pub const LOAD_INCREASE_STOP_TIME: f64 = 50.0;
    pub const CALCULATION_TYPE: CalculationType = CalculationType::GlobalMargin;
    pub const ACCURACY: i32 = 2;
    pub const LOAD_MODELS_RULE: LoadModelsRule = LoadModelsRule::AllLoads;
}

impl Default for CalculationType {
    fn default() -> Self {
        defaults::CALCULATION_TYPE
    }
}

impl Default for LoadModelsRule {
    fn default() -> Self {
        defaults::LOAD_MODELS_RULE
    }
}

// ==========================================
// FilterRef - 过滤器引用
// ==========================================
// name 为派生的展示名称，只在读取时由目录服务补全，从不落库
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRef {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl FilterRef {
    pub fn new(id: Uuid) -> Self {
        Self { id, name: None }
    }
}

// ==========================================
// LoadsVariation - 负荷变化
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadsVariation {
    /// 首次创建时分配；载荷中缺省表示"新增"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub load_filters: Vec<FilterRef>,
    pub variation: f64,
    /// 是否参与下一次计算
    #[serde(default)]
    pub active: bool,
}

impl LoadsVariation {
    pub fn new(load_filter_ids: Vec<Uuid>, variation: f64, active: bool) -> Self {
        Self {
            id: None,
            load_filters: load_filter_ids.into_iter().map(FilterRef::new).collect(),
            variation,
            active,
        }
    }

    pub fn load_filter_ids(&self) -> Vec<Uuid> {
        self.load_filters.iter().map(|f| f.id).collect()
    }
}

// ==========================================
// MarginCalculationParameters - 参数集
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginCalculationParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_calculation_start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_increase_start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_increase_stop_time: Option<f64>,
    #[serde(default)]
    pub calculation_type: CalculationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<i32>,
    #[serde(default)]
    pub load_models_rule: LoadModelsRule,
    #[serde(default)]
    pub loads_variations: Vec<LoadsVariation>,
}

impl MarginCalculationParameters {
    /// 引擎定义的默认参数（盖上给定 provider）
    pub fn default_values(provider: impl Into<String>) -> Self {
        Self {
            id: None,
            provider: Some(provider.into()),
            start_time: Some(defaults::START_TIME),
            stop_time: Some(defaults::STOP_TIME),
            margin_calculation_start_time: Some(defaults::MARGIN_CALCULATION_START_TIME),
            load_increase_start_time: Some(defaults::LOAD_INCREASE_START_TIME),
            load_increase_stop_time: Some(defaults::LOAD_INCREASE_STOP_TIME),
            calculation_type: defaults::CALCULATION_TYPE,
            accuracy: Some(defaults::ACCURACY),
            load_models_rule: defaults::LOAD_MODELS_RULE,
            loads_variations: Vec::new(),
        }
    }

    /// 去掉自身及全部子项 id，用于复制
    pub fn without_ids(&self) -> Self {
        let mut copy = self.clone();
        copy.id = None;
        for lv in copy.loads_variations.iter_mut() {
            lv.id = None;
        }
        copy
    }

    /// 只保留 active 的负荷变化
    pub fn retain_active_loads_variations(&mut self) {
        self.loads_variations.retain(|lv| lv.active);
    }

    /// 全部引用的过滤器 id（去重，保持首次出现顺序）
    pub fn distinct_load_filter_ids(&self) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        self.loads_variations
            .iter()
            .flat_map(|lv| lv.load_filters.iter().map(|f| f.id))
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// 用目录服务返回的名称补全过滤器展示名；缺失的名称保持为空
    pub fn apply_filter_names(&mut self, names: &HashMap<Uuid, String>) {
        for filter in self
            .loads_variations
            .iter_mut()
            .flat_map(|lv| lv.load_filters.iter_mut())
        {
            filter.name = names.get(&filter.id).cloned();
        }
    }
}
