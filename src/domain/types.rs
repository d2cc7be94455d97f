// ==========================================
// 动态裕度计算服务 - 领域类型定义
// ==========================================
// 依据: 作业状态机 (RUNNING → SUCCEED / FAILED / NOT_DONE)
// 依据: 计算引擎结果状态枚举
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 计算作业状态 (Computation Status)
// ==========================================
// RUNNING 是唯一的非终态; NOT_DONE 仅由"失效"操作写入
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputationStatus {
    Running, // 计算中
    Succeed, // 成功
    Failed,  // 失败
    NotDone, // 已失效
}

impl fmt::Display for ComputationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ComputationStatus {
    /// 从数据库字符串解析状态
    ///
    /// 未知值返回 None，由仓储层转换为错误
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(ComputationStatus::Running),
            "SUCCEED" => Some(ComputationStatus::Succeed),
            "FAILED" => Some(ComputationStatus::Failed),
            "NOT_DONE" => Some(ComputationStatus::NotDone),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ComputationStatus::Running => "RUNNING",
            ComputationStatus::Succeed => "SUCCEED",
            ComputationStatus::Failed => "FAILED",
            ComputationStatus::NotDone => "NOT_DONE",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ComputationStatus::Succeed | ComputationStatus::Failed)
    }
}

// ==========================================
// 裕度计算类型 (Calculation Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationType {
    GlobalMargin, // 全局裕度
    LocalMargin,  // 局部裕度
}

impl fmt::Display for CalculationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl CalculationType {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "GLOBAL_MARGIN" => Some(CalculationType::GlobalMargin),
            "LOCAL_MARGIN" => Some(CalculationType::LocalMargin),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            CalculationType::GlobalMargin => "GLOBAL_MARGIN",
            CalculationType::LocalMargin => "LOCAL_MARGIN",
        }
    }
}

// ==========================================
// 负荷模型规则 (Load Models Rule)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadModelsRule {
    AllLoads,      // 全部负荷
    TargetedLoads, // 仅目标负荷
}

impl fmt::Display for LoadModelsRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl LoadModelsRule {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "ALL_LOADS" => Some(LoadModelsRule::AllLoads),
            "TARGETED_LOADS" => Some(LoadModelsRule::TargetedLoads),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            LoadModelsRule::AllLoads => "ALL_LOADS",
            LoadModelsRule::TargetedLoads => "TARGETED_LOADS",
        }
    }
}

// ==========================================
// 引擎执行状态 (Execution Status)
// ==========================================
// 依据: 计算引擎对每个负荷增长/场景给出的收敛状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Convergence,          // 收敛
    Divergence,           // 发散
    CriteriaNonRespected, // 判据未满足
    ExecutionProblem,     // 执行异常
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ExecutionStatus {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "CONVERGENCE" => Some(ExecutionStatus::Convergence),
            "DIVERGENCE" => Some(ExecutionStatus::Divergence),
            "CRITERIA_NON_RESPECTED" => Some(ExecutionStatus::CriteriaNonRespected),
            "EXECUTION_PROBLEM" => Some(ExecutionStatus::ExecutionProblem),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Convergence => "CONVERGENCE",
            ExecutionStatus::Divergence => "DIVERGENCE",
            ExecutionStatus::CriteriaNonRespected => "CRITERIA_NON_RESPECTED",
            ExecutionStatus::ExecutionProblem => "EXECUTION_PROBLEM",
        }
    }
}
