// ==========================================
// 动态裕度计算服务 - 计算结果树
// ==========================================
// 结构: 结果 → 负荷增长结果(有序) → 场景结果(有序) / 失败判据(有序)
// 红线: 结果在作业完成时一次性写入，之后不可变
// ==========================================

use crate::domain::types::{ComputationStatus, ExecutionStatus};
use serde::{Deserialize, Serialize};

/// 失败判据 (描述 + 触发时刻)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCriterion {
    pub description: String,
    pub time: f64,
}

impl FailedCriterion {
    pub fn new(description: impl Into<String>, time: f64) -> Self {
        Self {
            description: description.into(),
            time,
        }
    }
}

/// 场景结果 (设备 id + 状态 + 失败判据)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub failed_criteria: Vec<FailedCriterion>,
}

impl ScenarioResult {
    pub fn new(id: impl Into<String>, status: ExecutionStatus) -> Self {
        Self {
            id: id.into(),
            status,
            failed_criteria: Vec::new(),
        }
    }
}

/// 负荷增长结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadIncreaseResult {
    pub load_level: f64,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub scenario_results: Vec<ScenarioResult>,
    #[serde(default)]
    pub failed_criteria: Vec<FailedCriterion>,
}

impl LoadIncreaseResult {
    pub fn new(load_level: f64, status: ExecutionStatus) -> Self {
        Self {
            load_level,
            status,
            scenario_results: Vec::new(),
            failed_criteria: Vec::new(),
        }
    }
}

/// 裕度计算结果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginCalculationResult {
    #[serde(default)]
    pub load_increase_results: Vec<LoadIncreaseResult>,
}

impl MarginCalculationResult {
    pub fn new(load_increase_results: Vec<LoadIncreaseResult>) -> Self {
        Self {
            load_increase_results,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// 是否有任一负荷增长结果为 EXECUTION_PROBLEM
    pub fn has_execution_problem(&self) -> bool {
        self.load_increase_results
            .iter()
            .any(|r| r.status == ExecutionStatus::ExecutionProblem)
    }

    /// 结果 → 作业终态
    ///
    /// 任一 EXECUTION_PROBLEM ⇒ FAILED，否则 SUCCEED
    pub fn computation_status(&self) -> ComputationStatus {
        if self.has_execution_problem() {
            ComputationStatus::Failed
        } else {
            ComputationStatus::Succeed
        }
    }

    /// 监控标签: OK / NOK
    pub fn outcome_tag(&self) -> &'static str {
        if self.has_execution_problem() {
            "NOK"
        } else {
            "OK"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_non_respected_is_still_succeed() {
        let mut overloaded = LoadIncreaseResult::new(100.0, ExecutionStatus::CriteriaNonRespected);
        overloaded.failed_criteria.push(FailedCriterion::new(
            "total load power = 207.704MW > 200MW (criteria id: Risque protection)",
            56.92932,
        ));
        let result = MarginCalculationResult::new(vec![
            overloaded,
            LoadIncreaseResult::new(0.0, ExecutionStatus::Convergence),
        ]);

        assert_eq!(result.computation_status(), ComputationStatus::Succeed);
        assert_eq!(result.outcome_tag(), "OK");
    }

    #[test]
    fn test_execution_problem_fails_the_job() {
        let result = MarginCalculationResult::new(vec![
            LoadIncreaseResult::new(0.0, ExecutionStatus::Convergence),
            LoadIncreaseResult::new(50.0, ExecutionStatus::ExecutionProblem),
        ]);

        assert_eq!(result.computation_status(), ComputationStatus::Failed);
        assert_eq!(result.outcome_tag(), "NOK");
    }

    #[test]
    fn test_empty_result_is_succeed() {
        assert_eq!(
            MarginCalculationResult::empty().computation_status(),
            ComputationStatus::Succeed
        );
    }
}
