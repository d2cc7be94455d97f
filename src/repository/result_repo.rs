// ==========================================
// 动态裕度计算服务 - 作业状态与结果仓储
// ==========================================
// 表: margin_calc_status / margin_calc_result / load_increase_result
//     scenario_result / failed_criterion
// 红线: 结果与终态在同一事务内写入
// 红线: 删除不存在的作业静默成功
// ==========================================

use crate::domain::result::{
    FailedCriterion, LoadIncreaseResult, MarginCalculationResult, ScenarioResult,
};
use crate::domain::types::{ComputationStatus, ExecutionStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const OWNER_LOAD_INCREASE: &str = "LOAD_INCREASE";
const OWNER_SCENARIO: &str = "SCENARIO";

// ==========================================
// ResultRepository
// ==========================================
pub struct ResultRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ResultRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 状态
    // ==========================================

    /// 写入状态（已存在则覆盖）
    pub fn insert_status(&self, ids: &[Uuid], status: ComputationStatus) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for id in ids {
            upsert_status(&tx, *id, status)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// 只更新已存在的状态记录，返回实际更新的 id
    pub fn update_status(
        &self,
        ids: &[Uuid],
        status: ComputationStatus,
    ) -> RepositoryResult<Vec<Uuid>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut updated = Vec::new();
        for id in ids {
            let affected = tx.execute(
                "UPDATE margin_calc_status SET status = ? WHERE result_uuid = ?",
                params![status.to_db_str(), id.to_string()],
            )?;
            if affected > 0 {
                updated.push(*id);
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    pub fn find_status(&self, id: Uuid) -> RepositoryResult<Option<ComputationStatus>> {
        let conn = self.get_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT status FROM margin_calc_status WHERE result_uuid = ?",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|s| {
            ComputationStatus::from_db_str(&s).ok_or(RepositoryError::FieldValueError {
                field: "status".to_string(),
                message: s,
            })
        })
        .transpose()
    }

    // ==========================================
    // 结果
    // ==========================================

    /// 写入结果树并设置作业状态（单事务）
    pub fn insert_result(
        &self,
        id: Uuid,
        result: &MarginCalculationResult,
        status: ComputationStatus,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        delete_result_tree(&tx, id)?;
        tx.execute(
            "INSERT INTO margin_calc_result (result_uuid) VALUES (?)",
            params![id.to_string()],
        )?;

        for (pos, lir) in result.load_increase_results.iter().enumerate() {
            let lir_id = Uuid::new_v4().to_string();
            tx.execute(
                r#"INSERT INTO load_increase_result (id, result_uuid, pos, load_level, status)
                   VALUES (?, ?, ?, ?, ?)"#,
                params![
                    &lir_id,
                    id.to_string(),
                    pos as i64,
                    lir.load_level,
                    lir.status.to_db_str()
                ],
            )?;
            insert_failed_criteria(&tx, &lir_id, OWNER_LOAD_INCREASE, &lir.failed_criteria)?;

            for (scenario_pos, scenario) in lir.scenario_results.iter().enumerate() {
                let scenario_id = Uuid::new_v4().to_string();
                tx.execute(
                    r#"INSERT INTO scenario_result
                           (id, load_increase_result_id, pos, equipment_id, status)
                       VALUES (?, ?, ?, ?, ?)"#,
                    params![
                        &scenario_id,
                        &lir_id,
                        scenario_pos as i64,
                        &scenario.id,
                        scenario.status.to_db_str()
                    ],
                )?;
                insert_failed_criteria(
                    &tx,
                    &scenario_id,
                    OWNER_SCENARIO,
                    &scenario.failed_criteria,
                )?;
            }
        }

        upsert_status(&tx, id, status)?;
        tx.commit()?;
        Ok(())
    }

    pub fn find_result(&self, id: Uuid) -> RepositoryResult<Option<MarginCalculationResult>> {
        let conn = self.get_conn()?;

        let present = conn
            .query_row(
                "SELECT 1 FROM margin_calc_result WHERE result_uuid = ?",
                params![id.to_string()],
                |_row| Ok(()),
            )
            .optional()?;
        if present.is_none() {
            return Ok(None);
        }

        let lir_rows: Vec<(String, f64, String)> = {
            let mut stmt = conn.prepare(
                r#"SELECT id, load_level, status FROM load_increase_result
                   WHERE result_uuid = ?
                   ORDER BY pos"#,
            )?;
            let rows = stmt
                .query_map(params![id.to_string()], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut load_increase_results = Vec::with_capacity(lir_rows.len());
        for (lir_id, load_level, raw_status) in lir_rows {
            let mut lir = LoadIncreaseResult::new(load_level, parse_execution_status(&raw_status)?);
            lir.failed_criteria = load_failed_criteria(&conn, &lir_id)?;
            lir.scenario_results = load_scenarios(&conn, &lir_id)?;
            load_increase_results.push(lir);
        }

        Ok(Some(MarginCalculationResult::new(load_increase_results)))
    }

    /// 已保存的结果数量
    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM margin_calc_result", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// 删除作业的结果与状态
    pub fn delete(&self, id: Uuid) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        delete_result_tree(&tx, id)?;
        tx.execute(
            "DELETE FROM margin_calc_status WHERE result_uuid = ?",
            params![id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_all(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            DELETE FROM failed_criterion;
            DELETE FROM margin_calc_result;
            DELETE FROM margin_calc_status;
            "#,
        )?;
        Ok(())
    }

    // ==========================================
    // 调试文件位置
    // ==========================================

    /// 记录调试包位置；状态记录不存在时以 NOT_DONE 新建
    pub fn save_debug_file_location(&self, id: Uuid, location: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO margin_calc_status (result_uuid, status, debug_file_location)
               VALUES (?, ?, ?)
               ON CONFLICT(result_uuid) DO UPDATE SET debug_file_location = excluded.debug_file_location"#,
            params![
                id.to_string(),
                ComputationStatus::NotDone.to_db_str(),
                location
            ],
        )?;
        Ok(())
    }

    pub fn find_debug_file_location(&self, id: Uuid) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let location: Option<Option<String>> = conn
            .query_row(
                "SELECT debug_file_location FROM margin_calc_status WHERE result_uuid = ?",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(location.flatten())
    }
}

// ==========================================
// 行读写辅助
// ==========================================

fn upsert_status(conn: &Connection, id: Uuid, status: ComputationStatus) -> RepositoryResult<()> {
    conn.execute(
        r#"INSERT INTO margin_calc_status (result_uuid, status) VALUES (?, ?)
           ON CONFLICT(result_uuid) DO UPDATE SET status = excluded.status"#,
        params![id.to_string(), status.to_db_str()],
    )?;
    Ok(())
}

/// 删除结果树（failed_criterion 无外键，需先按 owner 清理）
fn delete_result_tree(conn: &Connection, id: Uuid) -> RepositoryResult<()> {
    let id = id.to_string();
    conn.execute(
        r#"DELETE FROM failed_criterion WHERE owner_id IN (
               SELECT sr.id FROM scenario_result sr
               JOIN load_increase_result lir ON lir.id = sr.load_increase_result_id
               WHERE lir.result_uuid = ?1
               UNION
               SELECT id FROM load_increase_result WHERE result_uuid = ?1
           )"#,
        params![&id],
    )?;
    conn.execute(
        "DELETE FROM margin_calc_result WHERE result_uuid = ?",
        params![&id],
    )?;
    Ok(())
}

fn insert_failed_criteria(
    conn: &Connection,
    owner_id: &str,
    owner_kind: &str,
    criteria: &[FailedCriterion],
) -> RepositoryResult<()> {
    for (pos, criterion) in criteria.iter().enumerate() {
        conn.execute(
            r#"INSERT INTO failed_criterion (owner_id, owner_kind, pos, description, time)
               VALUES (?, ?, ?, ?, ?)"#,
            params![
                owner_id,
                owner_kind,
                pos as i64,
                &criterion.description,
                criterion.time
            ],
        )?;
    }
    Ok(())
}

fn load_failed_criteria(conn: &Connection, owner_id: &str) -> RepositoryResult<Vec<FailedCriterion>> {
    let mut stmt = conn.prepare(
        "SELECT description, time FROM failed_criterion WHERE owner_id = ? ORDER BY pos",
    )?;
    let criteria = stmt
        .query_map(params![owner_id], |row| {
            Ok(FailedCriterion {
                description: row.get(0)?,
                time: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(criteria)
}

fn load_scenarios(conn: &Connection, lir_id: &str) -> RepositoryResult<Vec<ScenarioResult>> {
    let rows: Vec<(String, String, String)> = {
        let mut stmt = conn.prepare(
            r#"SELECT id, equipment_id, status FROM scenario_result
               WHERE load_increase_result_id = ?
               ORDER BY pos"#,
        )?;
        let rows = stmt
            .query_map(params![lir_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut scenarios = Vec::with_capacity(rows.len());
    for (scenario_id, equipment_id, raw_status) in rows {
        let mut scenario = ScenarioResult::new(equipment_id, parse_execution_status(&raw_status)?);
        scenario.failed_criteria = load_failed_criteria(conn, &scenario_id)?;
        scenarios.push(scenario);
    }
    Ok(scenarios)
}

fn parse_execution_status(raw: &str) -> RepositoryResult<ExecutionStatus> {
    ExecutionStatus::from_db_str(raw).ok_or_else(|| RepositoryError::FieldValueError {
        field: "status".to_string(),
        message: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn setup() -> ResultRepository {
        ResultRepository::new(Arc::new(Mutex::new(open_in_memory().unwrap())))
    }

    fn sample_result() -> MarginCalculationResult {
        let mut first = LoadIncreaseResult::new(100.0, ExecutionStatus::CriteriaNonRespected);
        first
            .failed_criteria
            .push(FailedCriterion::new("total load power > 200MW", 56.9));
        let mut scenario = ScenarioResult::new("_LOAD__11_EC", ExecutionStatus::Divergence);
        scenario
            .failed_criteria
            .push(FailedCriterion::new("voltage below 0.8pu", 112.0));
        first.scenario_results.push(scenario);
        first
            .scenario_results
            .push(ScenarioResult::new("_GEN____1_SM", ExecutionStatus::Convergence));

        MarginCalculationResult::new(vec![
            first,
            LoadIncreaseResult::new(50.0, ExecutionStatus::Convergence),
        ])
    }

    #[test]
    fn test_result_tree_roundtrip_keeps_order() {
        let repo = setup();
        let id = Uuid::new_v4();
        repo.insert_status(&[id], ComputationStatus::Running).unwrap();

        let result = sample_result();
        repo.insert_result(id, &result, ComputationStatus::Succeed).unwrap();

        assert_eq!(repo.find_result(id).unwrap(), Some(result));
        assert_eq!(repo.find_status(id).unwrap(), Some(ComputationStatus::Succeed));
    }

    #[test]
    fn test_update_status_only_touches_existing() {
        let repo = setup();
        let known = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        repo.insert_status(&[known], ComputationStatus::Succeed).unwrap();

        let updated = repo
            .update_status(&[known, unknown], ComputationStatus::NotDone)
            .unwrap();

        assert_eq!(updated, vec![known]);
        assert_eq!(repo.find_status(known).unwrap(), Some(ComputationStatus::NotDone));
        assert_eq!(repo.find_status(unknown).unwrap(), None);
    }

    #[test]
    fn test_delete_removes_everything_and_tolerates_unknown() {
        let repo = setup();
        let id = Uuid::new_v4();
        repo.insert_result(id, &sample_result(), ComputationStatus::Succeed).unwrap();

        assert_eq!(repo.count().unwrap(), 1);
        repo.delete(id).unwrap();
        repo.delete(Uuid::new_v4()).unwrap();
        assert_eq!(repo.count().unwrap(), 0);

        assert_eq!(repo.find_result(id).unwrap(), None);
        assert_eq!(repo.find_status(id).unwrap(), None);
        let conn = repo.get_conn().unwrap();
        let orphans: i64 = conn
            .query_row("SELECT COUNT(*) FROM failed_criterion", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_debug_location_creates_not_done_status_when_absent() {
        let repo = setup();
        let id = Uuid::new_v4();

        repo.save_debug_file_location(id, "debug/dynamic-margin-calculation/x.zip")
            .unwrap();

        assert_eq!(repo.find_status(id).unwrap(), Some(ComputationStatus::NotDone));
        assert_eq!(
            repo.find_debug_file_location(id).unwrap().as_deref(),
            Some("debug/dynamic-margin-calculation/x.zip")
        );

        let running = Uuid::new_v4();
        repo.insert_status(&[running], ComputationStatus::Running).unwrap();
        repo.save_debug_file_location(running, "loc").unwrap();
        assert_eq!(repo.find_status(running).unwrap(), Some(ComputationStatus::Running));
    }
}
