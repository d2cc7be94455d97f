// ==========================================
// 动态裕度计算服务 - 参数集仓储
// ==========================================
// 表: margin_calc_parameters / loads_variation / loads_variation_load_filter
// 红线: 负荷变化与过滤器引用按 pos 有序读写
// 红线: 合并更新在单个事务内完成，任何失败整体回滚
// ==========================================

use crate::domain::merge::{plan_loads_variation_merge, MergeError};
use crate::domain::parameters::{FilterRef, LoadsVariation, MarginCalculationParameters};
use crate::domain::types::{CalculationType, LoadModelsRule};
use crate::repository::error::{parse_uuid, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const ENTITY: &str = "MarginCalculationParameters";

// ==========================================
// ParametersRepository - 参数集仓储
// ==========================================
pub struct ParametersRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ParametersRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新建参数集
    ///
    /// 忽略载荷中的全部 id：参数集与每个负荷变化都分配新 id（按列表顺序）
    pub fn insert(&self, parameters: &MarginCalculationParameters) -> RepositoryResult<Uuid> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let id = Uuid::new_v4();
        tx.execute(
            r#"INSERT INTO margin_calc_parameters (
                id, provider, start_time, stop_time, margin_calculation_start_time,
                load_increase_start_time, load_increase_stop_time,
                calculation_type, accuracy, load_models_rule
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                id.to_string(),
                &parameters.provider,
                parameters.start_time,
                parameters.stop_time,
                parameters.margin_calculation_start_time,
                parameters.load_increase_start_time,
                parameters.load_increase_stop_time,
                parameters.calculation_type.to_db_str(),
                parameters.accuracy,
                parameters.load_models_rule.to_db_str(),
            ],
        )?;

        for (pos, lv) in parameters.loads_variations.iter().enumerate() {
            insert_loads_variation(
                &tx,
                id,
                Uuid::new_v4(),
                pos,
                lv.variation,
                lv.active,
                &lv.load_filter_ids(),
            )?;
        }

        tx.commit()?;
        Ok(id)
    }

    /// 按 id 查询参数集（负荷变化按写入顺序）
    pub fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<MarginCalculationParameters>> {
        let conn = self.get_conn()?;
        load_parameters(&conn, id)
    }

    /// 查询全部参数集
    pub fn find_all(&self) -> RepositoryResult<Vec<MarginCalculationParameters>> {
        let conn = self.get_conn()?;

        let ids: Vec<String> = {
            let mut stmt = conn.prepare("SELECT id FROM margin_calc_parameters ORDER BY rowid")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut all = Vec::with_capacity(ids.len());
        for raw in ids {
            let id = parse_uuid("id", &raw)?;
            if let Some(parameters) = load_parameters(&conn, id)? {
                all.push(parameters);
            }
        }
        Ok(all)
    }

    /// 合并更新
    ///
    /// - 标量字段整体覆盖（id 不变）
    /// - 负荷变化按 id 合并：命中更新、缺 id 新增、未出现删除（删除最后执行）
    pub fn update_with_merge(
        &self,
        id: Uuid,
        incoming: &MarginCalculationParameters,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        if !parameters_exist(&tx, id)? {
            return Err(RepositoryError::not_found(ENTITY, id));
        }
        apply_merge(&tx, id, incoming)?;

        tx.commit()?;
        Ok(())
    }

    /// 重置为默认值，保留当前 provider（未设置时使用 fallback_provider）
    ///
    /// provider 的读取与写回在同一事务内
    pub fn reset_to_defaults(&self, id: Uuid, fallback_provider: &str) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let provider = read_provider(&tx, id)?
            .ok_or_else(|| RepositoryError::not_found(ENTITY, id))?
            .unwrap_or_else(|| fallback_provider.to_string());
        apply_merge(&tx, id, &MarginCalculationParameters::default_values(provider))?;

        tx.commit()?;
        Ok(())
    }

    /// 删除参数集（子表级联删除）；不存在时静默成功
    pub fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM margin_calc_parameters WHERE id = ?",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// 查询 provider；参数集不存在返回 NotFound
    pub fn find_provider(&self, id: Uuid) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        read_provider(&conn, id)?.ok_or_else(|| RepositoryError::not_found(ENTITY, id))
    }

    pub fn update_provider(&self, id: Uuid, provider: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE margin_calc_parameters SET provider = ? WHERE id = ?",
            params![provider, id.to_string()],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found(ENTITY, id));
        }
        Ok(())
    }
}

// ==========================================
// 行读写辅助（Connection 与 Transaction 共用）
// ==========================================

fn parameters_exist(conn: &Connection, id: Uuid) -> RepositoryResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM margin_calc_parameters WHERE id = ?",
            params![id.to_string()],
            |_row| Ok(true),
        )
        .optional()?;
    Ok(found.unwrap_or(false))
}

/// 外层 None 表示参数集不存在
fn read_provider(conn: &Connection, id: Uuid) -> RepositoryResult<Option<Option<String>>> {
    let provider = conn
        .query_row(
            "SELECT provider FROM margin_calc_parameters WHERE id = ?",
            params![id.to_string()],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(provider)
}

/// 覆盖标量字段并按合并计划写入负荷变化（调用方负责事务）
fn apply_merge(
    conn: &Connection,
    id: Uuid,
    incoming: &MarginCalculationParameters,
) -> RepositoryResult<()> {
    let existing_ids = loads_variation_ids(conn, id)?;
    let plan = plan_loads_variation_merge(&existing_ids, &incoming.loads_variations).map_err(
        |e: MergeError| RepositoryError::FieldValueError {
            field: "loadsVariations".to_string(),
            message: e.to_string(),
        },
    )?;

    conn.execute(
        r#"UPDATE margin_calc_parameters SET
            provider = ?, start_time = ?, stop_time = ?,
            margin_calculation_start_time = ?, load_increase_start_time = ?,
            load_increase_stop_time = ?, calculation_type = ?, accuracy = ?,
            load_models_rule = ?
           WHERE id = ?"#,
        params![
            &incoming.provider,
            incoming.start_time,
            incoming.stop_time,
            incoming.margin_calculation_start_time,
            incoming.load_increase_start_time,
            incoming.load_increase_stop_time,
            incoming.calculation_type.to_db_str(),
            incoming.accuracy,
            incoming.load_models_rule.to_db_str(),
            id.to_string(),
        ],
    )?;

    for (pos, child) in plan.children.iter().enumerate() {
        if child.is_new {
            insert_loads_variation(
                conn,
                id,
                child.id,
                pos,
                child.variation,
                child.active,
                &child.load_filter_ids,
            )?;
        } else {
            conn.execute(
                "UPDATE loads_variation SET pos = ?, variation = ?, active = ? WHERE id = ?",
                params![pos as i64, child.variation, child.active, child.id.to_string()],
            )?;
            conn.execute(
                "DELETE FROM loads_variation_load_filter WHERE loads_variation_id = ?",
                params![child.id.to_string()],
            )?;
            insert_load_filters(conn, child.id, &child.load_filter_ids)?;
        }
    }

    for removed in &plan.deletions {
        conn.execute(
            "DELETE FROM loads_variation WHERE id = ?",
            params![removed.to_string()],
        )?;
    }
    Ok(())
}

fn loads_variation_ids(conn: &Connection, parameters_id: Uuid) -> RepositoryResult<Vec<Uuid>> {
    let mut stmt =
        conn.prepare("SELECT id FROM loads_variation WHERE parameters_id = ? ORDER BY pos")?;
    let raw = stmt
        .query_map(params![parameters_id.to_string()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    raw.iter().map(|s| parse_uuid("loads_variation.id", s)).collect()
}

fn insert_loads_variation(
    conn: &Connection,
    parameters_id: Uuid,
    id: Uuid,
    pos: usize,
    variation: f64,
    active: bool,
    load_filter_ids: &[Uuid],
) -> RepositoryResult<()> {
    conn.execute(
        r#"INSERT INTO loads_variation (id, parameters_id, pos, variation, active)
           VALUES (?, ?, ?, ?, ?)"#,
        params![
            id.to_string(),
            parameters_id.to_string(),
            pos as i64,
            variation,
            active
        ],
    )?;
    insert_load_filters(conn, id, load_filter_ids)
}

fn insert_load_filters(
    conn: &Connection,
    loads_variation_id: Uuid,
    load_filter_ids: &[Uuid],
) -> RepositoryResult<()> {
    let mut stmt = conn.prepare(
        r#"INSERT INTO loads_variation_load_filter (loads_variation_id, pos, load_filter_id)
           VALUES (?, ?, ?)"#,
    )?;
    for (pos, filter_id) in load_filter_ids.iter().enumerate() {
        stmt.execute(params![
            loads_variation_id.to_string(),
            pos as i64,
            filter_id.to_string()
        ])?;
    }
    Ok(())
}

/// 参数集主表行
struct ParametersRow {
    provider: Option<String>,
    start_time: Option<f64>,
    stop_time: Option<f64>,
    margin_calculation_start_time: Option<f64>,
    load_increase_start_time: Option<f64>,
    load_increase_stop_time: Option<f64>,
    calculation_type: String,
    accuracy: Option<i32>,
    load_models_rule: String,
}

fn load_parameters(
    conn: &Connection,
    id: Uuid,
) -> RepositoryResult<Option<MarginCalculationParameters>> {
    let row = conn
        .query_row(
            r#"SELECT provider, start_time, stop_time, margin_calculation_start_time,
                      load_increase_start_time, load_increase_stop_time,
                      calculation_type, accuracy, load_models_rule
               FROM margin_calc_parameters
               WHERE id = ?"#,
            params![id.to_string()],
            |row| {
                Ok(ParametersRow {
                    provider: row.get(0)?,
                    start_time: row.get(1)?,
                    stop_time: row.get(2)?,
                    margin_calculation_start_time: row.get(3)?,
                    load_increase_start_time: row.get(4)?,
                    load_increase_stop_time: row.get(5)?,
                    calculation_type: row.get(6)?,
                    accuracy: row.get(7)?,
                    load_models_rule: row.get(8)?,
                })
            },
        )
        .optional()?;

    let Some(row) = row else {
        return Ok(None);
    };

    let calculation_type = CalculationType::from_db_str(&row.calculation_type).ok_or_else(|| {
        RepositoryError::FieldValueError {
            field: "calculation_type".to_string(),
            message: row.calculation_type.clone(),
        }
    })?;
    let load_models_rule = LoadModelsRule::from_db_str(&row.load_models_rule).ok_or_else(|| {
        RepositoryError::FieldValueError {
            field: "load_models_rule".to_string(),
            message: row.load_models_rule.clone(),
        }
    })?;

    Ok(Some(MarginCalculationParameters {
        id: Some(id),
        provider: row.provider,
        start_time: row.start_time,
        stop_time: row.stop_time,
        margin_calculation_start_time: row.margin_calculation_start_time,
        load_increase_start_time: row.load_increase_start_time,
        load_increase_stop_time: row.load_increase_stop_time,
        calculation_type,
        accuracy: row.accuracy,
        load_models_rule,
        loads_variations: load_loads_variations(conn, id)?,
    }))
}

fn load_loads_variations(
    conn: &Connection,
    parameters_id: Uuid,
) -> RepositoryResult<Vec<LoadsVariation>> {
    let rows: Vec<(String, f64, bool)> = {
        let mut stmt = conn.prepare(
            r#"SELECT id, variation, active FROM loads_variation
               WHERE parameters_id = ?
               ORDER BY pos"#,
        )?;
        let rows = stmt
            .query_map(params![parameters_id.to_string()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut filter_stmt = conn.prepare(
        r#"SELECT load_filter_id FROM loads_variation_load_filter
           WHERE loads_variation_id = ?
           ORDER BY pos"#,
    )?;

    let mut variations = Vec::with_capacity(rows.len());
    for (raw_id, variation, active) in rows {
        let filter_ids = filter_stmt
            .query_map(params![&raw_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let load_filters = filter_ids
            .iter()
            .map(|raw| parse_uuid("load_filter_id", raw).map(FilterRef::new))
            .collect::<RepositoryResult<Vec<_>>>()?;

        variations.push(LoadsVariation {
            id: Some(parse_uuid("loads_variation.id", &raw_id)?),
            load_filters,
            variation,
            active,
        });
    }
    Ok(variations)
}
