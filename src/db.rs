// ==========================================
// 动态裕度计算服务 - SQLite 连接与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键级联删除子表依赖它）
// - 统一 busy_timeout，减少 Worker 并发写入时的偶发 busy 错误
// - 建表幂等，启动时执行
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开内存数据库（测试与临时运行）
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// 建表（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        -- 参数集
        CREATE TABLE IF NOT EXISTS margin_calc_parameters (
            id TEXT PRIMARY KEY,
            provider TEXT,
            start_time REAL,
            stop_time REAL,
            margin_calculation_start_time REAL,
            load_increase_start_time REAL,
            load_increase_stop_time REAL,
            calculation_type TEXT NOT NULL,
            accuracy INTEGER,
            load_models_rule TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS loads_variation (
            id TEXT PRIMARY KEY,
            parameters_id TEXT NOT NULL
                REFERENCES margin_calc_parameters(id) ON DELETE CASCADE,
            pos INTEGER NOT NULL,
            variation REAL NOT NULL,
            active INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_loads_variation_parameters_id
          ON loads_variation(parameters_id, pos);

        CREATE TABLE IF NOT EXISTS loads_variation_load_filter (
            loads_variation_id TEXT NOT NULL
                REFERENCES loads_variation(id) ON DELETE CASCADE,
            pos INTEGER NOT NULL,
            load_filter_id TEXT NOT NULL,
            PRIMARY KEY (loads_variation_id, pos)
        );

        -- 作业状态
        CREATE TABLE IF NOT EXISTS margin_calc_status (
            result_uuid TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            debug_file_location TEXT
        );

        -- 结果树
        CREATE TABLE IF NOT EXISTS margin_calc_result (
            result_uuid TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS load_increase_result (
            id TEXT PRIMARY KEY,
            result_uuid TEXT NOT NULL
                REFERENCES margin_calc_result(result_uuid) ON DELETE CASCADE,
            pos INTEGER NOT NULL,
            load_level REAL NOT NULL,
            status TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_load_increase_result_result_uuid
          ON load_increase_result(result_uuid, pos);

        CREATE TABLE IF NOT EXISTS scenario_result (
            id TEXT PRIMARY KEY,
            load_increase_result_id TEXT NOT NULL
                REFERENCES load_increase_result(id) ON DELETE CASCADE,
            pos INTEGER NOT NULL,
            equipment_id TEXT NOT NULL,
            status TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_scenario_result_load_increase_result_id
          ON scenario_result(load_increase_result_id, pos);

        -- owner_id 指向 load_increase_result 或 scenario_result
        CREATE TABLE IF NOT EXISTS failed_criterion (
            owner_id TEXT NOT NULL,
            owner_kind TEXT NOT NULL,
            pos INTEGER NOT NULL,
            description TEXT NOT NULL,
            time REAL NOT NULL,
            PRIMARY KEY (owner_id, pos)
        );

        -- 运行消息持久队列
        CREATE TABLE IF NOT EXISTS run_queue (
            message_id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            created_at TEXT NOT NULL,
            taken_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_run_queue_status
          ON run_queue(status, created_at);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_version_absent_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
