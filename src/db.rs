// ==========================================
// 诊所排班系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建表语句集中维护（CREATE TABLE IF NOT EXISTS，幂等）
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
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
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

/// 初始化全部表结构并写入 schema_version
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
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

        CREATE TABLE IF NOT EXISTS staff (
            staff_id TEXT PRIMARY KEY,
            clinic_id TEXT NOT NULL,
            name TEXT NOT NULL,
            category_id TEXT NOT NULL,
            weekly_quota INTEGER NOT NULL CHECK(weekly_quota BETWEEN 1 AND 6),
            flex_categories TEXT NOT NULL DEFAULT '',
            employment_type TEXT NOT NULL DEFAULT 'FULL_TIME',
            active INTEGER NOT NULL DEFAULT 1,
            fairness_total_days REAL,
            fairness_night REAL,
            fairness_weekend REAL,
            fairness_holiday REAL,
            fairness_holiday_adjacent REAL,
            fairness_period TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_staff_clinic ON staff(clinic_id);

        CREATE TABLE IF NOT EXISTS doctor_combination (
            rule_id INTEGER PRIMARY KEY AUTOINCREMENT,
            clinic_id TEXT NOT NULL,
            doctor_key TEXT NOT NULL,
            day_of_week INTEGER,
            night_shift INTEGER NOT NULL DEFAULT 0,
            category_id TEXT NOT NULL,
            min_staff INTEGER NOT NULL,
            max_staff INTEGER NOT NULL,
            CHECK(min_staff <= max_staff),
            UNIQUE(clinic_id, doctor_key, day_of_week, night_shift, category_id)
        );

        CREATE TABLE IF NOT EXISTS doctor_schedule (
            clinic_id TEXT NOT NULL,
            work_date TEXT NOT NULL,
            doctor_id TEXT NOT NULL,
            night_shift INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (clinic_id, work_date, doctor_id)
        );

        CREATE TABLE IF NOT EXISTS holiday (
            clinic_id TEXT NOT NULL DEFAULT '*',
            holiday_date TEXT NOT NULL,
            name TEXT NOT NULL,
            closed INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (clinic_id, holiday_date)
        );

        CREATE TABLE IF NOT EXISTS leave_request (
            request_id TEXT PRIMARY KEY,
            clinic_id TEXT NOT NULL,
            staff_id TEXT NOT NULL,
            leave_date TEXT NOT NULL,
            leave_type TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('PENDING', 'CONFIRMED', 'REJECTED', 'CANCELLED'))
        );
        CREATE INDEX IF NOT EXISTS idx_leave_clinic_date ON leave_request(clinic_id, leave_date);

        CREATE TABLE IF NOT EXISTS shift_assignment (
            clinic_id TEXT NOT NULL,
            staff_id TEXT NOT NULL,
            work_date TEXT NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            shift_type TEXT NOT NULL CHECK(shift_type IN ('DAY', 'NIGHT', 'OFF', 'LEAVE')),
            category_id TEXT NOT NULL,
            is_flexible INTEGER NOT NULL DEFAULT 0,
            is_substitute INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (clinic_id, staff_id, work_date)
        );
        CREATE INDEX IF NOT EXISTS idx_assignment_period ON shift_assignment(clinic_id, year, month);
        CREATE INDEX IF NOT EXISTS idx_assignment_date ON shift_assignment(clinic_id, work_date);

        CREATE TABLE IF NOT EXISTS fairness_score (
            clinic_id TEXT NOT NULL,
            staff_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            count_total_days REAL NOT NULL,
            count_night REAL NOT NULL,
            count_weekend REAL NOT NULL,
            count_holiday REAL NOT NULL,
            count_holiday_adjacent REAL NOT NULL,
            dev_total_days REAL NOT NULL,
            dev_night REAL NOT NULL,
            dev_weekend REAL NOT NULL,
            dev_holiday REAL NOT NULL,
            dev_holiday_adjacent REAL NOT NULL,
            overall REAL NOT NULL,
            computed_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (clinic_id, staff_id, year, month)
        );

        CREATE TABLE IF NOT EXISTS week_backup (
            backup_id TEXT PRIMARY KEY,
            clinic_id TEXT NOT NULL,
            week_start TEXT NOT NULL,
            reason TEXT NOT NULL CHECK(reason IN ('MANUAL', 'PRE_REASSIGN', 'PERIODIC')),
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            record_count INTEGER NOT NULL,
            payload_json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_week_backup_week ON week_backup(clinic_id, week_start, created_at DESC);

        CREATE TABLE IF NOT EXISTS schedule_run_lock (
            clinic_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            holder TEXT NOT NULL,
            acquired_at TEXT NOT NULL,
            PRIMARY KEY (clinic_id, year, month)
        );
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
