use rusqlite::Connection;

use crate::error::AppError;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS organization_history (
    id TEXT PRIMARY KEY NOT NULL,
    timestamp TEXT NOT NULL,
    directory_path TEXT NOT NULL,
    files_organized INTEGER NOT NULL DEFAULT 0,
    folders_created INTEGER NOT NULL DEFAULT 0,
    plan_json TEXT NOT NULL,
    operations_json TEXT NOT NULL,
    success BOOLEAN NOT NULL DEFAULT 1,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_history_time ON organization_history(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_history_dir ON organization_history(directory_path);

CREATE TABLE IF NOT EXISTS watched_folders (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    path TEXT UNIQUE NOT NULL,
    is_enabled BOOLEAN NOT NULL DEFAULT 1,
    auto_organize BOOLEAN NOT NULL DEFAULT 1,
    trigger_delay_ms INTEGER NOT NULL DEFAULT 5000,
    last_triggered TEXT,
    custom_prompt TEXT,
    temperature REAL
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
);
";

/// Columns added to `watched_folders` after the first release.
const WATCHED_FOLDER_COLUMNS: &[(&str, &str)] = &[
    ("custom_prompt", "TEXT"),
    ("temperature", "REAL"),
];

pub fn run_migrations(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch(SCHEMA_V1)?;
    for (column, kind) in WATCHED_FOLDER_COLUMNS {
        add_column_if_missing(conn, "watched_folders", column, kind)?;
    }
    Ok(())
}

fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    kind: &str,
) -> Result<(), AppError> {
    let existing: Vec<String> = conn
        .prepare(&format!("PRAGMA table_info({table})"))?
        .query_map([], |row| row.get(1))?
        .filter_map(|r| r.ok())
        .collect();
    if !existing.iter().any(|name| name == column) {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {kind};"))?;
    }
    Ok(())
}
