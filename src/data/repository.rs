use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::history::{HistoryEntry, HistoryStats};
use crate::models::watched_folder::WatchedFolder;

fn conversion_error<E>(index: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

// Fixed-width so that text ordering matches time ordering.
fn stamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn uuid_at(row: &Row, index: usize) -> Result<Uuid, rusqlite::Error> {
    let raw: String = row.get(index)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(index, e))
}

fn timestamp_at(row: &Row, index: usize) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    let raw: Option<String> = row.get(index)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(index, e))
    })
    .transpose()
}

// --- organization history ---

pub fn insert_history(conn: &Connection, entry: &HistoryEntry) -> Result<(), AppError> {
    let plan_json = serde_json::to_string(&entry.plan)?;
    let operations_json = serde_json::to_string(&entry.operations)?;

    conn.execute(
        "INSERT INTO organization_history (id, timestamp, directory_path, files_organized, folders_created, plan_json, operations_json, success, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.id.to_string(),
            stamp(&entry.timestamp),
            entry.directory_path.to_string_lossy(),
            entry.files_organized as i64,
            entry.folders_created as i64,
            plan_json,
            operations_json,
            entry.success,
            entry.error_message,
        ],
    )?;
    Ok(())
}

/// Keeps only the newest `keep` history entries.
pub fn prune_history(conn: &Connection, keep: usize) -> Result<usize, AppError> {
    let count = conn.execute(
        "DELETE FROM organization_history WHERE id NOT IN (
             SELECT id FROM organization_history ORDER BY timestamp DESC LIMIT ?1
         )",
        params![keep as i64],
    )?;
    Ok(count)
}

fn history_from_row(row: &Row) -> Result<HistoryEntry, rusqlite::Error> {
    let plan_json: String = row.get(5)?;
    let operations_json: String = row.get(6)?;
    let directory: String = row.get(2)?;
    let files_organized: i64 = row.get(3)?;
    let folders_created: i64 = row.get(4)?;

    Ok(HistoryEntry {
        id: uuid_at(row, 0)?,
        timestamp: timestamp_at(row, 1)?.unwrap_or_else(Utc::now),
        directory_path: PathBuf::from(directory),
        files_organized: files_organized.max(0) as usize,
        folders_created: folders_created.max(0) as usize,
        plan: serde_json::from_str(&plan_json).map_err(|e| conversion_error(5, e))?,
        operations: serde_json::from_str(&operations_json)
            .map_err(|e| conversion_error(6, e))?,
        success: row.get(7)?,
        error_message: row.get(8)?,
    })
}

const HISTORY_COLUMNS: &str = "id, timestamp, directory_path, files_organized, folders_created, plan_json, operations_json, success, error_message";

pub fn list_history(conn: &Connection, limit: usize) -> Result<Vec<HistoryEntry>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HISTORY_COLUMNS} FROM organization_history ORDER BY timestamp DESC LIMIT ?1"
    ))?;

    let entries = stmt
        .query_map(params![limit as i64], history_from_row)?
        .filter_map(|r| r.ok())
        .collect();

    Ok(entries)
}

pub fn get_history(conn: &Connection, id: Uuid) -> Result<Option<HistoryEntry>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HISTORY_COLUMNS} FROM organization_history WHERE id = ?1"
    ))?;

    let entry = stmt
        .query_row(params![id.to_string()], history_from_row)
        .optional()?;

    Ok(entry)
}

pub fn delete_history(conn: &Connection, id: Uuid) -> Result<usize, AppError> {
    let count = conn.execute(
        "DELETE FROM organization_history WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(count)
}

pub fn clear_history(conn: &Connection) -> Result<usize, AppError> {
    let count = conn.execute("DELETE FROM organization_history", [])?;
    Ok(count)
}

pub fn history_stats(conn: &Connection) -> Result<HistoryStats, AppError> {
    let (files, folders, total, succeeded): (i64, i64, i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(files_organized), 0), COALESCE(SUM(folders_created), 0),
                COUNT(*), COALESCE(SUM(success), 0)
         FROM organization_history",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;

    let success_rate = if total == 0 {
        0.0
    } else {
        succeeded as f64 / total as f64
    };

    Ok(HistoryStats {
        total_files_organized: files.max(0) as usize,
        total_folders_created: folders.max(0) as usize,
        success_rate,
    })
}

// --- watched folders ---

pub fn upsert_watched_folder(conn: &Connection, folder: &WatchedFolder) -> Result<(), AppError> {
    let path = folder.path.to_string_lossy().to_string();
    conn.execute(
        "INSERT INTO watched_folders (id, name, path, is_enabled, auto_organize, trigger_delay_ms, last_triggered, custom_prompt, temperature)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             path = excluded.path,
             is_enabled = excluded.is_enabled,
             auto_organize = excluded.auto_organize,
             trigger_delay_ms = excluded.trigger_delay_ms,
             last_triggered = excluded.last_triggered,
             custom_prompt = excluded.custom_prompt,
             temperature = excluded.temperature",
        params![
            folder.id.to_string(),
            folder.name,
            path,
            folder.is_enabled,
            folder.auto_organize,
            folder.trigger_delay_ms as i64,
            folder.last_triggered.as_ref().map(stamp),
            folder.custom_prompt,
            folder.temperature,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::PathAlreadyExists(path.clone())
        }
        other => AppError::Database(other),
    })?;
    Ok(())
}

fn watched_folder_from_row(row: &Row) -> Result<WatchedFolder, rusqlite::Error> {
    let path: String = row.get(2)?;
    let delay: i64 = row.get(5)?;
    Ok(WatchedFolder {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        path: PathBuf::from(path),
        is_enabled: row.get(3)?,
        auto_organize: row.get(4)?,
        trigger_delay_ms: delay.max(0) as u64,
        last_triggered: timestamp_at(row, 6)?,
        custom_prompt: row.get(7)?,
        temperature: row.get(8)?,
    })
}

pub fn list_watched_folders(conn: &Connection) -> Result<Vec<WatchedFolder>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, path, is_enabled, auto_organize, trigger_delay_ms, last_triggered, custom_prompt, temperature
         FROM watched_folders ORDER BY name ASC",
    )?;

    let folders = stmt
        .query_map([], watched_folder_from_row)?
        .filter_map(|r| r.ok())
        .collect();

    Ok(folders)
}

pub fn delete_watched_folder(conn: &Connection, id: Uuid) -> Result<usize, AppError> {
    let count = conn.execute(
        "DELETE FROM watched_folders WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(count)
}

pub fn touch_last_triggered(
    conn: &Connection,
    id: Uuid,
    at: DateTime<Utc>,
) -> Result<usize, AppError> {
    let count = conn.execute(
        "UPDATE watched_folders SET last_triggered = ?1 WHERE id = ?2",
        params![stamp(&at), id.to_string()],
    )?;
    Ok(count)
}

// --- settings ---

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>, AppError> {
    let value = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        params![key, value],
    )?;
    Ok(())
}

// Needed for rusqlite optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
