pub mod migrations;
pub mod repository;

use std::path::Path;

use rusqlite::Connection;

use crate::error::AppError;

/// Opens (creating if needed) the database at `path` and brings its schema up
/// to date.
pub fn open_database(path: &Path) -> Result<Connection, AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AppError::from_io(e, parent))?;
    }
    let conn = Connection::open(path)?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}
