use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::ProjectDirs;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::repository;
use crate::error::AppError;
use crate::models::exclusion::{default_rules, ExclusionRule};
use crate::models::watched_folder::DEFAULT_TRIGGER_DELAY_MS;
use crate::services::executor::DEFAULT_MAX_PLAN_DEPTH;

pub const DEFAULT_MAX_HISTORY_ENTRIES: usize = 100;

const KEY_TRIGGER_DELAY: &str = "trigger_delay_ms";
const KEY_INCLUDE_HIDDEN: &str = "include_hidden";
const KEY_MAX_PLAN_DEPTH: &str = "max_plan_depth";
const KEY_MAX_HISTORY: &str = "max_history_entries";
const KEY_EXCLUSION_RULES: &str = "exclusion_rules";

/// Platform data directory, falling back to the temp dir when the platform
/// reports no home.
pub fn data_dir() -> PathBuf {
    ProjectDirs::from("", "", "tidydir")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("tidydir"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizerConfig {
    /// Debounce delay for newly watched folders.
    pub trigger_delay_ms: u64,
    pub include_hidden: bool,
    pub max_plan_depth: usize,
    pub max_history_entries: usize,
    pub exclusion_rules: Vec<ExclusionRule>,
    pub trash_dir: PathBuf,
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self::with_data_dir(&data_dir())
    }
}

impl OrganizerConfig {
    pub fn with_data_dir(dir: &Path) -> Self {
        Self {
            trigger_delay_ms: DEFAULT_TRIGGER_DELAY_MS,
            include_hidden: false,
            max_plan_depth: DEFAULT_MAX_PLAN_DEPTH,
            max_history_entries: DEFAULT_MAX_HISTORY_ENTRIES,
            exclusion_rules: default_rules(),
            trash_dir: dir.join("trash"),
            database_path: dir.join("tidydir.db"),
            log_dir: dir.join("logs"),
        }
    }

    /// Overlays stored settings on `self`. Missing keys keep their current
    /// value and unparseable ones are logged and ignored.
    pub fn load(mut self, conn: &Connection) -> Result<Self, AppError> {
        load_parsed(conn, KEY_TRIGGER_DELAY, &mut self.trigger_delay_ms)?;
        load_parsed(conn, KEY_INCLUDE_HIDDEN, &mut self.include_hidden)?;
        load_parsed(conn, KEY_MAX_PLAN_DEPTH, &mut self.max_plan_depth)?;
        load_parsed(conn, KEY_MAX_HISTORY, &mut self.max_history_entries)?;

        if let Some(raw) = repository::get_setting(conn, KEY_EXCLUSION_RULES)? {
            match serde_json::from_str(&raw) {
                Ok(rules) => self.exclusion_rules = rules,
                Err(e) => warn!(key = KEY_EXCLUSION_RULES, error = %e, "ignoring stored setting"),
            }
        }
        Ok(self)
    }

    pub fn save(&self, conn: &Connection) -> Result<(), AppError> {
        repository::set_setting(conn, KEY_TRIGGER_DELAY, &self.trigger_delay_ms.to_string())?;
        repository::set_setting(conn, KEY_INCLUDE_HIDDEN, &self.include_hidden.to_string())?;
        repository::set_setting(conn, KEY_MAX_PLAN_DEPTH, &self.max_plan_depth.to_string())?;
        repository::set_setting(conn, KEY_MAX_HISTORY, &self.max_history_entries.to_string())?;
        repository::set_setting(
            conn,
            KEY_EXCLUSION_RULES,
            &serde_json::to_string(&self.exclusion_rules)?,
        )?;
        Ok(())
    }
}

fn load_parsed<T: FromStr>(conn: &Connection, key: &str, slot: &mut T) -> Result<(), AppError> {
    if let Some(raw) = repository::get_setting(conn, key)? {
        match raw.trim().parse() {
            Ok(value) => *slot = value,
            Err(_) => warn!(key, value = %raw, "ignoring stored setting"),
        }
    }
    Ok(())
}
