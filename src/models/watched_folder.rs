use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TRIGGER_DELAY_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedFolder {
    pub id: Uuid,
    pub name: String,
    pub path: PathBuf,
    pub is_enabled: bool,
    pub auto_organize: bool,
    pub trigger_delay_ms: u64,
    pub last_triggered: Option<DateTime<Utc>>,
    /// Extra instructions handed to the planner for this folder.
    pub custom_prompt: Option<String>,
    pub temperature: Option<f64>,
}

impl WatchedFolder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self {
            id: Uuid::new_v4(),
            name,
            path,
            is_enabled: true,
            auto_organize: true,
            trigger_delay_ms: DEFAULT_TRIGGER_DELAY_MS,
            last_triggered: None,
            custom_prompt: None,
            temperature: None,
        }
    }

    pub fn trigger_delay(&self) -> Duration {
        Duration::from_millis(self.trigger_delay_ms)
    }
}
