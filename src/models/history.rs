use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::operation::FileOperation;
use crate::models::plan::Plan;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub directory_path: PathBuf,
    pub files_organized: usize,
    pub folders_created: usize,
    pub plan: Plan,
    pub operations: Vec<FileOperation>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl HistoryEntry {
    pub fn succeeded(directory: PathBuf, plan: Plan, operations: Vec<FileOperation>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            directory_path: directory,
            files_organized: plan.total_files(),
            folders_created: plan.total_folders(),
            plan,
            operations,
            success: true,
            error_message: None,
        }
    }

    pub fn failed(directory: PathBuf, plan: Plan, error: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            directory_path: directory,
            files_organized: 0,
            folders_created: 0,
            plan,
            operations: Vec::new(),
            success: false,
            error_message: Some(error),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total_files_organized: usize,
    pub total_folders_created: usize,
    pub success_rate: f64,
}
