use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::file_item::FileItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExclusionRuleType {
    FileExtension,
    FileName,
    FolderName,
    PathContains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub id: Uuid,
    pub rule_type: ExclusionRuleType,
    pub pattern: String,
    pub is_enabled: bool,
    pub description: Option<String>,
}

impl ExclusionRule {
    pub fn new(rule_type: ExclusionRuleType, pattern: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_type,
            pattern: pattern.into(),
            is_enabled: true,
            description: None,
        }
    }

    fn described(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn matches(&self, file: &FileItem) -> bool {
        if !self.is_enabled {
            return false;
        }
        let pattern = self.pattern.to_lowercase();
        match self.rule_type {
            ExclusionRuleType::FileExtension => file.extension.to_lowercase() == pattern,
            ExclusionRuleType::FileName => file.name.to_lowercase().contains(&pattern),
            ExclusionRuleType::FolderName => file
                .path
                .parent()
                .into_iter()
                .flat_map(|p| p.components())
                .any(|c| c.as_os_str().to_string_lossy().to_lowercase().contains(&pattern)),
            ExclusionRuleType::PathContains => file
                .path
                .to_string_lossy()
                .to_lowercase()
                .contains(&pattern),
        }
    }
}

pub fn default_rules() -> Vec<ExclusionRule> {
    vec![
        ExclusionRule::new(ExclusionRuleType::FolderName, ".git").described("Git repositories"),
        ExclusionRule::new(ExclusionRuleType::FolderName, ".svn").described("SVN repositories"),
        ExclusionRule::new(ExclusionRuleType::FolderName, "node_modules")
            .described("Node modules"),
        ExclusionRule::new(ExclusionRuleType::FileExtension, "app")
            .described("Application bundles"),
    ]
}

pub fn should_exclude(rules: &[ExclusionRule], file: &FileItem) -> bool {
    rules.iter().any(|rule| rule.matches(file))
}
