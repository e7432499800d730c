pub mod exclusion;
pub mod file_item;
pub mod history;
pub mod operation;
pub mod plan;
pub mod watched_folder;
