pub mod debounce;
pub mod executor;
pub mod file_service;
pub mod organizer;
pub mod reversal;
pub mod revert_guard;
pub mod scanner;
pub mod unique_path;
pub mod validator;
pub mod watcher;
