pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::AzureAnalyzer;
pub use app::{Mode, Shell};
pub use config::{cli::LocalStorage, AppConfig};
pub use utils::error::{DocIntelError, Result};
