pub mod config;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod plugins;
pub mod resilience;
pub mod scheduler;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use orchestrator::{BatchOptions, BatchOrchestrator, BatchReport};
pub use resilience::{RetryPolicy, ScrapeEngine, ScrapeReport};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
