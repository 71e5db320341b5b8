use thiserror::Error;

use crate::models::UnavailableReason;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Transport error: {0}")]
    Transport(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown source: {name}")]
    UnknownSource { name: String },

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Listing unavailable: {0}")]
    Unavailable(UnavailableReason),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of a single outbound fetch. Always retryable.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid proxy configuration: {0}")]
    Proxy(String),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
