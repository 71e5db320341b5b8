use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::utils::error::AppError;

pub mod listing;
pub mod notification;
pub mod outcome;
pub mod price_history;
pub mod subscription;

// Re-exports for convenience
pub use listing::*;
pub use notification::*;
pub use outcome::*;
pub use price_history::*;
pub use subscription::*;

/// Marketplaces with a registered page parser.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Amazon,
    Ebay,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Amazon, Source::Ebay];
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Amazon => write!(f, "Amazon"),
            Source::Ebay => write!(f, "eBay"),
        }
    }
}

impl FromStr for Source {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amazon" => Ok(Source::Amazon),
            "ebay" => Ok(Source::Ebay),
            _ => Err(AppError::UnknownSource {
                name: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    SoldOut,
    ListingEnded,
}

impl UnavailableReason {
    /// Sentence fragment used in subscriber notifications.
    pub fn describe(&self) -> &'static str {
        match self {
            UnavailableReason::SoldOut => "it has sold out",
            UnavailableReason::ListingEnded => "the listing has ended",
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::SoldOut => write!(f, "sold out"),
            UnavailableReason::ListingEnded => write!(f, "listing ended"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    Transport,
    Parse,
    AntiBot,
    UnknownSource,
}

impl FailureCause {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureCause::UnknownSource)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::Transport => "transport",
            FailureCause::Parse => "parse",
            FailureCause::AntiBot => "anti_bot",
            FailureCause::UnknownSource => "unknown_source",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
