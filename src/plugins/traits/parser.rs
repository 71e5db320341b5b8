use crate::models::{ScrapeOutcome, Source};

/// Turns one marketplace's listing markup into a typed outcome.
///
/// Implementations are pure: no I/O, no shared state. Only `Success`,
/// `Unavailable` and `Failure { cause: Parse }` are expected back.
pub trait ListingParser: Send + Sync {
    /// Parser metadata
    fn name(&self) -> &str;
    fn source(&self) -> Source;

    fn parse(&self, document: &str) -> ScrapeOutcome;
}
