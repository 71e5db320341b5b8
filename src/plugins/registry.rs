use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use super::parsers::{amazon, ebay, AmazonParser, EbayParser, SelectorProfile};
use super::traits::ListingParser;
use crate::models::Source;
use crate::utils::error::AppError;

pub type ListingParserRef = Arc<dyn ListingParser>;

/// Maps each supported marketplace to its page parser.
///
/// Built once at startup and shared read-only between scrapes.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    parsers: HashMap<Source, ListingParserRef>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Register a parser, replacing any existing parser for the same source.
    pub fn register(&mut self, parser: ListingParserRef) {
        tracing::debug!("Registering parser '{}' for {}", parser.name(), parser.source());
        self.parsers.insert(parser.source(), parser);
    }

    /// Registers the built-in parsers. Profiles in `overrides`, keyed by source
    /// name, replace the built-in selector candidates for that source.
    pub fn with_default_parsers(
        overrides: &HashMap<String, SelectorProfile>,
    ) -> Result<Self, AppError> {
        let mut resolved: HashMap<Source, &SelectorProfile> = HashMap::new();
        for (key, profile) in overrides {
            resolved.insert(Source::from_str(key)?, profile);
        }

        let amazon = match resolved.get(&Source::Amazon) {
            Some(profile) => AmazonParser::with_profile(profile)?,
            None => AmazonParser::with_profile(&amazon::default_profile())?,
        };
        let ebay = match resolved.get(&Source::Ebay) {
            Some(profile) => EbayParser::with_profile(profile)?,
            None => EbayParser::with_profile(&ebay::default_profile())?,
        };

        let mut registry = Self::new();
        registry.register(Arc::new(amazon));
        registry.register(Arc::new(ebay));
        Ok(registry)
    }

    /// Look up the parser for a stored source name.
    pub fn resolve(&self, source: &str) -> Result<ListingParserRef, AppError> {
        let key = Source::from_str(source)?;
        self.parsers
            .get(&key)
            .cloned()
            .ok_or_else(|| AppError::UnknownSource {
                name: source.to_string(),
            })
    }

    pub fn has_parser(&self, source: Source) -> bool {
        self.parsers.contains_key(&source)
    }

    /// Registered sources in a stable order.
    pub fn sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self.parsers.keys().copied().collect();
        sources.sort();
        sources
    }
}
