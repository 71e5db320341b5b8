use crate::models::{ScrapeOutcome, Source, UnavailableReason};
use crate::plugins::parsers::selectors::{strings, CandidateParser, SelectorProfile, UnavailableMarker};
use crate::plugins::traits::ListingParser;
use crate::utils::error::AppError;

/// Amazon product pages split the price into whole and fraction spans.
pub struct AmazonParser {
    inner: CandidateParser,
}

pub fn default_profile() -> SelectorProfile {
    SelectorProfile {
        title: strings(&["#productTitle", "#title", "h1.product-title"]),
        price: strings(&[
            "#corePrice_feature_div .a-offscreen",
            ".a-price .a-offscreen",
            "#priceblock_ourprice",
            "#priceblock_dealprice",
        ]),
        price_whole: strings(&["#corePrice_feature_div span.a-price-whole", "span.a-price-whole"]),
        price_fraction: strings(&[
            "#corePrice_feature_div span.a-price-fraction",
            "span.a-price-fraction",
        ]),
        image: strings(&["#landingImage", "#imgBlkFront", "img.a-dynamic-image"]),
        image_attributes: strings(&["data-old-hires", "src"]),
        // Only wording Amazon uses for delisted items; temporary stock-outs stay tracked.
        unavailable: vec![UnavailableMarker::scoped(
            "#availability",
            "currently unavailable",
            UnavailableReason::SoldOut,
        )],
    }
}

impl AmazonParser {
    pub fn new() -> Result<Self, AppError> {
        Self::with_profile(&default_profile())
    }

    pub fn with_profile(profile: &SelectorProfile) -> Result<Self, AppError> {
        Ok(Self {
            inner: CandidateParser::new(Source::Amazon, profile)?,
        })
    }
}

impl ListingParser for AmazonParser {
    fn name(&self) -> &str {
        "Amazon Product Page"
    }

    fn source(&self) -> Source {
        Source::Amazon
    }

    fn parse(&self, document: &str) -> ScrapeOutcome {
        self.inner.parse_document(document)
    }
}
