use crate::models::{ScrapeOutcome, Source, UnavailableReason};
use crate::plugins::parsers::selectors::{strings, CandidateParser, SelectorProfile, UnavailableMarker};
use crate::plugins::traits::ListingParser;
use crate::utils::error::AppError;

pub struct EbayParser {
    inner: CandidateParser,
}

pub fn default_profile() -> SelectorProfile {
    SelectorProfile {
        title: strings(&[".x-item-title__mainTitle", "h1.x-item-title", "#itemTitle"]),
        price: strings(&[r#"[data-testid="x-price-primary"]"#, ".x-price-primary", "#prcIsum"]),
        price_whole: Vec::new(),
        price_fraction: Vec::new(),
        image: strings(&[
            ".ux-image-carousel-item.active img",
            ".ux-image-carousel-item img",
            "#icImg",
        ]),
        image_attributes: strings(&["data-zoom-src", "src"]),
        unavailable: vec![
            UnavailableMarker::scoped(
                ".d-statusmessage",
                "bidding has ended",
                UnavailableReason::ListingEnded,
            ),
            UnavailableMarker::anywhere("this listing has ended", UnavailableReason::ListingEnded),
            UnavailableMarker::anywhere(
                "this listing was ended by the seller",
                UnavailableReason::ListingEnded,
            ),
            UnavailableMarker::anywhere("this item is out of stock", UnavailableReason::SoldOut),
        ],
    }
}

impl EbayParser {
    pub fn new() -> Result<Self, AppError> {
        Self::with_profile(&default_profile())
    }

    pub fn with_profile(profile: &SelectorProfile) -> Result<Self, AppError> {
        Ok(Self {
            inner: CandidateParser::new(Source::Ebay, profile)?,
        })
    }
}

impl ListingParser for EbayParser {
    fn name(&self) -> &str {
        "eBay Item Page"
    }

    fn source(&self) -> Source {
        Source::Ebay
    }

    fn parse(&self, document: &str) -> ScrapeOutcome {
        self.inner.parse_document(document)
    }
}
