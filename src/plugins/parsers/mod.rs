pub mod amazon;
pub mod ebay;
pub mod selectors;

pub use amazon::AmazonParser;
pub use ebay::EbayParser;
pub use selectors::{CandidateParser, SelectorProfile, UnavailableMarker};
