pub mod traits;
pub mod registry;
pub mod parsers;

pub use registry::SourceRegistry;
pub use traits::ListingParser;
