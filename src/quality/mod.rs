//! Data-quality pipeline: the Validator and Deduplicator (J).

pub mod dedup;
pub mod validate;

pub use dedup::{DedupRecord, DedupResult, Deduplicator, MatchType, RemovalStrategy};
pub use validate::{
    CrossFieldRule, FieldValue, MarketDataRecord, Severity, ValidationOutcome, ValidationReport,
    ValidationRule, ValidationRuleSet,
};
