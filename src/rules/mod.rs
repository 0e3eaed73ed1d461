//! Extraction rules: listing parsing and detail extraction
//!
//! Everything in this module is pure: no I/O, no retries, no suspension
//! points. The crawler feeds page content in and gets values out.

mod detail;
mod listing;
mod rule_set;

pub use detail::{
    extract_details, scan_price, DetailRules, ExtractedDetails, FETCH_ERROR_DETAILS,
    NOT_AVAILABLE,
};
pub use listing::{parse_listings, Listing, MIN_TITLE_CHARS};
pub use rule_set::{
    check_selector, ConfiguredFilter, ExtractionRuleSet, FieldMapping, NoFilter, SelectorRule,
    TitleFilter,
};
