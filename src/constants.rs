//! Shared formatting constants so strings and units stay in one place.

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const GILT_YIELD_FIELD: &str = "yield";
