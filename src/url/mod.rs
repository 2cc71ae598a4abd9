//! URL handling module for Newsreel
//!
//! This module provides the day key used to scope a session, the URL filters
//! that keep a crawl inside that day, and the pagination link rewrite.

mod day;
mod filter;
mod pagination;

// Re-export main types and functions
pub use day::DayKey;
pub use filter::{is_followable_link, seed_url, UrlFilters};
pub use pagination::{rewrite_more_link, MORE_LINK_SUFFIX_LEN};
