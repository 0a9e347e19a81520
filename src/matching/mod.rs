//! Keyword matching
//!
//! - [`Normalizer`] expands a keyword into its word forms
//! - [`KeywordMatcher`] searches comment text for those forms

mod matcher;
mod normalizer;

pub use matcher::{KeywordHit, KeywordMatcher, KeywordRule, KeywordSet, TextMatch, CONTEXT_CHARS};
pub use normalizer::{is_cyrillic_word, LowercaseNormalizer, Normalizer, RussianNormalizer};
