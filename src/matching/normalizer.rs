//! Keyword expansion into word forms

use rust_stemmers::{Algorithm, Stemmer};
use std::collections::BTreeSet;

/// Shortest stem worth matching on; shorter stems match almost anything
const MIN_STEM_CHARS: usize = 3;

/// Expands a keyword into the set of forms the matcher should look for
///
/// Implementations must be deterministic and must never touch the text being
/// searched; they only broaden the pattern set.
pub trait Normalizer: Send + Sync {
    fn expand(&self, word: &str) -> BTreeSet<String>;
}

/// Russian normalizer: the literal word, its lowercase form and its Snowball stem
///
/// Words that are not Cyrillic, and multi-word phrases, degrade to their
/// lowercase form.
pub struct RussianNormalizer {
    stemmer: Stemmer,
}

impl RussianNormalizer {
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::Russian),
        }
    }
}

impl Default for RussianNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RussianNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RussianNormalizer")
    }
}

impl Normalizer for RussianNormalizer {
    fn expand(&self, word: &str) -> BTreeSet<String> {
        let word = word.trim();
        let lower = word.to_lowercase();
        let mut forms = BTreeSet::new();

        if word.is_empty() {
            return forms;
        }

        if word.contains(char::is_whitespace) || !is_cyrillic_word(word) {
            forms.insert(lower);
            return forms;
        }

        let stemmed = self.stemmer.stem(&lower).to_string();
        forms.insert(word.to_string());
        if stemmed.chars().count() >= MIN_STEM_CHARS {
            forms.insert(stemmed);
        }
        forms.insert(lower);
        forms
    }
}

/// Fallback normalizer returning only the lowercase form
#[derive(Debug, Clone, Copy, Default)]
pub struct LowercaseNormalizer;

impl Normalizer for LowercaseNormalizer {
    fn expand(&self, word: &str) -> BTreeSet<String> {
        let word = word.trim();
        if word.is_empty() {
            BTreeSet::new()
        } else {
            BTreeSet::from([word.to_lowercase()])
        }
    }
}

/// Returns true when the word is written in Cyrillic letters
pub fn is_cyrillic_word(word: &str) -> bool {
    let mut letters = word.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some()
        && letters.all(|c| matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё'))
}
