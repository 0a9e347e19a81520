//! Keyword search over comment text
//!
//! A keyword is expanded into candidate patterns (the literal word plus, with
//! morphology enabled, its normalized forms). Every pattern is searched
//! independently, overlapping occurrences included, and the results are
//! merged by position. Positions are char offsets into the original text.
//!
//! A stem form only has to start on a word boundary in whole-word mode; the
//! match then runs to the end of the word, so "жалоб" finds "жалобами".
//! Case-sensitive keywords keep every form in the keyword's own case.

use crate::matching::normalizer::{Normalizer, RussianNormalizer};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Characters of context kept on each side of a match
pub const CONTEXT_CHARS: usize = 50;

/// A keyword as seen by the matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRule {
    pub id: i64,
    pub word: String,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub active: bool,
}

impl KeywordRule {
    pub fn new(id: i64, word: &str) -> Self {
        Self {
            id,
            word: word.to_string(),
            case_sensitive: false,
            whole_word: true,
            active: true,
        }
    }
}

/// One occurrence of a keyword in a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    /// Matched slice of the original text
    pub matched_text: String,
    /// Char offset of the match in the original text
    pub position: usize,
    /// Up to [`CONTEXT_CHARS`] chars on each side of the match, clipped to the text
    pub context: String,
}

/// All matches of one keyword in a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordHit {
    pub keyword_id: i64,
    pub matches: Vec<TextMatch>,
}

/// Finds keyword occurrences using an optional morphological [`Normalizer`]
#[derive(Clone)]
pub struct KeywordMatcher {
    normalizer: Arc<dyn Normalizer>,
    morphology: bool,
}

impl std::fmt::Debug for KeywordMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordMatcher")
            .field("morphology", &self.morphology)
            .finish()
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::new(Arc::new(RussianNormalizer::new()), true)
    }
}

impl KeywordMatcher {
    pub fn new(normalizer: Arc<dyn Normalizer>, morphology: bool) -> Self {
        Self {
            normalizer,
            morphology,
        }
    }

    /// Matcher that only searches for the literal keyword
    pub fn literal() -> Self {
        Self::new(Arc::new(RussianNormalizer::new()), false)
    }

    pub fn morphology(&self) -> bool {
        self.morphology
    }

    /// Patterns searched for a keyword, literal word first
    ///
    /// For case-sensitive keywords the expanded forms are rewritten in the
    /// keyword's own case; forms that cannot be are dropped.
    pub fn candidate_patterns(&self, rule: &KeywordRule) -> Vec<String> {
        let word = rule.word.trim();
        if word.is_empty() {
            return Vec::new();
        }

        let mut patterns = vec![word.to_string()];
        if self.morphology {
            for form in self.normalizer.expand(word) {
                let form = if rule.case_sensitive {
                    match in_original_case(word, &form) {
                        Some(form) => form,
                        None => continue,
                    }
                } else {
                    form
                };
                if !patterns.contains(&form) {
                    patterns.push(form);
                }
            }
        }
        patterns
    }

    /// Finds every occurrence of `rule` in `text`, sorted by position
    ///
    /// Inactive or empty keywords and empty texts never match.
    pub fn find_matches(&self, text: &str, rule: &KeywordRule) -> Vec<TextMatch> {
        self.compile_one(rule)
            .map(|compiled| compiled.scan(text))
            .unwrap_or_default()
    }

    /// Compiles a snapshot of keywords for repeated scanning
    pub fn compile(&self, rules: &[KeywordRule]) -> KeywordSet {
        KeywordSet {
            entries: rules.iter().filter_map(|r| self.compile_one(r)).collect(),
        }
    }

    fn compile_one(&self, rule: &KeywordRule) -> Option<CompiledKeyword> {
        if !rule.active {
            return None;
        }

        let word = rule.word.trim().to_lowercase();
        let patterns: Vec<Pattern> = self
            .candidate_patterns(rule)
            .iter()
            .filter_map(|form| {
                let regex = RegexBuilder::new(&regex::escape(form))
                    .case_insensitive(!rule.case_sensitive)
                    .build()
                    .map_err(|e| {
                        tracing::warn!(keyword = %rule.word, error = %e, "Skipping keyword pattern");
                    })
                    .ok()?;
                Some(Pattern {
                    regex,
                    stem: form.to_lowercase() != word,
                })
            })
            .collect();

        if patterns.is_empty() {
            return None;
        }

        Some(CompiledKeyword {
            id: rule.id,
            whole_word: rule.whole_word,
            patterns,
        })
    }
}

/// Compiled keyword snapshot, taken once per crawl run
#[derive(Debug, Clone, Default)]
pub struct KeywordSet {
    entries: Vec<CompiledKeyword>,
}

impl KeywordSet {
    /// Scans a text against every keyword, returning only keywords that matched
    pub fn scan(&self, text: &str) -> Vec<KeywordHit> {
        if text.is_empty() {
            return Vec::new();
        }

        self.entries
            .iter()
            .filter_map(|entry| {
                let matches = entry.scan(text);
                (!matches.is_empty()).then(|| KeywordHit {
                    keyword_id: entry.id,
                    matches,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One searchable form of a keyword
#[derive(Debug, Clone)]
struct Pattern {
    regex: Regex,
    /// Normalized form: in whole-word mode it may be followed by more letters
    stem: bool,
}

#[derive(Debug, Clone)]
struct CompiledKeyword {
    id: i64,
    whole_word: bool,
    patterns: Vec<Pattern>,
}

impl CompiledKeyword {
    fn scan(&self, text: &str) -> Vec<TextMatch> {
        if text.is_empty() {
            return Vec::new();
        }

        let offsets = CharOffsets::new(text);
        let mut by_position: BTreeMap<usize, TextMatch> = BTreeMap::new();

        for pattern in &self.patterns {
            for (start, end) in find_all(pattern, text, self.whole_word) {
                let position = offsets.char_at(start);
                by_position.entry(position).or_insert_with(|| TextMatch {
                    matched_text: text[start..end].to_string(),
                    position,
                    context: offsets.context(position, offsets.char_at(end)),
                });
            }
        }

        by_position.into_values().collect()
    }
}

/// Byte ranges of every occurrence of `pattern`, overlapping ones included
///
/// In whole-word mode a stem occurrence is widened to the end of its word.
fn find_all(pattern: &Pattern, text: &str, whole_word: bool) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut from = 0;

    while from < text.len() {
        let Some(m) = pattern.regex.find_at(text, from) else {
            break;
        };
        if m.start() == m.end() {
            break;
        }
        if !whole_word {
            found.push((m.start(), m.end()));
        } else if pattern.stem {
            if starts_word(text, m.start()) {
                found.push((m.start(), word_end(text, m.end())));
            }
        } else if is_bounded(text, m.start(), m.end()) {
            found.push((m.start(), m.end()));
        }
        // Resume one char past the start so overlapping occurrences are seen
        from = m.start() + text[m.start()..].chars().next().map_or(1, char::len_utf8);
    }

    found
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn starts_word(text: &str, start: usize) -> bool {
    !text[..start].chars().next_back().is_some_and(is_word_char)
}

fn is_bounded(text: &str, start: usize, end: usize) -> bool {
    starts_word(text, start) && !text[end..].chars().next().is_some_and(is_word_char)
}

/// Byte offset where the word running through `end` finishes
fn word_end(text: &str, end: usize) -> usize {
    text[end..]
        .char_indices()
        .find(|&(_, c)| !is_word_char(c))
        .map_or(text.len(), |(i, _)| end + i)
}

/// `form` written with the letter case of `word`, when `form` is a prefix of
/// the lowercased word
fn in_original_case(word: &str, form: &str) -> Option<String> {
    let lower = word.to_lowercase();
    if !lower.starts_with(form) || lower.chars().count() != word.chars().count() {
        return None;
    }
    Some(word.chars().take(form.chars().count()).collect())
}

/// Maps byte offsets to char offsets for one text
struct CharOffsets<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> CharOffsets<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            starts: text.char_indices().map(|(i, _)| i).collect(),
        }
    }

    fn char_at(&self, byte: usize) -> usize {
        match self.starts.binary_search(&byte) {
            Ok(i) | Err(i) => i,
        }
    }

    fn byte_at(&self, char_index: usize) -> usize {
        self.starts.get(char_index).copied().unwrap_or(self.text.len())
    }

    fn context(&self, start: usize, end: usize) -> String {
        let from = start.saturating_sub(CONTEXT_CHARS);
        let to = (end + CONTEXT_CHARS).min(self.starts.len());
        self.text[self.byte_at(from)..self.byte_at(to)].to_string()
    }
}
