//! Keyword trigger detection.

/// Checks whether a lowercased message qualifies for an alert.
///
/// The message must be at most `max_length` characters long and contain at
/// least one keyword as a substring. An empty keyword list never matches.
#[must_use]
pub fn matches(text: &str, keywords: &[String], max_length: usize) -> bool {
    within_length(text, max_length) && keywords.iter().any(|k| text.contains(k.as_str()))
}

/// Length check on its own, so callers can reject long messages before
/// lowercasing them.
#[must_use]
pub fn within_length(text: &str, max_length: usize) -> bool {
    text.chars().count() <= max_length
}

/// A keyword list bound to a length cap.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
    max_length: usize,
}

impl KeywordMatcher {
    /// Creates a matcher. Keywords are lowercased here.
    #[must_use]
    pub fn new(keywords: impl IntoIterator<Item = String>, max_length: usize) -> Self {
        Self {
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            max_length,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    #[must_use]
    pub const fn max_length(&self) -> usize {
        self.max_length
    }

    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// See [`matches`]. `text` must already be lowercase.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        matches(text, &self.keywords, self.max_length)
    }
}
