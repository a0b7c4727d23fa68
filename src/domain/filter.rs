//! Name and schema filters
//!
//! A pattern is either an exact value or a regular expression wrapped in
//! forward slashes, e.g. `/^Home/`.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Invalid regex pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled exact-or-regex pattern
#[derive(Debug, Clone)]
pub enum Pattern {
    Exact(String),
    Regex(Regex),
}

impl Pattern {
    /// Parses `/regex/` or an exact value
    pub fn parse(pattern: &str) -> Result<Self, FilterError> {
        if pattern.len() > 1 && pattern.starts_with('/') && pattern.ends_with('/') {
            let inner = &pattern[1..pattern.len() - 1];
            let regex = Regex::new(inner).map_err(|source| FilterError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })?;
            Ok(Pattern::Regex(regex))
        } else {
            Ok(Pattern::Exact(pattern.to_string()))
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Exact(expected) => expected == value,
            Pattern::Regex(regex) => regex.is_match(value),
        }
    }
}

/// Returns true if `value` equals `pattern`, or matches it as `/regex/`
pub fn equals_or_regex(value: &str, pattern: &str) -> Result<bool, FilterError> {
    Ok(Pattern::parse(pattern)?.matches(value))
}

/// A set of patterns where any match counts
#[derive(Debug, Clone, Default)]
pub struct PatternSet(Vec<Pattern>);

impl PatternSet {
    pub fn parse<S: AsRef<str>>(patterns: &[S]) -> Result<Self, FilterError> {
        patterns
            .iter()
            .map(|p| Pattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn any_match(&self, value: &str) -> bool {
        self.0.iter().any(|p| p.matches(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(equals_or_regex("Home", "Home").unwrap());
        assert!(!equals_or_regex("Home page", "Home").unwrap());
    }

    #[test]
    fn regex_match() {
        assert!(equals_or_regex("Home page", "/^Home/").unwrap());
        assert!(!equals_or_regex("About", "/^Home/").unwrap());
    }

    #[test]
    fn lone_slash_is_exact() {
        assert!(equals_or_regex("/", "/").unwrap());
    }

    #[test]
    fn invalid_regex_is_an_error() {
        assert!(matches!(
            equals_or_regex("x", "/(/"),
            Err(FilterError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn pattern_set_any() {
        let set = PatternSet::parse(&["exact", "/banner$/"]).unwrap();
        assert!(set.any_match("exact"));
        assert!(set.any_match("https://example.com/banner"));
        assert!(!set.any_match("card"));
        assert!(PatternSet::default().is_empty());
    }
}
