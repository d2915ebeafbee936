//! Regex-or-literal predicate arguments.
//!
//! Every extended predicate that takes free text follows the same convention:
//! an argument written as `/body/` (optionally `/body/i`) is a compiled
//! regular expression, anything else is a plain string. Compilation happens
//! once, at rule-compile time; a bad regex is a compile error, never a
//! runtime one.

use std::fmt;

use regex::{Regex, RegexBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
}

/// Splits a `/body/` or `/body/i` literal into (body, case_insensitive).
fn regex_literal(raw: &str) -> Option<(&str, bool)> {
    let raw = raw.trim();
    if !raw.starts_with('/') {
        return None;
    }
    if raw.len() > 3 && raw.ends_with("/i") {
        return Some((&raw[1..raw.len() - 2], true));
    }
    if raw.len() > 1 && raw.ends_with('/') {
        return Some((&raw[1..raw.len() - 1], false));
    }
    None
}

/// A content/path/attribute argument: regex if delimited, literal otherwise.
#[derive(Debug, Clone)]
pub enum TextPattern {
    Regex(Regex),
    Literal(String),
}

impl TextPattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        match regex_literal(raw) {
            Some((body, case_insensitive)) => Ok(Self::Regex(
                RegexBuilder::new(body)
                    .case_insensitive(case_insensitive)
                    .build()?,
            )),
            None => Ok(Self::Literal(raw.to_string())),
        }
    }

    /// Substring semantics for literals, search semantics for regexes.
    pub fn is_match(&self, haystack: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(haystack),
            Self::Literal(lit) => haystack.contains(lit.as_str()),
        }
    }

    /// Whole-string semantics for literals (attribute names/values),
    /// search semantics for regexes.
    pub fn matches_exact(&self, s: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(s),
            Self::Literal(lit) => s == lit,
        }
    }
}

impl fmt::Display for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
            Self::Literal(lit) => f.write_str(lit),
        }
    }
}

/// A computed-style value argument: regex if delimited, otherwise a
/// case-insensitive literal where `*` matches any run of characters.
#[derive(Debug, Clone)]
pub enum CssValuePattern {
    Regex(Regex),
    Wildcard { raw: String, regex: Regex },
    Exact(String),
}

impl CssValuePattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if let Some((body, case_insensitive)) = regex_literal(raw) {
            return Ok(Self::Regex(
                RegexBuilder::new(body)
                    .case_insensitive(case_insensitive)
                    .build()?,
            ));
        }
        if raw.contains('*') {
            let body = regex::escape(raw).replace("\\*", ".*");
            let regex = RegexBuilder::new(&format!("^{body}$"))
                .case_insensitive(true)
                .build()?;
            return Ok(Self::Wildcard {
                raw: raw.to_string(),
                regex,
            });
        }
        Ok(Self::Exact(raw.to_string()))
    }

    pub fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(value),
            Self::Wildcard { regex, .. } => regex.is_match(value),
            Self::Exact(expected) => value.eq_ignore_ascii_case(expected),
        }
    }
}

impl fmt::Display for CssValuePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
            Self::Wildcard { raw, .. } => f.write_str(raw),
            Self::Exact(expected) => f.write_str(expected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_is_substring_search() {
        let p = TextPattern::parse("ad").unwrap();
        assert!(p.is_match("advert"));
        assert!(!p.is_match("AD"));
        assert!(!p.matches_exact("advert"));
        assert!(p.matches_exact("ad"));
    }

    #[test]
    fn delimited_argument_compiles_as_regex() {
        let p = TextPattern::parse("/^\\/shop/").unwrap();
        assert!(matches!(p, TextPattern::Regex(_)));
        assert!(p.is_match("/shop/cart"));
        assert!(!p.is_match("/blog/shop"));
    }

    #[test]
    fn regex_flag_i_is_honored() {
        let p = TextPattern::parse("/sponsored/i").unwrap();
        assert!(p.is_match("SPONSORED content"));
    }

    #[test]
    fn undelimited_slashes_stay_literal() {
        let p = TextPattern::parse("a/b").unwrap();
        assert!(matches!(p, TextPattern::Literal(_)));
        assert!(p.is_match("xa/by"));
    }

    #[test]
    fn bad_regex_is_a_compile_error() {
        assert!(TextPattern::parse("/(unclosed/").is_err());
    }

    #[test]
    fn style_value_wildcard_and_case() {
        let p = CssValuePattern::parse("rgb(1, *, 3)").unwrap();
        assert!(p.is_match("RGB(1, 2, 3)"));
        assert!(!p.is_match("rgb(1, 2, 4)"));

        let exact = CssValuePattern::parse("red").unwrap();
        assert!(exact.is_match("RED"));
        assert!(!exact.is_match("dark-red"));

        let re = CssValuePattern::parse("/^rgb/").unwrap();
        assert!(re.is_match("rgb(0,0,0)"));
    }
}
