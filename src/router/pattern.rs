//! Method/URL matching for routes.
//!
//! A [`Pattern`] holds an optional method matcher and an optional URL matcher.
//! Each is either a literal (byte-for-byte equality) or a regular expression that
//! must match the *whole* subject. An absent matcher accepts anything.
//!
//! | Pattern                          | Request           | Result               |
//! |----------------------------------|-------------------|----------------------|
//! | `exact(Some("GET"), Some("/a"))` | `GET /a`          | match, no captures   |
//! | `regex(None, Some(r"/u/(\d+)"))` | `PUT /u/42`       | match, `["42"]`      |
//! | `regex(None, Some(r"/u/(\d+)"))` | `GET /u/42/x`     | no match             |
//! | `regex(None, Some("/s(/.*)?"))`  | `GET /s`          | match, `[""]`        |

use std::fmt;
use std::ops::Index;

use regex::Regex;
use thiserror::Error;

use crate::http::{Request, url_decode};

/// A route pattern that failed to compile. This is a configuration error,
/// raised at registration time, never while serving.
#[derive(Debug, Error)]
#[error("invalid {field} pattern `{pattern}`: {source}")]
pub struct PatternError {
    field: &'static str,
    pattern: String,
    #[source]
    source: regex::Error,
}

/// Ordered, URL-decoded values of a matched URL pattern's capturing groups.
///
/// A group that did not participate in the match yields an empty string, so the
/// indices always line up with the groups as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures(Vec<String>);

impl Captures {
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl Index<usize> for Captures {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.0[index]
    }
}

#[derive(Clone)]
enum Matcher {
    Exact(String),
    Regex { source: String, regex: Regex },
}

impl Matcher {
    fn regex(field: &'static str, pattern: &str) -> Result<Self, PatternError> {
        // Anchored at both ends; `.` also matches newlines.
        let regex = Regex::new(&format!(r"(?s)\A(?:{pattern})\z")).map_err(|source| PatternError {
            field,
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(Self::Regex {
            source: pattern.to_owned(),
            regex,
        })
    }

    fn source(&self) -> &str {
        match self {
            Self::Exact(s) | Self::Regex { source: s, .. } => s,
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => write!(f, "Exact({s:?})"),
            Self::Regex { source, .. } => write!(f, "Regex({source:?})"),
        }
    }
}

/// Compiled method + URL pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    method: Option<Matcher>,
    url: Option<Matcher>,
    match_full_url: bool,
}

impl Pattern {
    /// Builds a pattern whose matchers are regular expressions.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if either expression fails to compile.
    pub fn regex(method: Option<&str>, url: Option<&str>) -> Result<Self, PatternError> {
        Ok(Self {
            method: method.map(|m| Matcher::regex("method", m)).transpose()?,
            url: url.map(|u| Matcher::regex("url", u)).transpose()?,
            match_full_url: false,
        })
    }

    /// Builds a pattern whose matchers compare literally.
    pub fn exact(method: Option<&str>, url: Option<&str>) -> Self {
        Self {
            method: method.map(|m| Matcher::Exact(m.to_owned())),
            url: url.map(|u| Matcher::Exact(u.to_owned())),
            match_full_url: false,
        }
    }

    /// Matches the URL against `path?query` instead of the bare path.
    #[must_use]
    pub fn match_full_url(mut self, match_full_url: bool) -> Self {
        self.match_full_url = match_full_url;
        self
    }

    pub fn is_regex(&self) -> bool {
        matches!(self.method, Some(Matcher::Regex { .. }))
            || matches!(self.url, Some(Matcher::Regex { .. }))
    }

    pub fn method_pattern(&self) -> Option<&str> {
        self.method.as_ref().map(Matcher::source)
    }

    pub fn url_pattern(&self) -> Option<&str> {
        self.url.as_ref().map(Matcher::source)
    }

    /// Tests `request` against this pattern.
    ///
    /// Returns the decoded captures on a match. A URL regex without groups (or a
    /// literal / absent URL matcher) yields empty captures, not `None`.
    pub fn matches(&self, request: &Request) -> Option<Captures> {
        if let Some(method) = &self.method {
            let subject = request.method().as_str();
            let hit = match method {
                Matcher::Exact(expected) => expected == subject,
                Matcher::Regex { regex, .. } => regex.is_match(subject),
            };
            if !hit {
                return None;
            }
        }

        let Some(url) = &self.url else {
            return Some(Captures::default());
        };

        let full;
        let subject = match request.query_string() {
            Some(query) if self.match_full_url => {
                full = format!("{}?{query}", request.path());
                full.as_str()
            }
            _ => request.path(),
        };

        match url {
            Matcher::Exact(expected) => (expected == subject).then(Captures::default),
            Matcher::Regex { regex, .. } => {
                let caps = regex.captures(subject)?;
                let values = caps
                    .iter()
                    .skip(1)
                    .map(|group| group.map_or_else(String::new, |m| url_decode(m.as_str())))
                    .collect();
                Some(Captures(values))
            }
        }
    }
}
