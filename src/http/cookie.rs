//! Request cookie parsing and response cookie staging.
//!
//! A [`Cookie`] is what a handler stages: a relative lifetime in seconds. When the
//! response commits, each staged cookie becomes a [`SetCookie`] whose expiry is an
//! absolute instant, fixed at commit time.
//!
//! Staged cookies are checked against the RFC 6265 grammar when the response
//! commits. One that fails is dropped rather than written, since a stray `;`
//! in a value would otherwise add attributes of its own.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

/// A staged cookie that cannot be written as a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CookieError {
    #[error("cookie name `{0}` is not a token")]
    Name(String),

    #[error("value of cookie `{0}` contains characters outside cookie-octet")]
    Value(String),

    #[error("path of cookie `{0}` contains `;` or a control character")]
    Path(String),
}

/// A cookie staged on a response that has not committed yet.
///
/// # Examples
///
/// ```
/// use waypoint::http::Cookie;
///
/// let cookie = Cookie::new("session", "abc123").path("/").max_age(3600);
/// assert_eq!(cookie.name(), "session");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    path: Option<String>,
    max_age: Option<i64>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            max_age: None,
        }
    }

    /// Restricts the cookie to a URL path prefix.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Expires the cookie `seconds` after the response commits.
    #[must_use]
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Checks the name, value, and path against RFC 6265 §4.1.1.
    ///
    /// The name must be a token, the value a run of cookie-octets (optionally
    /// wrapped in double quotes), and the path free of `;` and control
    /// characters. Percent-encode arbitrary text before staging it as a value.
    ///
    /// # Errors
    ///
    /// Returns the first [`CookieError`] found.
    ///
    /// # Examples
    ///
    /// ```
    /// use waypoint::http::{Cookie, CookieError};
    ///
    /// assert!(Cookie::new("theme", "dark").validate().is_ok());
    /// assert_eq!(
    ///     Cookie::new("theme", "x; Domain=evil.example").validate(),
    ///     Err(CookieError::Value("theme".to_owned()))
    /// );
    /// ```
    pub fn validate(&self) -> Result<(), CookieError> {
        if self.name.is_empty() || !self.name.bytes().all(is_token_byte) {
            return Err(CookieError::Name(self.name.clone()));
        }
        let quoted = self
            .value
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'));
        if !quoted.unwrap_or(&self.value).bytes().all(is_cookie_octet) {
            return Err(CookieError::Value(self.name.clone()));
        }
        if let Some(path) = &self.path {
            if !path.bytes().all(|b| (0x20..0x7f).contains(&b) && b != b';') {
                return Err(CookieError::Path(self.name.clone()));
            }
        }
        Ok(())
    }

    /// Resolves the relative lifetime against `now`.
    ///
    /// A lifetime that would overflow the calendar is dropped, leaving a session cookie.
    pub(crate) fn resolve(&self, now: DateTime<Utc>) -> SetCookie {
        let expires = self
            .max_age
            .and_then(TimeDelta::try_seconds)
            .and_then(|delta| now.checked_add_signed(delta));
        SetCookie {
            name: self.name.clone(),
            value: self.value.clone(),
            path: self.path.clone(),
            expires,
        }
    }
}

/// A cookie as it goes on the wire, with an absolute expiry.
///
/// `Display` renders the `Set-Cookie` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    name: String,
    value: String,
    path: Option<String>,
    expires: Option<DateTime<Utc>>,
}

impl SetCookie {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(expires) = self.expires {
            // IMF-fixdate (RFC 9110 §5.6.7)
            write!(f, "; Expires={}", expires.format("%a, %d %b %Y %H:%M:%S GMT"))?;
        }
        Ok(())
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}

/// Parses every `Cookie` request header (`a=1; b=2`) into a name → value map.
///
/// Pairs without `=` are skipped. A repeated name keeps its first value.
pub(crate) fn parse_cookie_header<'a>(values: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for header in values {
        for pair in header.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            cookies
                .entry(name.to_owned())
                .or_insert_with(|| value.trim().trim_matches('"').to_owned());
        }
    }
    cookies
}
