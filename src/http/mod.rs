//! HTTP value types shared by the dispatch engine and its host.
//!
//! Routes see a [`Request`] and a [`Response`]; the host sees the other side of
//! the response through [`ResponseSink`].

use std::fmt;

use thiserror::Error;

pub mod cookie;
pub mod headers;
pub mod request;
pub mod response;
pub mod sink;

pub use cookie::{Cookie, CookieError, SetCookie};
pub use headers::Headers;
pub use request::{Request, RequestBuilder, RequestParts};
pub use response::{BodyStream, CommittedHead, Response, ResponseHead};
pub use sink::{BoxFuture, MemorySink, Recording, ResponseSink};

macro_rules! status_codes {
    ($($name:ident = $code:literal, $reason:literal;)+) => {
        /// An HTTP response status code.
        ///
        /// The registered codes a handler is likely to stage are named variants.
        /// Anything else in `100..=999` is carried by [`StatusCode::Custom`];
        /// build it through [`StatusCode::from_u16`] so a registered code always
        /// comes back as its named variant.
        ///
        /// # Examples
        ///
        /// ```
        /// use waypoint::http::StatusCode;
        ///
        /// let status = StatusCode::PartialContent;
        /// assert_eq!(status.as_u16(), 206);
        /// assert_eq!(status.canonical_reason(), "Partial Content");
        /// assert!(status.is_success());
        ///
        /// assert_eq!(StatusCode::from_u16(429), Ok(StatusCode::TooManyRequests));
        /// assert_eq!(StatusCode::from_u16(418), Ok(StatusCode::Custom(418)));
        /// assert!(StatusCode::from_u16(1000).is_err());
        /// ```
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StatusCode {
            $($name,)+
            /// A code with no named variant.
            Custom(u16),
        }

        impl StatusCode {
            /// Returns the numeric code.
            pub fn as_u16(self) -> u16 {
                match self {
                    $(Self::$name => $code,)+
                    Self::Custom(code) => code,
                }
            }

            /// Returns the reason phrase sent when no custom status message is
            /// staged. Unregistered codes get the name of their class.
            pub fn canonical_reason(self) -> &'static str {
                match self {
                    $(Self::$name => $reason,)+
                    Self::Custom(code) => match code / 100 {
                        1 => "Informational",
                        2 => "Success",
                        3 => "Redirection",
                        4 => "Client Error",
                        5 => "Server Error",
                        _ => "Unknown",
                    },
                }
            }

            /// Converts a numeric code, mapping registered codes onto their
            /// named variants.
            ///
            /// # Errors
            ///
            /// Returns [`InvalidStatusCode`] for codes outside `100..=999`.
            pub fn from_u16(code: u16) -> Result<Self, InvalidStatusCode> {
                match code {
                    $($code => Ok(Self::$name),)+
                    100..=999 => Ok(Self::Custom(code)),
                    _ => Err(InvalidStatusCode(code)),
                }
            }
        }
    };
}

status_codes! {
    Continue = 100, "Continue";
    SwitchingProtocols = 101, "Switching Protocols";

    Ok = 200, "OK";
    Created = 201, "Created";
    Accepted = 202, "Accepted";
    NoContent = 204, "No Content";
    PartialContent = 206, "Partial Content";

    MovedPermanently = 301, "Moved Permanently";
    Found = 302, "Found";
    SeeOther = 303, "See Other";
    NotModified = 304, "Not Modified";
    TemporaryRedirect = 307, "Temporary Redirect";
    PermanentRedirect = 308, "Permanent Redirect";

    BadRequest = 400, "Bad Request";
    Unauthorized = 401, "Unauthorized";
    Forbidden = 403, "Forbidden";
    NotFound = 404, "Not Found";
    MethodNotAllowed = 405, "Method Not Allowed";
    Conflict = 409, "Conflict";
    Gone = 410, "Gone";
    LengthRequired = 411, "Length Required";
    PayloadTooLarge = 413, "Payload Too Large";
    UriTooLong = 414, "URI Too Long";
    UnsupportedMediaType = 415, "Unsupported Media Type";
    RangeNotSatisfiable = 416, "Range Not Satisfiable";
    UnprocessableEntity = 422, "Unprocessable Entity";
    TooManyRequests = 429, "Too Many Requests";

    InternalServerError = 500, "Internal Server Error";
    NotImplemented = 501, "Not Implemented";
    BadGateway = 502, "Bad Gateway";
    ServiceUnavailable = 503, "Service Unavailable";
    GatewayTimeout = 504, "Gateway Timeout";
    HttpVersionNotSupported = 505, "HTTP Version Not Supported";
}

impl StatusCode {
    /// Returns `true` for 2xx codes.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.as_u16())
    }
}

/// A numeric status code outside the three-digit range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status code {0}: must be within 100..=999")]
pub struct InvalidStatusCode(pub u16);

impl TryFrom<u16> for StatusCode {
    type Error = InvalidStatusCode;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::from_u16(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// An HTTP request method.
///
/// Standard methods are unit variants; anything else the host hands over is kept
/// verbatim in [`Method::Custom`] so method patterns can still match it.
///
/// # Examples
///
/// ```
/// use waypoint::http::Method;
///
/// let method: Method = "PROPFIND".parse().unwrap();
/// assert_eq!(method, Method::Custom("PROPFIND".to_owned()));
/// assert_eq!(method.as_str(), "PROPFIND");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Connect,
    Trace,
    /// A non-standard extension method.
    Custom(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Connect => "CONNECT",
            Self::Trace => "TRACE",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            "CONNECT" => Self::Connect,
            "TRACE" => Self::Trace,
            other => Self::Custom(other.to_owned()),
        })
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(method) => method,
            Err(never) => match never {},
        }
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Decodes a URL component the way HTML forms encode it: `+` is a space and `%XX`
/// escapes are bytes. Invalid UTF-8 after decoding is replaced, never rejected.
pub(crate) fn url_decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}
