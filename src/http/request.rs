//! The inbound half of one exchange.
//!
//! The host has already parsed the request line and headers into [`RequestParts`];
//! a [`Request`] adds the dispatch-side view on top: decoded query parameters,
//! cookies, a lazily-read body stream, the per-request identifier, and a single
//! custom-data slot handlers use to pass state down the route chain.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::net::SocketAddr;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::cookie::parse_cookie_header;
use super::{Headers, Method, url_decode};
use crate::error::Error;

/// Already-parsed request metadata supplied by the host.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    /// Path component, still percent-encoded.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    pub headers: Headers,
    pub client_addr: Option<SocketAddr>,
}

impl RequestParts {
    /// Creates parts from a request target such as `/search?q=rust`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (target.to_owned(), None),
        };
        Self {
            method,
            path,
            query,
            headers: Headers::new(),
            client_addr: None,
        }
    }
}

type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// A request being dispatched.
///
/// Everything except the body stream and the custom-data slot is fixed at
/// construction.
///
/// # Examples
///
/// ```
/// use waypoint::http::Request;
///
/// let request = Request::builder()
///     .method("GET")
///     .uri("/hello?name=world+wide")
///     .header("Cookie", "theme=dark")
///     .build(1);
///
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_param("name"), Some("world wide"));
/// assert_eq!(request.cookie("theme"), Some("dark"));
/// ```
pub struct Request {
    id: u64,
    method: Method,
    path: String,
    query: Option<String>,
    query_params: HashMap<String, String>,
    headers: Headers,
    cookies: HashMap<String, String>,
    client_addr: Option<SocketAddr>,
    body: BodyReader,
    custom_data: Option<Box<dyn Any + Send + Sync>>,
}

impl Request {
    /// Wraps host-parsed parts and a body stream. `id` comes from the router's
    /// request counter.
    pub fn new(parts: RequestParts, body: impl AsyncRead + Send + Unpin + 'static, id: u64) -> Self {
        let query_params = parts
            .query
            .as_deref()
            .map(parse_query_string)
            .unwrap_or_default();
        let cookies = parse_cookie_header(parts.headers.get_all("cookie"));

        Self {
            id,
            method: parts.method,
            path: parts.path,
            query: parts.query,
            query_params,
            headers: parts.headers,
            cookies,
            client_addr: parts.client_addr,
            body: Box::new(body),
            custom_data: None,
        }
    }

    /// Returns a builder for an in-memory request.
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Process-unique, monotonically increasing identifier, for log correlation.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns every decoded query parameter. A repeated key keeps its last value.
    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Returns a decoded query parameter value by key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(String::as_str)
    }

    /// Like [`query_param`](Self::query_param), but a missing key is a
    /// [`Error::MissingKey`] so handlers can `?` it into a 400.
    pub fn require_query_param(&self, key: &str) -> Result<&str, Error> {
        self.query_param(key)
            .ok_or_else(|| Error::MissingKey(key.to_owned()))
    }

    /// Returns all request headers, in arrival order.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns the cookies sent in `Cookie` headers, keyed by name.
    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// Returns the value of a request cookie.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Returns the `Content-Type` header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// Returns the value of the `Content-Length` header parsed as a `u64`, if present.
    pub fn content_length(&self) -> Option<u64> {
        self.headers.get("content-length")?.trim().parse().ok()
    }

    /// Returns the `User-Agent` header, if present.
    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get("user-agent")
    }

    /// Returns the peer address, when the host knows it.
    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    /// The raw body stream. Nothing is read until a handler reads it.
    pub fn body_stream(&mut self) -> &mut (dyn AsyncRead + Send + Unpin) {
        self.body.as_mut()
    }

    /// Reads the remaining body into memory.
    pub async fn read_body_data(&mut self) -> Result<Vec<u8>, Error> {
        let mut data = Vec::with_capacity(self.body_capacity_hint());
        self.body.read_to_end(&mut data).await?;
        Ok(data)
    }

    /// Reads the remaining body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Invalid UTF-8 is an [`Error::BadRequest`]; a read failure is an [`Error::Io`].
    pub async fn read_body_text(&mut self) -> Result<String, Error> {
        let data = self.read_body_data().await?;
        String::from_utf8(data)
            .map_err(|_| Error::BadRequest("request body is not valid UTF-8".to_owned()))
    }

    /// Reads and deserializes a JSON body. Malformed input is a
    /// [`Error::Json`], which maps to 400.
    pub async fn read_body_json<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let data = self.read_body_data().await?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Stores a value for handlers later in the same chain, replacing any earlier one.
    pub fn set_custom_data<T: Send + Sync + 'static>(&mut self, value: T) {
        self.custom_data = Some(Box::new(value));
    }

    /// Borrows the custom data if it is present and of type `T`.
    pub fn custom_data<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.custom_data.as_ref()?.downcast_ref::<T>()
    }

    /// Removes the custom data if it is of type `T`; a value of another type stays put.
    pub fn take_custom_data<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        if !self.custom_data.as_ref()?.is::<T>() {
            return None;
        }
        let boxed = self.custom_data.take()?;
        boxed.downcast::<T>().ok().map(|value| *value)
    }

    fn body_capacity_hint(&self) -> usize {
        const MAX_HINT: u64 = 1024 * 1024;
        self.content_length()
            .map_or(0, |len| usize::try_from(len.min(MAX_HINT)).unwrap_or(0))
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("client_addr", &self.client_addr)
            .finish_non_exhaustive()
    }
}

/// Builds a [`Request`] with an in-memory body, for in-process hosts and tests.
#[derive(Debug)]
pub struct RequestBuilder {
    parts: RequestParts,
    body: Vec<u8>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            parts: RequestParts::new(Method::Get, "/"),
            body: Vec::new(),
        }
    }
}

impl RequestBuilder {
    /// Sets the method. Defaults to `GET`.
    #[must_use]
    pub fn method(mut self, method: impl Into<Method>) -> Self {
        self.parts.method = method.into();
        self
    }

    /// Sets path and query from a request target such as `/a/b?c=d`.
    #[must_use]
    pub fn uri(mut self, target: &str) -> Self {
        let RequestParts { path, query, .. } = RequestParts::new(Method::Get, target);
        self.parts.path = path;
        self.parts.query = query;
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.headers.insert(name, value);
        self
    }

    /// Sets the peer address reported by [`Request::client_addr`].
    #[must_use]
    pub fn client_addr(mut self, addr: SocketAddr) -> Self {
        self.parts.client_addr = Some(addr);
        self
    }

    /// Sets the body bytes. Defaults to empty.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Splits into host-style parts plus the body, for [`Router::serve`](crate::router::Router::serve).
    pub fn into_parts(self) -> (RequestParts, Cursor<Vec<u8>>) {
        (self.parts, Cursor::new(self.body))
    }

    /// Builds the request with the given id.
    pub fn build(self, id: u64) -> Request {
        let (parts, body) = self.into_parts();
        Request::new(parts, body, id)
    }
}

/// Parses a URL query string (`key=value&key2=value2`) into a `HashMap`.
///
/// Keys and values are form-decoded. Empty segments are skipped; a repeated key
/// keeps its last value.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (url_decode(key), url_decode(value))
        })
        .collect()
}
