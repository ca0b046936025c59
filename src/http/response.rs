//! Two-phase HTTP response.
//!
//! A [`Response`] starts out *staged*: a plain, freely mutable [`ResponseHead`].
//! The first body write (or an explicit [`commit`](Response::commit) /
//! [`close`](Response::close)) converts that head into an immutable
//! [`CommittedHead`] snapshot and hands it to the [`ResponseSink`] exactly once.
//! From then on every staged setter is a no-op, and [`Response::head_mut`]
//! returns `None`.
//!
//! ```text
//! Staged ──commit/body write──▶ Committed ──close──▶ Closed
//!   │                                                  ▲
//!   └──────────────────────close───────────────────────┘
//! ```

use std::fmt;
use std::io;

use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

use super::cookie::{Cookie, SetCookie};
use super::sink::ResponseSink;
use super::{Headers, StatusCode};
use crate::error::Error;

/// Upper bound on the intermediate buffer [`BodyStream::copy_from`] uses.
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Response metadata that has not been sent yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
    /// `None` leaves the choice to the host (200), or 302 when redirecting.
    pub status: Option<StatusCode>,
    /// Overrides the canonical reason phrase.
    pub status_message: Option<String>,
    pub chunked: bool,
    pub headers: Headers,
    pub cookies: Vec<Cookie>,
    pub content_type: Option<String>,
    pub redirect_location: Option<String>,
    /// Exposes every staged header to cross-origin scripts at commit.
    pub allow_cors: bool,
}

impl ResponseHead {
    /// Stages a cookie, replacing an earlier one with the same name.
    pub fn set_cookie(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|c| c.name() == cookie.name()) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    fn commit(self) -> CommittedHead {
        let mut headers = Headers::with_capacity(self.headers.len() + 4);
        for (name, value) in self.headers.iter() {
            headers.insert(name, value);
        }

        if let Some(content_type) = self.content_type {
            headers.set("Content-Type", content_type);
        }

        let mut status = self.status;
        if let Some(location) = self.redirect_location {
            status.get_or_insert(StatusCode::Found);
            headers.set("Location", location);
        }

        if self.allow_cors {
            let exposed = self.headers.names().join(", ");
            if !exposed.is_empty() {
                headers.insert("Access-Control-Expose-Headers", exposed);
            }
            if !self.headers.contains("access-control-allow-origin") {
                headers.insert("Access-Control-Allow-Origin", "*");
            }
        }

        let now = Utc::now();
        CommittedHead {
            status,
            status_message: self.status_message,
            chunked: self.chunked,
            headers,
            cookies: self
                .cookies
                .iter()
                .filter_map(|cookie| match cookie.validate() {
                    Ok(()) => Some(cookie.resolve(now)),
                    Err(error) => {
                        warn!(%error, "dropping cookie that cannot be written");
                        None
                    }
                })
                .collect(),
        }
    }
}

/// Immutable snapshot of the response metadata, as applied to the sink.
///
/// `headers` already contains `Content-Type`, `Location`, and any CORS headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedHead {
    status: Option<StatusCode>,
    status_message: Option<String>,
    chunked: bool,
    headers: Headers,
    cookies: Vec<SetCookie>,
}

impl CommittedHead {
    /// Returns the committed status, or `None` if the host default (200) applies.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Reason phrase: the staged message, else the canonical one, else `OK`.
    pub fn reason(&self) -> &str {
        match (&self.status_message, self.status) {
            (Some(message), _) => message,
            (None, Some(status)) => status.canonical_reason(),
            (None, None) => StatusCode::Ok.canonical_reason(),
        }
    }

    /// Returns `true` if the body is framed with chunked transfer coding.
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// Returns the final header list, in wire order.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the cookies that passed validation, with absolute expiries.
    pub fn cookies(&self) -> &[SetCookie] {
        &self.cookies
    }
}

enum Phase {
    Staged(ResponseHead),
    Committed(CommittedHead),
    Closed(CommittedHead),
}

/// The outbound half of one exchange.
///
/// # Examples
///
/// ```
/// use waypoint::http::{MemorySink, Response, StatusCode};
///
/// # async fn example() -> std::io::Result<()> {
/// let sink = MemorySink::new();
/// let mut response = Response::new(sink.clone());
/// response
///     .set_status(StatusCode::Created)
///     .set_header("X-Request-Id", "abc-123");
/// response.write_body_text("made it").await?;
///
/// // Committed: staged setters no longer apply.
/// response.set_status(StatusCode::Accepted);
/// response.close().await?;
///
/// assert_eq!(sink.recording().status_code(), Some(201));
/// # Ok(())
/// # }
/// ```
pub struct Response {
    phase: Phase,
    sink: Box<dyn ResponseSink>,
}

impl Response {
    /// Creates a staged response writing to `sink`.
    pub fn new(sink: impl ResponseSink + 'static) -> Self {
        Self {
            phase: Phase::Staged(ResponseHead::default()),
            sink: Box::new(sink),
        }
    }

    /// `false` once [`close`](Self::close) has run.
    pub fn is_open(&self) -> bool {
        !matches!(self.phase, Phase::Closed(_))
    }

    /// `true` once the head has been handed to the sink. Never reverts.
    pub fn is_committed(&self) -> bool {
        !matches!(self.phase, Phase::Staged(_))
    }

    /// The staged head, until commit.
    pub fn head(&self) -> Option<&ResponseHead> {
        match &self.phase {
            Phase::Staged(head) => Some(head),
            Phase::Committed(_) | Phase::Closed(_) => None,
        }
    }

    /// Mutable access to the staged head; `None` once committed.
    pub fn head_mut(&mut self) -> Option<&mut ResponseHead> {
        match &mut self.phase {
            Phase::Staged(head) => Some(head),
            Phase::Committed(_) | Phase::Closed(_) => None,
        }
    }

    /// The snapshot that was sent, once committed.
    pub fn committed(&self) -> Option<&CommittedHead> {
        match &self.phase {
            Phase::Staged(_) => None,
            Phase::Committed(head) | Phase::Closed(head) => Some(head),
        }
    }

    fn stage(&mut self, apply: impl FnOnce(&mut ResponseHead)) -> &mut Self {
        if let Some(head) = self.head_mut() {
            apply(head);
        }
        self
    }

    /// Sets the status code. Codes without a named variant go through
    /// [`StatusCode::from_u16`].
    ///
    /// Like every setter here, this does nothing once the head is committed.
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.stage(|head| head.status = Some(status))
    }

    /// Sets a reason phrase to send instead of the canonical one.
    pub fn set_status_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.stage(|head| head.status_message = Some(message.into()))
    }

    /// Sets whether the body is sent with chunked transfer coding.
    ///
    /// A chunked head never carries `Content-Length` on the wire.
    pub fn set_chunked(&mut self, chunked: bool) -> &mut Self {
        self.stage(|head| head.chunked = chunked)
    }

    /// Stages a header, replacing any staged value of the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.stage(|head| head.headers.set(name, value))
    }

    /// Stages a cookie, replacing a staged cookie with the same name.
    ///
    /// Cookies failing [`Cookie::validate`] are dropped, with a warning, at commit.
    pub fn set_cookie(&mut self, cookie: Cookie) -> &mut Self {
        self.stage(|head| head.set_cookie(cookie))
    }

    /// Sets the `Content-Type`. Body writes only supply a default when none is set.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) -> &mut Self {
        self.stage(|head| head.content_type = Some(content_type.into()))
    }

    /// Stages a `Location`; without an explicit status the commit sends 302.
    pub fn redirect(&mut self, location: impl Into<String>) -> &mut Self {
        self.stage(|head| head.redirect_location = Some(location.into()))
    }

    /// Sets the CORS flag: on commit, every staged header is listed in
    /// `Access-Control-Expose-Headers` and `Access-Control-Allow-Origin: *` is added.
    pub fn set_allow_cors(&mut self, allow: bool) -> &mut Self {
        self.stage(|head| head.allow_cors = allow)
    }

    /// Clears every staged field back to its default. No-op after commit.
    pub fn reset(&mut self) {
        if let Some(head) = self.head_mut() {
            *head = ResponseHead::default();
        }
    }

    /// Sends the staged head to the sink. Only the first call writes anything.
    pub async fn commit(&mut self) -> io::Result<()> {
        let Phase::Staged(head) = &mut self.phase else {
            return Ok(());
        };
        let committed = std::mem::take(head).commit();
        self.phase = Phase::Committed(committed);

        if let Phase::Committed(head) = &self.phase {
            self.sink.send_head(head).await?;
        }
        Ok(())
    }

    /// Commits if needed, then releases the sink. Closing twice does nothing.
    pub async fn close(&mut self) -> io::Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        self.commit().await?;
        let phase = std::mem::replace(&mut self.phase, Phase::Staged(ResponseHead::default()));
        if let Phase::Committed(head) | Phase::Closed(head) = phase {
            self.phase = Phase::Closed(head);
        }
        self.sink.finish().await
    }

    fn default_content_type(&mut self, content_type: &str) {
        if let Some(head) = self.head_mut() {
            head.content_type.get_or_insert_with(|| content_type.to_owned());
        }
    }

    /// Commits on first use and returns the raw body stream.
    pub async fn body_stream(&mut self) -> io::Result<BodyStream<'_>> {
        self.commit().await?;
        if !self.is_open() {
            return Err(closed_error());
        }
        Ok(BodyStream {
            sink: self.sink.as_mut(),
        })
    }

    /// Writes raw bytes; defaults the content type to `application/octet-stream`.
    pub async fn write_body_data(&mut self, data: &[u8]) -> io::Result<()> {
        self.default_content_type("application/octet-stream");
        self.body_stream().await?.write(data).await
    }

    /// Writes UTF-8 text; defaults the content type to `text/plain`.
    pub async fn write_body_text(&mut self, text: &str) -> io::Result<()> {
        self.default_content_type("text/plain");
        self.body_stream().await?.write(text.as_bytes()).await
    }

    /// Serializes `value` as JSON; defaults the content type to `application/json`.
    ///
    /// Serialization happens before anything is committed, so a failure here
    /// leaves the response staged.
    pub async fn write_body_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        let body = serde_json::to_vec(value).map_err(Error::Serialize)?;
        self.default_content_type("application/json");
        self.body_stream().await?.write(&body).await?;
        Ok(())
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Response");
        match &self.phase {
            Phase::Staged(head) => s.field("staged", head),
            Phase::Committed(head) => s.field("committed", head),
            Phase::Closed(head) => s.field("closed", head),
        };
        s.finish_non_exhaustive()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "response already closed")
}

/// Write access to a committed response body.
pub struct BodyStream<'a> {
    sink: &'a mut dyn ResponseSink,
}

impl BodyStream<'_> {
    /// Sends `data` to the sink. Empty writes are skipped.
    pub async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.sink.send_body(data).await
    }

    /// Copies up to `limit` bytes from `reader` through a bounded buffer.
    ///
    /// Returns the number of bytes copied, which is short of `limit` only if
    /// `reader` hit end-of-file first.
    pub async fn copy_from<R>(&mut self, reader: &mut R, limit: u64) -> io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let capacity = usize::try_from(limit).map_or(COPY_BUFFER_SIZE, |l| l.min(COPY_BUFFER_SIZE));
        let mut buf = vec![0_u8; capacity];
        let mut copied = 0_u64;

        while copied < limit {
            let want = usize::try_from(limit - copied).map_or(buf.len(), |r| r.min(buf.len()));
            let read = reader.read(&mut buf[..want]).await?;
            if read == 0 {
                break;
            }
            self.sink.send_body(&buf[..read]).await?;
            copied += read as u64;
        }

        Ok(copied)
    }
}
