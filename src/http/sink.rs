//! The writable half of a connection, as the host hands it to the dispatcher.
//!
//! A [`Response`](super::Response) never touches a socket. It stages metadata,
//! then drives a [`ResponseSink`] through exactly one `send_head`, any number of
//! `send_body` calls, and at most one `finish`.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use super::response::CommittedHead;

/// Heap-allocated, `Send` future borrowing from its caller for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Host-side response transport.
///
/// Implementations may block on I/O inside the returned futures; the dispatcher
/// never holds a shared lock while awaiting them.
pub trait ResponseSink: Send {
    /// Applies a committed status line, headers, and cookies to the transport.
    fn send_head<'a>(&'a mut self, head: &'a CommittedHead) -> BoxFuture<'a, io::Result<()>>;

    /// Appends body bytes.
    fn send_body<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>>;

    /// Flushes and releases the transport.
    fn finish(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

/// Everything a [`MemorySink`] has been asked to do.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    /// Every head write, in order. A well-behaved response produces at most one.
    pub heads: Vec<CommittedHead>,
    pub body: Vec<u8>,
    /// Number of `finish` calls.
    pub finished: usize,
}

impl Recording {
    /// The single committed head, if exactly one was written.
    pub fn head(&self) -> Option<&CommittedHead> {
        match self.heads.as_slice() {
            [head] => Some(head),
            _ => None,
        }
    }

    /// The committed status code, or 200 when none was staged.
    pub fn status_code(&self) -> Option<u16> {
        self.head()
            .map(|head| head.status().map_or(200, |status| status.as_u16()))
    }

    /// First value of a committed header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head()?.headers().get(name)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// An in-memory [`ResponseSink`] that records every call.
///
/// Clones share the same recording, so a host (or test) can keep one handle while
/// the response owns the other.
///
/// # Examples
///
/// ```
/// use waypoint::http::{MemorySink, Response};
///
/// # async fn example() -> std::io::Result<()> {
/// let sink = MemorySink::new();
/// let mut response = Response::new(sink.clone());
/// response.write_body_text("hello").await?;
/// response.close().await?;
///
/// let recording = sink.recording();
/// assert_eq!(recording.heads.len(), 1);
/// assert_eq!(recording.body_text(), "hello");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    recording: Arc<Mutex<Recording>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn recording(&self) -> Recording {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResponseSink for MemorySink {
    fn send_head<'a>(&'a mut self, head: &'a CommittedHead) -> BoxFuture<'a, io::Result<()>> {
        self.lock().heads.push(head.clone());
        Box::pin(async { Ok(()) })
    }

    fn send_body<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        self.lock().body.extend_from_slice(data);
        Box::pin(async { Ok(()) })
    }

    fn finish(&mut self) -> BoxFuture<'_, io::Result<()>> {
        self.lock().finished += 1;
        Box::pin(async { Ok(()) })
    }
}
