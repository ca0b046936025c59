//! Reference host: a Tokio TCP accept loop feeding a [`Router`].
//!
//! Each accepted connection gets its own task. The task buffers the request
//! head, parses it with [`httparse`], hands the parts, a `Content-Length`-bounded
//! body stream, and a [`WireSink`] to [`Router::serve`], then closes. One request
//! per connection.

mod head;
mod wire;

pub use head::{HeadError, MAX_HEAD_SIZE, MAX_HEADERS, parse_head};
pub use wire::WireSink;

use std::future::Future;
use std::io::{self, Cursor};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{Response, StatusCode};
use crate::router::Router;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// A bound listener, ready to serve a [`Router`].
///
/// # Examples
///
/// ```rust,no_run
/// use waypoint::router::{Flow, Router};
/// use waypoint::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::new();
///     router.get("/", |_caps, _req, res| {
///         Box::pin(async move {
///             res.write_body_text("Hello!").await?;
///             Ok(Flow::Stop)
///         })
///     })?;
///
///     Server::bind("127.0.0.1:8080").await?.run(router).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves `router` until the process ends.
    ///
    /// The router becomes read-only here: it is shared by every connection
    /// task behind an [`Arc`].
    ///
    /// # Errors
    ///
    /// Currently never fails; accept errors are logged and the loop continues.
    pub async fn run(self, router: impl Into<Arc<Router>>) -> Result<(), ServerError> {
        self.run_until(router, std::future::pending()).await
    }

    /// Serves `router` until `shutdown` resolves.
    ///
    /// Connections already accepted keep running in their own tasks.
    ///
    /// # Errors
    ///
    /// Currently never fails; accept errors are logged and the loop continues.
    pub async fn run_until<F>(self, router: impl Into<Arc<Router>>, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let router = router.into();
        tokio::pin!(shutdown);
        info!(address = %self.local_addr, "waypoint listening");

        loop {
            let (stream, peer_addr) = tokio::select! {
                () = &mut shutdown => {
                    info!(address = %self.local_addr, "waypoint stopped");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(peer = %peer_addr, "connection accepted");
            let router = Arc::clone(&router);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, router).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection: one request, one response.
async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, router: Arc<Router>) -> io::Result<()> {
    let (mut reader, writer) = stream.into_split();
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    let (mut parts, head_len) = loop {
        if reader.read_buf(&mut buf).await? == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            return Ok(());
        }
        match parse_head(&buf) {
            Ok(parsed) => break parsed,
            Err(HeadError::Incomplete) => continue,
            Err(HeadError::TooLarge) => {
                warn!(peer = %peer_addr, "request head too large, sending 413");
                return reject(writer, StatusCode::PayloadTooLarge).await;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                return reject(writer, StatusCode::BadRequest).await;
            }
        }
    };

    if parts.headers.contains("transfer-encoding") {
        warn!(peer = %peer_addr, "chunked request bodies are not supported, sending 501");
        return reject(writer, StatusCode::NotImplemented).await;
    }
    let content_length = match parts.headers.get("content-length") {
        None => 0,
        Some(value) => match value.trim().parse::<u64>() {
            Ok(length) => length,
            Err(_) => {
                warn!(peer = %peer_addr, "invalid Content-Length, sending 400");
                return reject(writer, StatusCode::BadRequest).await;
            }
        },
    };

    parts.client_addr = Some(peer_addr);
    let buffered = Cursor::new(buf.split_off(head_len));
    let body = buffered.chain(reader).take(content_length);

    router.serve(parts, body, WireSink::new(writer)).await;
    debug!(peer = %peer_addr, "connection closed");
    Ok(())
}

/// Answers a request that never reached the router.
async fn reject(writer: OwnedWriteHalf, status: StatusCode) -> io::Result<()> {
    let mut response = Response::new(WireSink::new(writer));
    response.set_status(status);
    response.write_body_text(status.canonical_reason()).await?;
    response.close().await
}
