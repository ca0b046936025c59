//! HTTP/1.1 serialisation of a committed response.

use std::fmt::Write as _;
use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::http::{BoxFuture, CommittedHead, ResponseSink};

/// A [`ResponseSink`] writing HTTP/1.1 onto any async byte stream.
///
/// Every response carries `Connection: close`; without `Content-Length` or
/// chunked framing the body is delimited by the connection closing, which
/// [`finish`](ResponseSink::finish) does through `shutdown`.
pub struct WireSink<W> {
    writer: BufWriter<W>,
    chunked: bool,
}

impl<W: AsyncWrite + Unpin + Send> WireSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            chunked: false,
        }
    }
}

/// Renders the status line and header block, including the blank line.
fn render_head(head: &CommittedHead) -> String {
    let code = head.status().map_or(200, |status| status.as_u16());
    let mut out = format!("HTTP/1.1 {code} {}\r\n", head.reason());

    let cookies = head.cookies().iter().map(|cookie| ("Set-Cookie", cookie.to_string()));
    let headers = head.headers().iter().map(|(name, value)| (name, value.to_owned()));
    for (name, value) in headers.chain(cookies) {
        // A line break would let a value inject headers of its own.
        if name.contains(['\r', '\n']) || value.contains(['\r', '\n']) {
            warn!(header = name, "dropping header containing a line break");
            continue;
        }
        // Chunked framing and Content-Length are mutually exclusive.
        if head.is_chunked() && name.eq_ignore_ascii_case("content-length") {
            debug!("dropping Content-Length from a chunked response");
            continue;
        }
        let _ = write!(out, "{name}: {value}\r\n");
    }

    out.push_str("Connection: close\r\n");
    if head.is_chunked() {
        out.push_str("Transfer-Encoding: chunked\r\n");
    }
    out.push_str("\r\n");
    out
}

impl<W: AsyncWrite + Unpin + Send> ResponseSink for WireSink<W> {
    fn send_head<'a>(&'a mut self, head: &'a CommittedHead) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            self.chunked = head.is_chunked();
            self.writer.write_all(render_head(head).as_bytes()).await
        })
    }

    fn send_body<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            if self.chunked {
                self.writer
                    .write_all(format!("{:x}\r\n", data.len()).as_bytes())
                    .await?;
                self.writer.write_all(data).await?;
                self.writer.write_all(b"\r\n").await
            } else {
                self.writer.write_all(data).await
            }
        })
    }

    fn finish(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            if self.chunked {
                self.writer.write_all(b"0\r\n\r\n").await?;
            }
            self.writer.shutdown().await
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::http::{Cookie, Response, StatusCode};

    async fn wire(build: impl FnOnce(&mut Response)) -> String {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let mut response = Response::new(WireSink::new(client));
        build(&mut response);
        response.write_body_text("hello").await.unwrap();
        response.write_body_text(" world").await.unwrap();
        response.close().await.unwrap();

        let mut out = String::new();
        server.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn writes_a_close_delimited_response() {
        let out = wire(|res| {
            res.set_status(StatusCode::Created).set_content_type("text/plain");
        })
        .await;
        assert_eq!(
            out,
            "HTTP/1.1 201 Created\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\nhello world"
        );
    }

    #[tokio::test]
    async fn default_status_is_200() {
        let out = wire(|_| {}).await;
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Content-Type: text/plain\r\n"));
    }

    #[tokio::test]
    async fn chunked_bodies_are_framed() {
        let out = wire(|res| {
            res.set_chunked(true);
        })
        .await;
        assert!(out.contains("Transfer-Encoding: chunked\r\n\r\n"));
        assert!(out.ends_with("\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn chunked_responses_never_carry_content_length() {
        let out = wire(|res| {
            res.set_chunked(true).set_header("Content-Length", "11");
        })
        .await;
        let head = out.split("\r\n\r\n").next().unwrap_or_default();
        assert!(!head.to_ascii_lowercase().contains("content-length"), "{out}");
        assert!(head.contains("Transfer-Encoding: chunked"));
    }

    #[tokio::test]
    async fn content_length_survives_without_chunking() {
        let out = wire(|res| {
            res.set_header("Content-Length", "11");
        })
        .await;
        assert!(out.contains("Content-Length: 11\r\n"));
        assert!(out.ends_with("\r\n\r\nhello world"));
    }

    #[tokio::test]
    async fn unregistered_status_codes_reach_the_wire() {
        let out = wire(|res| {
            res.set_status(StatusCode::from_u16(418).unwrap())
                .set_status_message("I'm a teapot");
        })
        .await;
        assert!(out.starts_with("HTTP/1.1 418 I'm a teapot\r\n"), "{out}");

        let out = wire(|res| {
            res.set_status(StatusCode::Custom(299));
        })
        .await;
        assert!(out.starts_with("HTTP/1.1 299 Success\r\n"), "{out}");

        let out = wire(|res| {
            res.set_status(StatusCode::TooManyRequests);
        })
        .await;
        assert!(out.starts_with("HTTP/1.1 429 Too Many Requests\r\n"), "{out}");
    }

    #[tokio::test]
    async fn cookies_become_set_cookie_lines() {
        let out = wire(|res| {
            res.set_cookie(Cookie::new("session", "abc").path("/"))
                .set_cookie(Cookie::new("theme", "dark"));
        })
        .await;
        assert!(out.contains("Set-Cookie: session=abc; Path=/\r\n"));
        assert!(out.contains("Set-Cookie: theme=dark\r\n"));
    }

    #[tokio::test]
    async fn header_values_cannot_inject_lines() {
        let out = wire(|res| {
            res.set_header("X-Ok", "fine").set_header("X-Bad", "a\r\nInjected: yes");
        })
        .await;
        assert!(out.contains("X-Ok: fine\r\n"));
        assert!(!out.contains("Injected"));
    }
}
