//! HTTP/1.1 request-head parsing using the [`httparse`] crate.

use thiserror::Error;

use crate::http::{Method, RequestParts};

/// Largest request head (request line plus headers) the server buffers.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Most header lines accepted in one request.
pub const MAX_HEADERS: usize = 64;

/// Errors that can occur while parsing a request head.
#[derive(Debug, Error)]
pub enum HeadError {
    #[error("request head is incomplete, more data needed")]
    Incomplete,

    #[error("malformed request head: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("request head exceeds {MAX_HEAD_SIZE} bytes or {MAX_HEADERS} headers")]
    TooLarge,
}

/// Parses the request line and headers at the start of `buf`.
///
/// On success returns the parts and the length of the head, i.e. the offset at
/// which the body starts. Header values that are not valid UTF-8 are decoded
/// lossily.
///
/// # Errors
///
/// - [`HeadError::Incomplete`]: the head has not fully arrived yet.
/// - [`HeadError::TooLarge`]: the head cannot fit the size or header limits.
/// - [`HeadError::Parse`] / [`HeadError::MissingField`]: malformed input.
pub fn parse_head(buf: &[u8]) -> Result<(RequestParts, usize), HeadError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut raw = httparse::Request::new(&mut headers);

    let status = match raw.parse(buf) {
        Ok(status) => status,
        Err(httparse::Error::TooManyHeaders) => return Err(HeadError::TooLarge),
        Err(error) => return Err(error.into()),
    };
    let head_len = match status {
        httparse::Status::Complete(len) if len > MAX_HEAD_SIZE => return Err(HeadError::TooLarge),
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial if buf.len() > MAX_HEAD_SIZE => return Err(HeadError::TooLarge),
        httparse::Status::Partial => return Err(HeadError::Incomplete),
    };

    let method = Method::from(raw.method.ok_or(HeadError::MissingField { field: "method" })?);
    let target = raw.path.ok_or(HeadError::MissingField { field: "path" })?;

    let mut parts = RequestParts::new(method, target);
    for header in raw.headers.iter() {
        parts
            .headers
            .insert(header.name, String::from_utf8_lossy(header.value));
    }

    Ok((parts, head_len))
}
