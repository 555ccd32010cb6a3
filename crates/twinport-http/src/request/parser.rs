//! Request head and body reading
//!
//! The head is accumulated from the socket and handed to `httparse` until it
//! is complete. Bytes that arrive after the blank line are returned to the
//! caller untouched; they belong to the body or to the upgraded protocol.

use super::Headers;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

const MAX_HEADERS: usize = 64;
const READ_CHUNK: usize = 4096;

/// Failures while reading a request from the socket
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Request head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },

    #[error("Connection closed before the request was complete")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<httparse::Error> for RequestError {
    fn from(err: httparse::Error) -> Self {
        RequestError::Malformed(err.to_string())
    }
}

/// Request line and headers as they arrived
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub version: u8,
    pub headers: Headers,
}

/// Read one request head, returning it with any bytes read past its end
pub async fn read_request_head<R>(
    reader: &mut R,
    max_header_size: usize,
) -> Result<(RequestHead, Vec<u8>), RequestError>
where
    R: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if let Some((head, consumed)) = try_parse_head(&buf)? {
            let leftover = buf.split_off(consumed);
            return Ok((head, leftover));
        }

        // reads never go past the limit, so the head cannot either
        let budget = max_header_size.saturating_sub(buf.len()).min(READ_CHUNK);
        if budget == 0 {
            return Err(RequestError::HeadTooLarge {
                limit: max_header_size,
            });
        }

        let n = reader.read(&mut chunk[..budget]).await?;
        if n == 0 {
            return Err(RequestError::ConnectionClosed);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn try_parse_head(buf: &[u8]) -> Result<Option<(RequestHead, usize)>, RequestError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    let consumed = match req.parse(buf)? {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Ok(None),
    };

    let method = req
        .method
        .ok_or_else(|| RequestError::Malformed("missing method".to_string()))?;
    let target = req
        .path
        .ok_or_else(|| RequestError::Malformed("missing request target".to_string()))?;

    let headers = req
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();

    Ok(Some((
        RequestHead {
            method: method.to_string(),
            target: target.to_string(),
            version: req.version.unwrap_or(1),
            headers,
        },
        consumed,
    )))
}

/// Read exactly `length` body bytes, starting with what is already buffered
pub async fn read_body<R>(
    reader: &mut R,
    mut leftover: Vec<u8>,
    length: usize,
) -> Result<Vec<u8>, RequestError>
where
    R: AsyncRead + Unpin,
{
    if leftover.len() >= length {
        leftover.truncate(length);
        return Ok(leftover);
    }

    let already = leftover.len();
    leftover.resize(length, 0);
    reader
        .read_exact(&mut leftover[already..])
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => RequestError::ConnectionClosed,
            _ => RequestError::Io(e),
        })?;

    Ok(leftover)
}
