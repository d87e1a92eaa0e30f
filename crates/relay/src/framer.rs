//! Request framing over a raw byte stream.
//!
//! The framer is an explicit two-state machine: it first waits for the
//! `\r\n\r\n` header terminator, then (when the client sent a
//! `Content-Length`) waits for exactly that many body bytes. Without a
//! length the request is complete as soon as the headers are, and the body
//! is whatever arrived alongside them.

use std::collections::HashMap;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
pub const READ_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("empty request")]
    Empty,

    #[error("request head is not valid UTF-8")]
    InvalidEncoding,

    #[error("malformed request line {0:?}")]
    MalformedRequestLine(String),

    #[error("request headers exceed {limit} bytes")]
    HeadersTooLarge { limit: usize },

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// One framed request. Header names are stored lower-cased; duplicates keep
/// the last value seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub method: String,
    pub path: String,
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RawRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")
            .and_then(|value| value.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestHead {
    method: String,
    path: String,
    headers: HashMap<String, String>,
}

#[derive(Debug)]
enum FrameState {
    AwaitingHeaders,
    HaveHeaders {
        head: RequestHead,
        body_start: usize,
        content_length: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameProgress {
    NeedMore,
    Complete,
}

#[derive(Debug)]
pub struct RequestFramer {
    buffer: Vec<u8>,
    state: FrameState,
    limits: FrameLimits,
    scan_from: usize,
}

impl RequestFramer {
    pub fn new(limits: FrameLimits) -> Self {
        Self {
            buffer: Vec::new(),
            state: FrameState::AwaitingHeaders,
            limits,
            scan_from: 0,
        }
    }

    /// Append a chunk and report whether a full request is buffered.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<FrameProgress, FramingError> {
        self.buffer.extend_from_slice(chunk);

        if let FrameState::AwaitingHeaders = self.state {
            let Some(offset) = find_terminator(&self.buffer[self.scan_from..]) else {
                if self.buffer.len() > self.limits.max_header_bytes {
                    return Err(FramingError::HeadersTooLarge {
                        limit: self.limits.max_header_bytes,
                    });
                }
                // The terminator may straddle the next chunk boundary.
                self.scan_from = self
                    .buffer
                    .len()
                    .saturating_sub(HEADER_TERMINATOR.len() - 1);
                return Ok(FrameProgress::NeedMore);
            };

            let header_end = self.scan_from + offset;
            if header_end > self.limits.max_header_bytes {
                return Err(FramingError::HeadersTooLarge {
                    limit: self.limits.max_header_bytes,
                });
            }

            let head = parse_head(&self.buffer[..header_end])?;
            let content_length = head
                .headers
                .get("content-length")
                .and_then(|value| value.parse::<usize>().ok());
            self.state = FrameState::HaveHeaders {
                head,
                body_start: header_end + HEADER_TERMINATOR.len(),
                content_length,
            };
        }

        match &self.state {
            FrameState::HaveHeaders {
                body_start,
                content_length: Some(expected),
                ..
            } => {
                if *expected > self.limits.max_body_bytes {
                    return Err(FramingError::BodyTooLarge {
                        limit: self.limits.max_body_bytes,
                    });
                }
                if self.buffer.len() - body_start >= *expected {
                    Ok(FrameProgress::Complete)
                } else {
                    Ok(FrameProgress::NeedMore)
                }
            }
            FrameState::HaveHeaders { body_start, .. } => {
                if self.buffer.len() - body_start > self.limits.max_body_bytes {
                    return Err(FramingError::BodyTooLarge {
                        limit: self.limits.max_body_bytes,
                    });
                }
                Ok(FrameProgress::Complete)
            }
            FrameState::AwaitingHeaders => Ok(FrameProgress::NeedMore),
        }
    }

    /// Produce the request from whatever has been buffered.
    ///
    /// Called once `feed` reports completion, or when the stream ends early;
    /// in the latter case the buffer is framed best-effort.
    pub fn finish(self) -> Result<RawRequest, FramingError> {
        match self.state {
            FrameState::AwaitingHeaders => {
                if self.buffer.iter().all(u8::is_ascii_whitespace) {
                    return Err(FramingError::Empty);
                }
                let head = parse_head(&self.buffer)?;
                Ok(RawRequest {
                    method: head.method,
                    path: head.path,
                    headers: head.headers,
                    body: Vec::new(),
                })
            }
            FrameState::HaveHeaders {
                head,
                body_start,
                content_length,
            } => {
                let mut body = self.buffer;
                body.drain(..body_start);
                if let Some(expected) = content_length {
                    body.truncate(expected);
                }
                Ok(RawRequest {
                    method: head.method,
                    path: head.path,
                    headers: head.headers,
                    body,
                })
            }
        }
    }

    /// Read one request from `reader`.
    ///
    /// End of stream and read errors both end the read loop; whatever was
    /// buffered up to that point is framed best-effort.
    pub async fn read_from<R>(reader: &mut R, limits: FrameLimits) -> Result<RawRequest, FramingError>
    where
        R: AsyncRead + Unpin,
    {
        let mut framer = Self::new(limits);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(read) => {
                    if framer.feed(&chunk[..read])? == FrameProgress::Complete {
                        break;
                    }
                }
                Err(err) => {
                    debug!("read ended with error, framing buffered bytes: {}", err);
                    break;
                }
            }
        }

        framer.finish()
    }
}

fn find_terminator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

fn parse_head(block: &[u8]) -> Result<RequestHead, FramingError> {
    let text = std::str::from_utf8(block).map_err(|_| FramingError::InvalidEncoding)?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().unwrap_or_default();
    let mut tokens = request_line.split(' ').filter(|token| !token.is_empty());
    let (Some(method), Some(path)) = (tokens.next(), tokens.next()) else {
        return Err(FramingError::MalformedRequestLine(request_line.to_string()));
    };

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Ok(RequestHead {
        method: method.to_string(),
        path: path.to_string(),
        headers,
    })
}
