//! Stream framing.
//!
//! [`FrameDecoder`] turns a byte stream into messages. It is fed whatever
//! the transport produced and keeps partial state between calls, so split
//! and pipelined deliveries decode the same way as one message per read.

use crate::error::{IllegalValue, WireError};
use crate::header::{HeaderMap, HeaderValue, CHANNEL_IDENTIFIER, CONTENT_LENGTH};
use crate::message::{Message, MessageKind, RequestId};
use crate::registry::{self, HeaderRegistry};
use crate::status::StatusCode;
use crate::token::{EventName, MethodName, RequestState};
use bytes::BytesMut;
use std::sync::Arc;
use tracing::{debug, trace};

/// Default maximum message size (16 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Maximum start or header line length (64 KiB)
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Output of the decoder
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A well-formed message
    Message(Message),
    /// Correctly framed, but a header value was illegal. `message` carries
    /// the headers that did parse.
    Rejected {
        /// The message minus the offending header
        message: Message,
        /// First illegal value found
        error: IllegalValue,
    },
}

impl Decoded {
    /// The framed message, whether accepted or rejected
    pub fn message(&self) -> &Message {
        match self {
            Decoded::Message(message) | Decoded::Rejected { message, .. } => message,
        }
    }
}

#[derive(Debug)]
struct StartLine {
    version: String,
    length: usize,
    request_id: RequestId,
    kind: MessageKind,
}

#[derive(Debug)]
enum State {
    AwaitingStartLine,
    AwaitingHeaders,
    AwaitingBody { remaining: usize },
    Failed,
}

/// Per-connection decoder state machine
#[derive(Debug)]
pub struct FrameDecoder {
    registry: Arc<HeaderRegistry>,
    max_message_size: usize,
    state: State,
    start: Option<StartLine>,
    headers: HeaderMap,
    rejection: Option<IllegalValue>,
    consumed: usize,
    scanned: usize,
}

impl FrameDecoder {
    /// Create a decoder parsing header values through `registry`
    pub fn new(registry: Arc<HeaderRegistry>) -> Self {
        Self {
            registry,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            state: State::AwaitingStartLine,
            start: None,
            headers: HeaderMap::new(),
            rejection: None,
            consumed: 0,
            scanned: 0,
        }
    }

    /// Set the maximum accepted message size
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Decode one message from `buf`, consuming its bytes.
    ///
    /// `Ok(None)` means more input is needed. Any error is fatal: the
    /// decoder refuses further input afterwards.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Decoded>, WireError> {
        match self.step(buf) {
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
            ok => ok,
        }
    }

    /// Decode every complete message in `buf`, in stream order
    pub fn decode_all(&mut self, buf: &mut BytesMut) -> Result<Vec<Decoded>, WireError> {
        let mut out = Vec::new();
        while let Some(decoded) = self.decode(buf)? {
            out.push(decoded);
        }
        Ok(out)
    }

    /// Whether a message is partially buffered
    pub fn is_mid_message(&self) -> bool {
        !matches!(self.state, State::AwaitingStartLine) || self.scanned > 0
    }

    fn step(&mut self, buf: &mut BytesMut) -> Result<Option<Decoded>, WireError> {
        loop {
            match self.state {
                State::Failed => {
                    return Err(WireError::framing("decoder stopped after a previous error"))
                }
                State::AwaitingStartLine => {
                    let line = match self.take_line(buf)? {
                        Some(line) => line,
                        None => return Ok(None),
                    };
                    let start = parse_start_line(&line, self.max_message_size)?;
                    if self.consumed > start.length {
                        return Err(WireError::framing(format!(
                            "declared length {} shorter than start line",
                            start.length
                        )));
                    }
                    self.start = Some(start);
                    self.state = State::AwaitingHeaders;
                }
                State::AwaitingHeaders => {
                    let line = match self.take_line(buf)? {
                        Some(line) => line,
                        None => return Ok(None),
                    };
                    let declared = self.declared_length()?;
                    if self.consumed > declared {
                        return Err(WireError::framing(format!(
                            "header block exceeds declared length {}",
                            declared
                        )));
                    }
                    if !line.is_empty() {
                        self.parse_header_line(&line)?;
                        continue;
                    }

                    let remaining = declared - self.consumed;
                    let content_length = self.headers.get(CONTENT_LENGTH).and_then(HeaderValue::as_integer);
                    match (remaining, content_length) {
                        (0, None) | (0, Some(0)) => return self.emit(BytesMut::new()).map(Some),
                        (0, Some(n)) => {
                            return Err(WireError::framing(format!(
                                "Content-Length {} but no body left in declared length",
                                n
                            )))
                        }
                        (r, Some(n)) if n == r as u64 => {
                            self.state = State::AwaitingBody { remaining: r };
                        }
                        (r, n) => {
                            return Err(WireError::framing(format!(
                                "{} body bytes remain but Content-Length is {:?}",
                                r, n
                            )))
                        }
                    }
                }
                State::AwaitingBody { remaining } => {
                    if buf.len() < remaining {
                        return Ok(None);
                    }
                    let body = buf.split_to(remaining);
                    self.consumed += remaining;
                    return self.emit(body).map(Some);
                }
            }
        }
    }

    fn declared_length(&self) -> Result<usize, WireError> {
        self.start
            .as_ref()
            .map(|s| s.length)
            .ok_or_else(|| WireError::Internal("header state without a start line".into()))
    }

    /// Split off one CRLF-terminated line, without the terminator
    fn take_line(&mut self, buf: &mut BytesMut) -> Result<Option<String>, WireError> {
        // resume the CRLF scan where the last call stopped
        let from = self.scanned.saturating_sub(1).min(buf.len());
        let found = buf[from..]
            .windows(2)
            .position(|w| w == b"\r\n")
            .map(|p| p + from);

        let end = match found {
            Some(end) => end,
            None => {
                self.scanned = buf.len();
                if buf.len() > MAX_LINE_LENGTH {
                    return Err(WireError::framing(format!(
                        "line longer than {} bytes",
                        MAX_LINE_LENGTH
                    )));
                }
                return Ok(None);
            }
        };
        if end > MAX_LINE_LENGTH {
            return Err(WireError::framing(format!(
                "line longer than {} bytes",
                MAX_LINE_LENGTH
            )));
        }

        let raw = buf.split_to(end + 2);
        self.scanned = 0;
        self.consumed += end + 2;
        String::from_utf8(raw[..end].to_vec())
            .map(Some)
            .map_err(|_| WireError::framing("line is not valid UTF-8"))
    }

    fn parse_header_line(&mut self, line: &str) -> Result<(), WireError> {
        let (name, raw) = line
            .split_once(':')
            .ok_or_else(|| WireError::framing(format!("header line without colon: {:?}", line)))?;
        let name = name.trim();
        let raw = raw.trim();
        if name.is_empty() {
            return Err(WireError::framing("header line with empty name"));
        }

        let is_content_length = name.eq_ignore_ascii_case(CONTENT_LENGTH);
        let value = match self.registry.parse_value(name, raw) {
            Ok(value) => value,
            Err(e) if is_content_length => {
                return Err(WireError::framing(format!("illegal Content-Length: {}", e)))
            }
            Err(e) => {
                debug!(header = name, value = raw, "illegal header value: {}", e.reason);
                self.rejection.get_or_insert(e);
                return Ok(());
            }
        };
        if is_content_length && value.as_integer().is_none() {
            return Err(WireError::framing("Content-Length is not an integer"));
        }

        if self.headers.try_append(name, value).is_err() {
            if is_content_length {
                return Err(WireError::framing("duplicate Content-Length"));
            }
            debug!(header = name, "duplicate header");
            self.rejection
                .get_or_insert_with(|| IllegalValue::new(name, raw, "duplicate header"));
        }
        Ok(())
    }

    fn emit(&mut self, body: BytesMut) -> Result<Decoded, WireError> {
        let StartLine {
            version,
            request_id,
            kind,
            ..
        } = self
            .start
            .take()
            .ok_or_else(|| WireError::Internal("message emitted without a start line".into()))?;
        let headers = std::mem::take(&mut self.headers);
        let rejection = self.rejection.take();
        let consumed = std::mem::replace(&mut self.consumed, 0);
        self.state = State::AwaitingStartLine;
        self.scanned = 0;

        let request_id = match kind {
            MessageKind::Event { .. } if request_id == 0 && !headers.contains(CHANNEL_IDENTIFIER) => None,
            _ => Some(request_id),
        };

        let message = Message {
            version,
            length: consumed,
            request_id,
            kind,
            headers,
            body: body.freeze(),
        };
        trace!(length = consumed, request_id = ?message.request_id, "decoded message");

        Ok(match rejection {
            Some(error) => Decoded::Rejected { message, error },
            None => Decoded::Message(message),
        })
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(registry::global())
    }
}

fn parse_number<T: std::str::FromStr>(what: &str, token: &str) -> Result<T, WireError> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WireError::framing(format!("invalid {}: {:?}", what, token)));
    }
    token
        .parse::<T>()
        .map_err(|_| WireError::framing(format!("invalid {}: {:?}", what, token)))
}

fn parse_start_line(line: &str, max_message_size: usize) -> Result<StartLine, WireError> {
    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
    if tokens.len() != 4 && tokens.len() != 5 {
        return Err(WireError::framing(format!("malformed start line: {:?}", line)));
    }

    let version = tokens[0];
    if !version.starts_with("MRCP/") {
        return Err(WireError::framing(format!("unsupported version {:?}", version)));
    }
    let length: usize = parse_number("message length", tokens[1])?;
    if length > max_message_size {
        return Err(WireError::framing(format!(
            "declared length {} above limit {}",
            length, max_message_size
        )));
    }

    let state = |token: &str| {
        token
            .parse::<RequestState>()
            .map_err(|_| WireError::framing(format!("invalid request state {:?}", token)))
    };

    let (request_id, kind) = if tokens.len() == 4 {
        let method = tokens[2]
            .parse::<MethodName>()
            .map_err(|e| WireError::framing(format!("invalid method: {}", e)))?;
        (parse_number("request id", tokens[3])?, MessageKind::Request { method })
    } else if tokens[2].len() == 3 && tokens[2].bytes().all(|b| b.is_ascii_digit()) {
        let status = tokens[2]
            .parse::<StatusCode>()
            .map_err(|e| WireError::framing(format!("invalid status: {}", e)))?;
        (
            parse_number("request id", tokens[3])?,
            MessageKind::Response { status, state: state(tokens[4])? },
        )
    } else {
        let name = tokens[2]
            .parse::<EventName>()
            .map_err(|e| WireError::framing(format!("invalid event name: {}", e)))?;
        (
            parse_number("request id", tokens[3])?,
            MessageKind::Event { name, state: state(tokens[4])? },
        )
    };

    Ok(StartLine {
        version: version.to_string(),
        length,
        request_id,
        kind,
    })
}
