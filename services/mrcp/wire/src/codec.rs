//! Message encoder.
//!
//! The start line carries the total message length, including the digits of
//! the length field itself, so the encoder serializes everything else first
//! and then settles the length by iterating over its digit count.

use crate::error::WireError;
use crate::frame::DEFAULT_MAX_MESSAGE_SIZE;
use crate::header::{HeaderValue, CONTENT_LENGTH};
use crate::message::{Message, MessageKind};
use crate::registry::{self, HeaderRegistry};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tracing::trace;

/// Serializes messages to wire bytes
#[derive(Debug, Clone)]
pub struct MessageEncoder {
    registry: Arc<HeaderRegistry>,
    max_message_size: usize,
}

impl MessageEncoder {
    /// Create an encoder formatting headers through `registry`
    pub fn new(registry: Arc<HeaderRegistry>) -> Self {
        Self {
            registry,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Set the maximum encoded size
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Encode into `dst`, returning the number of bytes written
    pub fn encode(&self, message: &Message, dst: &mut BytesMut) -> Result<usize, WireError> {
        check_token("version", &message.version)?;

        let mut header_block = String::new();
        for (name, value) in message.headers.iter() {
            let text = self.format_header(name, value)?;
            header_block.push_str(name);
            header_block.push_str(": ");
            header_block.push_str(&text);
            header_block.push_str("\r\n");
        }
        header_block.push_str("\r\n");

        check_content_length(message)?;

        // request-id 0 stands in for "none" on connection-wide events
        let request_id = message.request_id.unwrap_or(0);
        let prefix = format!("{} ", message.version);
        let suffix = match &message.kind {
            MessageKind::Request { method } => {
                check_token("method", method.as_str())?;
                format!(" {} {}\r\n", method, request_id)
            }
            MessageKind::Response { status, state } => {
                format!(" {} {} {}\r\n", status, request_id, state)
            }
            MessageKind::Event { name, state } => {
                check_token("event name", name.as_str())?;
                format!(" {} {} {}\r\n", name, request_id, state)
            }
        };

        let fixed = prefix.len() + suffix.len() + header_block.len() + message.body.len();
        let total = total_length(fixed);
        if total > self.max_message_size {
            return Err(WireError::Size(total));
        }

        dst.reserve(total);
        dst.put_slice(prefix.as_bytes());
        dst.put_slice(total.to_string().as_bytes());
        dst.put_slice(suffix.as_bytes());
        dst.put_slice(header_block.as_bytes());
        dst.put_slice(&message.body);

        trace!(length = total, request_id, "encoded message");
        Ok(total)
    }

    /// Encode into a fresh buffer
    pub fn encode_to_bytes(&self, message: &Message) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::new();
        self.encode(message, &mut buf)?;
        Ok(buf.freeze())
    }

    fn format_header(&self, name: &str, value: &HeaderValue) -> Result<String, WireError> {
        if name.is_empty() || name.contains([':', '\r', '\n']) || name.trim() != name {
            return Err(WireError::Internal(format!("invalid header name {:?}", name)));
        }

        let text = self.registry.format_value(name, value);
        if text.contains(['\r', '\n']) {
            return Err(WireError::Internal(format!(
                "value of {} contains a line break",
                name
            )));
        }

        let reparsed = self.registry.parse_value(name, &text).map_err(|e| {
            WireError::Internal(format!("value of {} does not re-parse: {}", name, e))
        })?;
        if self.registry.format_value(name, &reparsed) != text {
            return Err(WireError::Internal(format!(
                "value of {} does not round-trip: {:?}",
                name, text
            )));
        }
        Ok(text)
    }
}

impl Default for MessageEncoder {
    fn default() -> Self {
        Self::new(registry::global())
    }
}

fn check_token(what: &str, token: &str) -> Result<(), WireError> {
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err(WireError::Internal(format!("{} {:?} is not a single token", what, token)));
    }
    Ok(())
}

fn check_content_length(message: &Message) -> Result<(), WireError> {
    let body_len = message.body.len() as u64;
    match message.headers.get(CONTENT_LENGTH) {
        None if body_len == 0 => Ok(()),
        None => Err(WireError::Internal(format!(
            "body of {} bytes without Content-Length",
            body_len
        ))),
        Some(HeaderValue::Integer(n)) if *n == body_len => Ok(()),
        Some(other) => Err(WireError::Internal(format!(
            "Content-Length {} does not match body of {} bytes",
            other, body_len
        ))),
    }
}

fn digit_count(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Smallest total whose digit count is consistent with itself
fn total_length(fixed: usize) -> usize {
    let mut digits = digit_count(fixed);
    loop {
        let total = fixed + digits;
        let needed = digit_count(total);
        if needed == digits {
            return total;
        }
        digits = needed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderMap;
    use crate::resource::{ChannelIdentifier, ResourceType};
    use crate::status::StatusCode;
    use crate::token::{EventName, MethodName, RequestState};
    use crate::MessageBuilder;

    fn encoder() -> MessageEncoder {
        MessageEncoder::new(Arc::new(HeaderRegistry::standard()))
    }

    fn channel() -> ChannelIdentifier {
        ChannelIdentifier::new("32AECB23433802", ResourceType::SpeechSynth).unwrap()
    }

    #[test]
    fn test_total_length_fixed_point() {
        assert_eq!(total_length(0), 1);
        assert_eq!(total_length(8), 9);
        // 9 + 1 digit = 10, which needs 2 digits
        assert_eq!(total_length(9), 11);
        assert_eq!(total_length(97), 99);
        assert_eq!(total_length(98), 101);
        assert_eq!(total_length(997), 1001);
    }

    #[test]
    fn test_encode_request() {
        let msg = MessageBuilder::request(MethodName::Speak)
            .request_id(543257)
            .channel(channel())
            .header("Voice-gender", "neutral")
            .header("Content-Type", "application/ssml+xml")
            .body("<speak>hi</speak>")
            .build()
            .unwrap();

        let bytes = encoder().encode_to_bytes(&msg).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        let expected_tail = " SPEAK 543257\r\n\
             Channel-Identifier: 32AECB23433802@speechsynth\r\n\
             Voice-gender: neutral\r\n\
             Content-Type: application/ssml+xml\r\n\
             Content-Length: 17\r\n\
             \r\n\
             <speak>hi</speak>";
        assert!(text.ends_with(expected_tail), "{}", text);

        let declared: usize = text.split(' ').nth(1).unwrap().parse().unwrap();
        assert_eq!(declared, bytes.len());
    }

    #[test]
    fn test_encode_response_and_event_start_lines() {
        let response = MessageBuilder::response(StatusCode::Success, RequestState::InProgress)
            .request_id(12)
            .channel(channel())
            .build()
            .unwrap();
        let bytes = encoder().encode_to_bytes(&response).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with(&format!("MRCP/2.0 {} 200 12 IN-PROGRESS\r\n", bytes.len())));

        let event = MessageBuilder::event(EventName::Other("NOTIFY".into()), RequestState::Complete)
            .build()
            .unwrap();
        let bytes = encoder().encode_to_bytes(&event).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert_eq!(text, format!("MRCP/2.0 {} NOTIFY 0 COMPLETE\r\n\r\n", bytes.len()));
    }

    #[test]
    fn test_rejects_line_break_in_value() {
        let msg = MessageBuilder::request(MethodName::Stop)
            .request_id(1)
            .header("X-Bad", "a\r\nInjected: yes")
            .build()
            .unwrap();
        assert!(matches!(encoder().encode_to_bytes(&msg), Err(WireError::Internal(_))));
    }

    #[test]
    fn test_rejects_value_that_does_not_round_trip() {
        let msg = MessageBuilder::request(MethodName::SetParams)
            .request_id(1)
            .header("Kill-On-Barge-In", "maybe")
            .build()
            .unwrap();
        assert!(matches!(encoder().encode_to_bytes(&msg), Err(WireError::Internal(_))));

        let padded = MessageBuilder::request(MethodName::SetParams)
            .request_id(1)
            .header("X-Padded", " value ")
            .build()
            .unwrap();
        assert!(matches!(encoder().encode_to_bytes(&padded), Err(WireError::Internal(_))));
    }

    #[test]
    fn test_rejects_content_length_mismatch() {
        let mut msg = MessageBuilder::request(MethodName::Speak)
            .request_id(1)
            .body("hello")
            .build()
            .unwrap();
        msg.headers.insert(CONTENT_LENGTH, 3u64);
        assert!(matches!(encoder().encode_to_bytes(&msg), Err(WireError::Internal(_))));

        msg.headers = HeaderMap::new();
        assert!(matches!(encoder().encode_to_bytes(&msg), Err(WireError::Internal(_))));
    }

    #[test]
    fn test_size_limit() {
        let msg = MessageBuilder::request(MethodName::Speak)
            .request_id(1)
            .body(vec![b'x'; 256])
            .build()
            .unwrap();
        let small = encoder().with_max_message_size(128);
        assert!(matches!(small.encode_to_bytes(&msg), Err(WireError::Size(_))));
    }
}
