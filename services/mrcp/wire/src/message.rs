//! Message envelope shared by requests, responses and events.

use crate::error::WireError;
use crate::header::{HeaderMap, HeaderValue, CHANNEL_IDENTIFIER, CONTENT_LENGTH};
use crate::resource::ChannelIdentifier;
use crate::status::StatusCode;
use crate::token::{EventName, MethodName, RequestState};
use bytes::Bytes;

/// Protocol version literal
pub const MRCP_VERSION: &str = "MRCP/2.0";

/// Connection-scoped request identifier
pub type RequestId = u64;

/// Start-line specific part of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Client to server
    Request {
        /// Method token
        method: MethodName,
    },
    /// Server answer to a request
    Response {
        /// Status code
        status: StatusCode,
        /// Request state after this response
        state: RequestState,
    },
    /// Asynchronous notification
    Event {
        /// Event token
        name: EventName,
        /// Request state after this event
        state: RequestState,
    },
}

/// A complete MRCPv2 message.
///
/// `length` is the total serialized size; it is filled in by the decoder and
/// the encoder and does not take part in equality.
#[derive(Debug, Clone)]
pub struct Message {
    /// Protocol version, normally [`MRCP_VERSION`]
    pub version: String,
    /// Total serialized byte count
    pub length: usize,
    /// Request id; `None` only for connection-wide events
    pub request_id: Option<RequestId>,
    /// Start-line discriminant
    pub kind: MessageKind,
    /// Headers in wire order
    pub headers: HeaderMap,
    /// Opaque body, sized by `Content-Length`
    pub body: Bytes,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.request_id == other.request_id
            && self.kind == other.kind
            && self.headers == other.headers
            && self.body == other.body
    }
}

impl Message {
    /// Whether this is a request
    pub fn is_request(&self) -> bool {
        matches!(self.kind, MessageKind::Request { .. })
    }

    /// Whether this is a response
    pub fn is_response(&self) -> bool {
        matches!(self.kind, MessageKind::Response { .. })
    }

    /// Whether this is an event
    pub fn is_event(&self) -> bool {
        matches!(self.kind, MessageKind::Event { .. })
    }

    /// Request method
    pub fn method(&self) -> Option<&MethodName> {
        match &self.kind {
            MessageKind::Request { method } => Some(method),
            _ => None,
        }
    }

    /// Response status
    pub fn status(&self) -> Option<StatusCode> {
        match &self.kind {
            MessageKind::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Event name
    pub fn event_name(&self) -> Option<&EventName> {
        match &self.kind {
            MessageKind::Event { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Request state carried by a response or event
    pub fn request_state(&self) -> Option<RequestState> {
        match &self.kind {
            MessageKind::Request { .. } => None,
            MessageKind::Response { state, .. } | MessageKind::Event { state, .. } => Some(*state),
        }
    }

    /// Whether this response or event completes its request
    pub fn is_terminal(&self) -> bool {
        self.request_state().map_or(false, |s| s.is_terminal())
    }

    /// Header lookup
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// Parsed `Channel-Identifier`
    pub fn channel_identifier(&self) -> Option<&ChannelIdentifier> {
        self.headers
            .get(CHANNEL_IDENTIFIER)
            .and_then(HeaderValue::as_channel_identifier)
    }

    /// Declared `Content-Length`
    pub fn content_length(&self) -> Option<u64> {
        self.headers.get(CONTENT_LENGTH).and_then(HeaderValue::as_integer)
    }
}

/// Builder for [`Message`]
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    version: String,
    request_id: Option<RequestId>,
    kind: MessageKind,
    headers: HeaderMap,
    body: Bytes,
}

impl MessageBuilder {
    fn with_kind(kind: MessageKind) -> Self {
        Self {
            version: MRCP_VERSION.to_string(),
            request_id: None,
            kind,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Start a request
    pub fn request(method: MethodName) -> Self {
        Self::with_kind(MessageKind::Request { method })
    }

    /// Start a response
    pub fn response(status: StatusCode, state: RequestState) -> Self {
        Self::with_kind(MessageKind::Response { status, state })
    }

    /// Start an event
    pub fn event(name: EventName, state: RequestState) -> Self {
        Self::with_kind(MessageKind::Event { name, state })
    }

    /// Override the protocol version
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the request id
    pub fn request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Request id set so far
    pub fn get_request_id(&self) -> Option<RequestId> {
        self.request_id
    }

    /// Set `Channel-Identifier`
    pub fn channel(self, id: ChannelIdentifier) -> Self {
        self.header(CHANNEL_IDENTIFIER, id)
    }

    /// Channel set so far
    pub fn get_channel(&self) -> Option<&ChannelIdentifier> {
        self.headers
            .get(CHANNEL_IDENTIFIER)
            .and_then(HeaderValue::as_channel_identifier)
    }

    /// Set (or replace) a header
    pub fn header(mut self, name: &str, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Validate and build.
    ///
    /// Requests and responses need a request id; an event may omit it only
    /// when it carries no `Channel-Identifier`. A non-empty body gets a
    /// `Content-Length` if none was set.
    pub fn build(mut self) -> Result<Message, WireError> {
        match &self.kind {
            MessageKind::Request { .. } | MessageKind::Response { .. } => {
                if self.request_id.is_none() {
                    return Err(WireError::framing("request and response messages need a request id"));
                }
            }
            MessageKind::Event { .. } => {
                if self.request_id.is_none() && self.headers.contains(CHANNEL_IDENTIFIER) {
                    return Err(WireError::framing(
                        "channel-scoped event needs a request id",
                    ));
                }
            }
        }

        if !self.body.is_empty() && !self.headers.contains(CONTENT_LENGTH) {
            self.headers.insert(CONTENT_LENGTH, self.body.len() as u64);
        }

        Ok(Message {
            version: self.version,
            length: 0,
            request_id: self.request_id,
            kind: self.kind,
            headers: self.headers,
            body: self.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;

    fn channel() -> ChannelIdentifier {
        ChannelIdentifier::new("32AECB23433801", ResourceType::SpeechSynth).unwrap()
    }

    #[test]
    fn test_request_needs_id() {
        let err = MessageBuilder::request(MethodName::Speak).build().unwrap_err();
        assert!(matches!(err, WireError::Framing(_)));

        let msg = MessageBuilder::request(MethodName::Speak)
            .request_id(543257)
            .channel(channel())
            .build()
            .unwrap();
        assert!(msg.is_request());
        assert_eq!(msg.method(), Some(&MethodName::Speak));
        assert_eq!(msg.channel_identifier(), Some(&channel()));
        assert_eq!(msg.request_state(), None);
    }

    #[test]
    fn test_response_needs_id() {
        assert!(MessageBuilder::response(StatusCode::Success, RequestState::Complete)
            .build()
            .is_err());
    }

    #[test]
    fn test_connection_wide_event() {
        let msg = MessageBuilder::event(EventName::Other("NOTIFY".into()), RequestState::Complete)
            .build()
            .unwrap();
        assert_eq!(msg.request_id, None);
        assert!(msg.is_terminal());

        let err = MessageBuilder::event(EventName::SpeakComplete, RequestState::Complete)
            .channel(channel())
            .build()
            .unwrap_err();
        assert!(matches!(err, WireError::Framing(_)));
    }

    #[test]
    fn test_body_sets_content_length() {
        let msg = MessageBuilder::request(MethodName::Speak)
            .request_id(1)
            .header("Content-Type", "application/ssml+xml")
            .body("<speak/>")
            .build()
            .unwrap();
        assert_eq!(msg.content_length(), Some(8));

        let empty = MessageBuilder::request(MethodName::Stop)
            .request_id(2)
            .build()
            .unwrap();
        assert_eq!(empty.content_length(), None);
    }

    #[test]
    fn test_equality_ignores_length() {
        let a = MessageBuilder::response(StatusCode::Success, RequestState::InProgress)
            .request_id(7)
            .build()
            .unwrap();
        let mut b = a.clone();
        b.length = 123;
        assert_eq!(a, b);

        b.request_id = Some(8);
        assert_ne!(a, b);
    }
}
