//! MRCPv2 message model, header registry, and stream framing/encoding.
//!
//! This crate is the protocol layer shared by the server session and the
//! client: it knows how messages look on the wire and nothing about
//! channels or handlers.
//!
//! ## Wire Format
//!
//! ```text
//! request  : MRCP/2.0 <length> <method> <request-id>CRLF
//! response : MRCP/2.0 <length> <status-code> <request-id> <request-state>CRLF
//! event    : MRCP/2.0 <length> <event-name> <request-id> <request-state>CRLF
//!            *(<Name>: <value>CRLF)
//!            CRLF
//!            [body of Content-Length bytes]
//! ```
//!
//! `<length>` counts every byte of the message, its own digits included.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod frame;
pub mod header;
pub mod message;
pub mod registry;
pub mod resource;
pub mod status;
pub mod token;

// Re-export main types
pub use codec::MessageEncoder;
pub use error::{IllegalValue, TokenError, WireError};
pub use frame::{Decoded, FrameDecoder, DEFAULT_MAX_MESSAGE_SIZE, MAX_LINE_LENGTH};
pub use header::{
    CompletionCause, HeaderMap, HeaderValue, ACTIVE_REQUEST_ID_LIST, CHANNEL_IDENTIFIER,
    COMPLETION_CAUSE, COMPLETION_REASON, CONTENT_LENGTH, CONTENT_TYPE,
};
pub use message::{Message, MessageBuilder, MessageKind, RequestId, MRCP_VERSION};
pub use registry::{HeaderRegistry, HeaderValueFactory};
pub use resource::{ChannelIdentifier, ResourceFamily, ResourceType};
pub use status::{StatusClass, StatusCode};
pub use token::{EventName, MethodName, RequestState};
