//! Client error types

use mrcp_wire::{Message, RequestId, WireError};
use thiserror::Error;

/// Errors returned to callers of [`crate::MrcpClient`]
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered with an error status
    #[error("{}", describe_failure(.response))]
    InvocationFailure {
        /// The message that ended the request
        response: Box<Message>,
    },

    /// The request's channel was cancelled locally
    #[error("request cancelled")]
    Cancelled,

    /// The connection is gone
    #[error("connection closed")]
    Closed,

    /// The caller picked a request id that is still outstanding
    #[error("request id {0} is already outstanding")]
    DuplicateRequestId(RequestId),

    /// The request could not be built or encoded
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}

impl ClientError {
    /// The failing server message, for `InvocationFailure`
    pub fn response(&self) -> Option<&Message> {
        match self {
            ClientError::InvocationFailure { response } => Some(response),
            _ => None,
        }
    }
}

fn describe_failure(response: &Message) -> String {
    match response.status() {
        Some(status) => format!(
            "MRCPv2 Status Code: {} [{}]",
            status,
            status.description().unwrap_or("Unknown")
        ),
        None => "MRCPv2 Status Code: unavailable".to_string(),
    }
}
