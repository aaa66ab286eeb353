//! Session error types.

use mrcp_wire::{RequestId, RequestState, WireError};
use thiserror::Error;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Framing or encoding failure
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Transport failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel was closed while the request was outstanding
    #[error("request cancelled: channel closed")]
    Cancelled,

    /// A message was sent for a request that already completed (or was never
    /// accepted on this session)
    #[error("request {0} is not outstanding")]
    RequestCompleted(RequestId),

    /// A message would move a request backwards in its lifecycle
    #[error("request {request_id}: state {to} after {from}")]
    StateRegression {
        /// Request id
        request_id: RequestId,
        /// Last state sent
        from: RequestState,
        /// Rejected state
        to: RequestState,
    },

    /// A handler tried to send something other than a response or event
    #[error("invalid outbound message: {0}")]
    InvalidMessage(String),

    /// The session is gone
    #[error("session closed")]
    Closed,
}
