//! MRCPv2 client invocation layer.
//!
//! [`MrcpClient`] sends requests over one connection and correlates the
//! server's responses and events back to each caller by request id. A
//! request resolves when its `COMPLETE` message arrives:
//!
//! ```rust,no_run
//! use mrcp_client::{ClientConfig, MrcpClient};
//! use mrcp_wire::{ChannelIdentifier, HeaderRegistry, MessageBuilder, MethodName, ResourceType};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = MrcpClient::connect_tcp(
//!     "127.0.0.1:1544".parse()?,
//!     ClientConfig::default(),
//!     Arc::new(HeaderRegistry::standard()),
//!     None,
//! )
//! .await?;
//!
//! let channel = ChannelIdentifier::new("32AECB23433801", ResourceType::SpeechSynth)?;
//! let invocation = client
//!     .send_request(
//!         MessageBuilder::request(MethodName::Speak)
//!             .channel(channel)
//!             .header("Content-Type", "text/plain")
//!             .body("Hello"),
//!     )
//!     .await?;
//! println!("completed with {:?}", invocation.terminal.event_name());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;

// Re-export main types
pub use client::{ClientConfig, Invocation, MrcpClient};
pub use error::ClientError;
