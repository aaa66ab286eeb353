//! MRCPv2 server sessions: channel multiplexing, handler dispatch, and
//! request lifecycle enforcement.
//!
//! One [`Session`] serves one connection. Requests are routed by their
//! `Channel-Identifier` to a per-channel worker running the resource
//! handler registered for the channel's resource type; responses and events
//! flow back through a single outbound queue that enforces the
//! `PENDING < IN-PROGRESS < COMPLETE` lifecycle of every request.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mrcp_session::{
//!     HandlerRegistry, RequestContext, Session, SessionConfig, Synthesizer, SynthesizerHandler,
//! };
//! use mrcp_wire::{HeaderRegistry, Message, RequestState, ResourceType, StatusCode};
//! use std::sync::Arc;
//!
//! struct Silence;
//!
//! #[async_trait::async_trait]
//! impl SynthesizerHandler for Silence {
//!     async fn speak(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
//!         Ok(ctx.response(StatusCode::Success, RequestState::Complete).build()?)
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut handlers = HandlerRegistry::new();
//! handlers.register_handler(ResourceType::SpeechSynth, |_| Synthesizer(Silence));
//!
//! let listener = mrcp_session::listen_tcp("127.0.0.1:1544".parse()?).await?;
//! let (stream, _peer) = listener.accept().await?;
//! let session = Session::new(
//!     SessionConfig::default(),
//!     Arc::new(HeaderRegistry::standard()),
//!     Arc::new(handlers),
//! );
//! let stats = session.run(stream).await?;
//! println!("served {} messages", stats.messages_in);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod channel;
pub mod context;
pub mod error;
pub mod handler;
pub mod outbound;
pub mod resources;
pub mod session;
pub mod transport;

// Re-export main types
pub use context::RequestContext;
pub use error::SessionError;
pub use handler::{HandlerRegistry, ResourceHandler, ResourceHandlerFactory};
pub use outbound::Outbound;
pub use resources::{
    method_not_allowed, Recognizer, RecognizerHandler, Recorder, RecorderHandler, Synthesizer,
    SynthesizerHandler, Verifier, VerifierHandler,
};
pub use session::{Session, SessionConfig, SessionHandle, SessionStats};
pub use transport::{connect_tcp, listen_tcp, serve};
