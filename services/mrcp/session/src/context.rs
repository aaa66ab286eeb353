//! Per-request context handed to resource handlers.

use crate::error::SessionError;
use crate::outbound::Outbound;
use mrcp_wire::{
    ChannelIdentifier, EventName, Message, MessageBuilder, RequestId, RequestState, StatusCode,
    CHANNEL_IDENTIFIER,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a handler knows about the request it is serving, plus a way to send
/// interim responses and events before returning the terminal message.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    channel: ChannelIdentifier,
    outbound: Outbound,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    pub(crate) fn new(
        request_id: RequestId,
        channel: ChannelIdentifier,
        outbound: Outbound,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            request_id,
            channel,
            outbound,
            cancelled,
        }
    }

    /// Request id being served
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Channel the request arrived on
    pub fn channel(&self) -> &ChannelIdentifier {
        &self.channel
    }

    /// Whether the channel has been closed under this request
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Response builder tagged with this request's id and channel
    pub fn response(&self, status: StatusCode, state: RequestState) -> MessageBuilder {
        MessageBuilder::response(status, state)
            .request_id(self.request_id)
            .channel(self.channel.clone())
    }

    /// Event builder tagged with this request's id and channel
    pub fn event(&self, name: EventName, state: RequestState) -> MessageBuilder {
        MessageBuilder::event(name, state)
            .request_id(self.request_id)
            .channel(self.channel.clone())
    }

    /// Send an interim (or early terminal) message for this request
    pub fn send(&self, builder: MessageBuilder) -> Result<(), SessionError> {
        let message = self.tag(builder.build()?);
        self.send_message(message)
    }

    pub(crate) fn send_message(&self, message: Message) -> Result<(), SessionError> {
        if self.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        self.outbound.send(message)
    }

    /// Force the request id and channel of an outgoing message to this request's
    pub(crate) fn tag(&self, mut message: Message) -> Message {
        message.request_id = Some(self.request_id);
        message
            .headers
            .insert(CHANNEL_IDENTIFIER, self.channel.clone());
        message
    }
}
