//! Channel workers.
//!
//! Each live channel owns a tokio task that runs its requests one at a time
//! in arrival order. A slow handler only holds up its own channel. Requests
//! the session refuses after the channel exists are answered from the same
//! queue so their replies keep their place.

use crate::context::RequestContext;
use crate::handler::ResourceHandler;
use crate::outbound::Outbound;
use bytes::Bytes;
use futures::FutureExt;
use mrcp_wire::{
    ChannelIdentifier, HeaderMap, IllegalValue, Message, MessageKind, RequestId, RequestState,
    StatusCode, CHANNEL_IDENTIFIER, MRCP_VERSION,
};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug)]
enum Job {
    Handle(Message),
    /// Answer with 404 without calling the handler
    Reject(IllegalValue),
}

/// Handle on a running channel worker
#[derive(Debug)]
pub(crate) struct ChannelWorker {
    channel: ChannelIdentifier,
    jobs: mpsc::UnboundedSender<(RequestId, Job)>,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ChannelWorker {
    pub(crate) fn spawn(
        channel: ChannelIdentifier,
        handler: Arc<dyn ResourceHandler>,
        outbound: Outbound,
    ) -> Self {
        let (jobs, mut rx) = mpsc::unbounded_channel::<(RequestId, Job)>();
        let cancelled = Arc::new(AtomicBool::new(false));

        let task = {
            let channel = channel.clone();
            let cancelled = cancelled.clone();
            tokio::spawn(async move {
                while let Some((request_id, job)) = rx.recv().await {
                    let ctx = RequestContext::new(
                        request_id,
                        channel.clone(),
                        outbound.clone(),
                        cancelled.clone(),
                    );
                    match job {
                        Job::Handle(request) => run_request(handler.as_ref(), request, ctx).await,
                        Job::Reject(error) => {
                            debug!(channel = %channel, request_id, "illegal header: {}", error);
                            send_terminal(&ctx, status_only(&ctx, StatusCode::IllegalValueForHeader));
                        }
                    }
                }
                debug!(channel = %channel, "channel worker finished");
            })
        };

        Self {
            channel,
            jobs,
            cancelled,
            task,
        }
    }

    /// Queue a request behind the ones already submitted
    pub(crate) fn submit(&self, request_id: RequestId, request: Message) -> bool {
        self.jobs.send((request_id, Job::Handle(request))).is_ok()
    }

    /// Queue a 404 for a request that carried an illegal header
    pub(crate) fn reject(&self, request_id: RequestId, error: IllegalValue) -> bool {
        self.jobs.send((request_id, Job::Reject(error))).is_ok()
    }

    /// Stop the worker, dropping any in-flight handler future. Later sends
    /// from its contexts fail with `Cancelled`.
    pub(crate) fn close(self) {
        self.cancelled.store(true, Ordering::Release);
        self.task.abort();
        debug!(channel = %self.channel, "channel worker closed");
    }
}

async fn run_request(handler: &dyn ResourceHandler, request: Message, ctx: RequestContext) {
    let request_id = ctx.request_id();
    let method = request.method().cloned();

    let family = ctx.channel().resource_type().family();
    if let Some(name) = method.as_ref().filter(|m| !m.is_applicable_to(family)) {
        debug!(channel = %ctx.channel(), request_id, method = %name, "method not in resource vocabulary");
        send_terminal(&ctx, status_only(&ctx, StatusCode::MethodNotAllowed));
        return;
    }

    let outcome = AssertUnwindSafe(handler.handle(request, ctx.clone()))
        .catch_unwind()
        .await;

    let terminal = match outcome {
        Ok(Ok(message)) if message.is_terminal() => ctx.tag(message),
        Ok(Ok(message)) => {
            error!(
                channel = %ctx.channel(),
                request_id,
                state = ?message.request_state(),
                "handler returned a non-terminal message"
            );
            status_only(&ctx, StatusCode::ServerInternalError)
        }
        Ok(Err(e)) => {
            error!(channel = %ctx.channel(), request_id, ?method, "handler failed: {:#}", e);
            status_only(&ctx, StatusCode::ServerInternalError)
        }
        Err(_) => {
            error!(channel = %ctx.channel(), request_id, ?method, "handler panicked");
            status_only(&ctx, StatusCode::ServerInternalError)
        }
    };

    send_terminal(&ctx, terminal);
}

fn send_terminal(ctx: &RequestContext, terminal: Message) {
    if let Err(e) = ctx.send_message(terminal) {
        warn!(channel = %ctx.channel(), request_id = ctx.request_id(), "terminal message not sent: {}", e);
    }
}

/// Bare COMPLETE response carrying only the channel identifier
fn status_only(ctx: &RequestContext, status: StatusCode) -> Message {
    let mut headers = HeaderMap::new();
    headers.insert(CHANNEL_IDENTIFIER, ctx.channel().clone());
    Message {
        version: MRCP_VERSION.to_string(),
        length: 0,
        request_id: Some(ctx.request_id()),
        kind: MessageKind::Response {
            status,
            state: RequestState::Complete,
        },
        headers,
        body: Bytes::new(),
    }
}
