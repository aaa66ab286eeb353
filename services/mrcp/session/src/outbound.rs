//! Outbound message queue and per-request lifecycle tracking.
//!
//! Every response or event leaving the session passes through [`Outbound`].
//! It remembers, per outstanding request id, the last state sent and refuses
//! regressions and anything after `COMPLETE`.

use crate::error::SessionError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mrcp_wire::{
    ChannelIdentifier, Message, MessageBuilder, RequestId, RequestState, StatusCode,
    COMPLETION_REASON,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug)]
struct Outstanding {
    channel: ChannelIdentifier,
    last_state: Option<RequestState>,
}

/// Cloneable sender into the session's write loop
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<Message>,
    requests: Arc<DashMap<RequestId, Outstanding>>,
}

impl Outbound {
    /// Wrap the write loop's queue
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            tx,
            requests: Arc::new(DashMap::new()),
        }
    }

    /// Start tracking a request. Returns `false` if the id is already
    /// outstanding.
    pub fn register(&self, request_id: RequestId, channel: &ChannelIdentifier) -> bool {
        match self.requests.entry(request_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(Outstanding {
                    channel: channel.clone(),
                    last_state: None,
                });
                true
            }
        }
    }

    /// Whether a request id is outstanding
    pub fn is_outstanding(&self, request_id: RequestId) -> bool {
        self.requests.contains_key(&request_id)
    }

    /// Number of outstanding requests
    pub fn outstanding(&self) -> usize {
        self.requests.len()
    }

    /// Send a response or event for a tracked request
    pub fn send(&self, message: Message) -> Result<(), SessionError> {
        let state = message.request_state().ok_or_else(|| {
            SessionError::InvalidMessage("only responses and events can be sent".into())
        })?;
        let request_id = match message.request_id {
            Some(id) => id,
            None => return self.send_untracked(message),
        };

        match self.requests.entry(request_id) {
            Entry::Vacant(_) => {
                warn!(request_id, "dropping message for request that is not outstanding");
                Err(SessionError::RequestCompleted(request_id))
            }
            Entry::Occupied(mut e) => {
                if let Some(from) = e.get().last_state {
                    if state < from {
                        warn!(request_id, %from, to = %state, "dropping state regression");
                        return Err(SessionError::StateRegression {
                            request_id,
                            from,
                            to: state,
                        });
                    }
                }
                // queued under the entry lock so a concurrent channel close
                // cannot slip a second terminal message in
                self.tx.send(message).map_err(|_| SessionError::Closed)?;
                if state.is_terminal() {
                    e.remove();
                } else {
                    e.get_mut().last_state = Some(state);
                }
                Ok(())
            }
        }
    }

    /// Send without lifecycle tracking (session-generated rejections and
    /// connection-wide events)
    pub fn send_untracked(&self, message: Message) -> Result<(), SessionError> {
        self.tx.send(message).map_err(|_| SessionError::Closed)
    }

    /// Fail every outstanding request on `channel` with a terminal 407.
    /// Returns the failed request ids.
    pub fn fail_channel(&self, channel: &ChannelIdentifier) -> Vec<RequestId> {
        let ids: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|e| e.value().channel == *channel)
            .map(|e| *e.key())
            .collect();

        let mut failed = Vec::with_capacity(ids.len());
        for id in ids {
            if self
                .requests
                .remove_if(&id, |_, o| o.channel == *channel)
                .is_none()
            {
                continue;
            }
            let response = MessageBuilder::response(StatusCode::OperationFailed, RequestState::Complete)
                .request_id(id)
                .channel(channel.clone())
                .header(COMPLETION_REASON, "channel closed")
                .build();
            match response {
                Ok(response) => {
                    if self.tx.send(response).is_err() {
                        debug!(request_id = id, "session gone, 407 not sent");
                    }
                }
                Err(e) => warn!(request_id = id, "failed to build 407: {}", e),
            }
            failed.push(id);
        }
        failed
    }

    /// Forget every outstanding request on `channel` without answering
    pub fn forget_channel(&self, channel: &ChannelIdentifier) {
        self.requests.retain(|_, o| o.channel != *channel);
    }

    /// Forget all outstanding requests
    pub fn clear(&self) {
        self.requests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrcp_wire::{EventName, ResourceType};

    fn channel(id: &str) -> ChannelIdentifier {
        ChannelIdentifier::new(id, ResourceType::SpeechRecog).unwrap()
    }

    fn response(id: RequestId, state: RequestState) -> Message {
        MessageBuilder::response(StatusCode::Success, state)
            .request_id(id)
            .channel(channel("1"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_rejects_outstanding_duplicate() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let outbound = Outbound::new(tx);
        assert!(outbound.register(1, &channel("1")));
        assert!(!outbound.register(1, &channel("2")));
        assert!(outbound.is_outstanding(1));
    }

    #[test]
    fn test_lifecycle_enforced() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outbound = Outbound::new(tx);
        outbound.register(1, &channel("1"));

        outbound.send(response(1, RequestState::InProgress)).unwrap();
        let regression = outbound.send(response(1, RequestState::Pending)).unwrap_err();
        assert!(matches!(regression, SessionError::StateRegression { .. }));

        let event = MessageBuilder::event(EventName::RecognitionComplete, RequestState::Complete)
            .request_id(1)
            .channel(channel("1"))
            .build()
            .unwrap();
        outbound.send(event).unwrap();
        assert!(!outbound.is_outstanding(1));

        let late = outbound.send(response(1, RequestState::Complete)).unwrap_err();
        assert!(matches!(late, SessionError::RequestCompleted(1)));

        let sent: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(sent.len(), 2);
    }

    #[test]
    fn test_fail_channel_sends_407() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outbound = Outbound::new(tx);
        outbound.register(1, &channel("a"));
        outbound.register(2, &channel("b"));
        outbound.register(3, &channel("a"));

        let mut failed = outbound.fail_channel(&channel("a"));
        failed.sort();
        assert_eq!(failed, vec![1, 3]);
        assert_eq!(outbound.outstanding(), 1);

        let sent: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(sent.len(), 2);
        for m in sent {
            assert_eq!(m.status(), Some(StatusCode::OperationFailed));
            assert!(m.is_terminal());
            assert_eq!(
                m.header(COMPLETION_REASON).and_then(|v| v.as_text()),
                Some("channel closed")
            );
        }
    }

    #[test]
    fn test_requests_cannot_be_sent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let outbound = Outbound::new(tx);
        let request = MessageBuilder::request(mrcp_wire::MethodName::Stop)
            .request_id(1)
            .build()
            .unwrap();
        assert!(matches!(outbound.send(request), Err(SessionError::InvalidMessage(_))));
    }
}
