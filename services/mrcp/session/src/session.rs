//! Server-side session: one per connection.
//!
//! The session loop owns the decoder, the encoder and the live channels. It
//! reads and decodes requests, routes each one to its channel worker, and
//! writes whatever the workers queue on the shared outbound sink.

use bytes::BytesMut;
use mrcp_wire::{
    ChannelIdentifier, Decoded, FrameDecoder, HeaderRegistry, IllegalValue, Message,
    MessageBuilder, MessageEncoder, RequestId, RequestState, StatusCode, WireError,
    DEFAULT_MAX_MESSAGE_SIZE,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::channel::ChannelWorker;
use crate::error::SessionError;
use crate::handler::HandlerRegistry;
use crate::outbound::Outbound;

/// Configuration for a session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Largest message accepted or sent
    pub max_message_size: usize,
    /// Initial read buffer capacity
    pub read_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_buffer_size: 64 * 1024,
        }
    }
}

/// Statistics for a session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Total bytes received
    pub bytes_in: u64,
    /// Total bytes sent
    pub bytes_out: u64,
    /// Messages decoded
    pub messages_in: u64,
    /// Messages written
    pub messages_out: u64,
    /// Channels allocated over the session's lifetime
    pub channels_opened: u64,
    /// Requests answered by the session itself (404/405/406/501)
    pub requests_rejected: u64,
}

#[derive(Debug)]
enum SessionCommand {
    CloseChannel {
        channel: ChannelIdentifier,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Control handle for a running session
#[derive(Clone, Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Close a channel. Its outstanding requests are answered with 407 and
    /// later requests naming it get 405. Returns whether the channel was live.
    pub async fn close_channel(&self, channel: ChannelIdentifier) -> Result<bool, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::CloseChannel { channel, reply })
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Stop the session after flushing already queued messages
    pub fn shutdown(&self) {
        // an error means the session already ended
        let _ = self.commands.send(SessionCommand::Shutdown);
    }
}

/// One MRCPv2 connection
pub struct Session {
    config: SessionConfig,
    headers: Arc<HeaderRegistry>,
    handlers: Arc<HandlerRegistry>,
    label: String,
    handle: SessionHandle,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
}

impl Session {
    /// Create a session serving `handlers`
    pub fn new(config: SessionConfig, headers: Arc<HeaderRegistry>, handlers: Arc<HandlerRegistry>) -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        Self {
            config,
            headers,
            handlers,
            label: "session".to_string(),
            handle: SessionHandle { commands: tx },
            commands,
        }
    }

    /// Name used in log lines, typically the peer address
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Control handle; stays usable after `run` starts
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Serve the connection until the peer closes it, a framing error
    /// occurs, or shutdown is requested. All channels are dropped on return.
    pub async fn run<S>(self, stream: S) -> Result<SessionStats, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let Session {
            config,
            headers,
            handlers,
            label,
            handle: _handle,
            mut commands,
        } = self;

        let (mut reader, mut writer) = tokio::io::split(stream);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let outbound = Outbound::new(out_tx);

        let mut decoder = FrameDecoder::new(headers.clone()).with_max_message_size(config.max_message_size);
        let mut writer_state = Writer {
            encoder: MessageEncoder::new(headers).with_max_message_size(config.max_message_size),
            buffer: BytesMut::new(),
        };
        let mut state = SessionState {
            label: label.clone(),
            handlers,
            outbound,
            channels: HashMap::new(),
            closed: HashSet::new(),
            stats: SessionStats::default(),
        };
        let mut read_buffer = BytesMut::with_capacity(config.read_buffer_size);

        info!(peer = %label, "session started");

        let result: Result<(), SessionError> = loop {
            tokio::select! {
                biased;

                Some(command) = commands.recv() => match command {
                    SessionCommand::CloseChannel { channel, reply } => {
                        let was_live = state.close_channel(&channel);
                        let _ = reply.send(was_live);
                    }
                    SessionCommand::Shutdown => {
                        info!(peer = %label, "shutdown requested");
                        let mut flushed = Ok(());
                        while let Ok(message) = out_rx.try_recv() {
                            if let Err(e) = writer_state.write(&mut writer, message, &mut state.stats).await {
                                flushed = Err(e);
                                break;
                            }
                        }
                        break flushed;
                    }
                },

                Some(message) = out_rx.recv() => {
                    if let Err(e) = writer_state.write(&mut writer, message, &mut state.stats).await {
                        error!(peer = %label, "write failed: {}", e);
                        break Err(e);
                    }
                }

                read = reader.read_buf(&mut read_buffer) => match read {
                    Ok(0) => {
                        if decoder.is_mid_message() {
                            warn!(peer = %label, "connection closed mid-message");
                        } else {
                            info!(peer = %label, "connection closed by peer");
                        }
                        break Ok(());
                    }
                    Ok(n) => {
                        state.stats.bytes_in += n as u64;
                        if let Err(e) = state.drain(&mut decoder, &mut read_buffer) {
                            error!(peer = %label, "framing error, closing connection: {}", e);
                            break Err(e.into());
                        }
                    }
                    Err(e) => {
                        error!(peer = %label, "read failed: {}", e);
                        break Err(e.into());
                    }
                },
            }
        };

        state.teardown();
        info!(peer = %label, "session ended. Stats: {:?}", state.stats);
        result.map(|_| state.stats)
    }
}

struct Writer {
    encoder: MessageEncoder,
    buffer: BytesMut,
}

impl Writer {
    async fn write<W>(&mut self, writer: &mut W, message: Message, stats: &mut SessionStats) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin,
    {
        self.buffer.clear();
        if let Err(e) = self.encoder.encode(&message, &mut self.buffer) {
            error!(request_id = ?message.request_id, "cannot encode outbound message: {}", e);
            // the request is already accounted complete; answer it with 501
            let fallback = match (message.request_id, message.is_terminal()) {
                (Some(id), true) => {
                    let mut builder = MessageBuilder::response(StatusCode::ServerInternalError, RequestState::Complete)
                        .request_id(id);
                    if let Some(channel) = message.channel_identifier() {
                        builder = builder.channel(channel.clone());
                    }
                    builder.build().ok()
                }
                _ => None,
            };
            match fallback {
                Some(fallback) => {
                    self.buffer.clear();
                    self.encoder.encode(&fallback, &mut self.buffer)?;
                }
                None => return Ok(()),
            }
        }

        writer.write_all(&self.buffer).await?;
        writer.flush().await?;
        stats.bytes_out += self.buffer.len() as u64;
        stats.messages_out += 1;
        Ok(())
    }
}

struct SessionState {
    label: String,
    handlers: Arc<HandlerRegistry>,
    outbound: Outbound,
    channels: HashMap<ChannelIdentifier, ChannelWorker>,
    closed: HashSet<ChannelIdentifier>,
    stats: SessionStats,
}

impl SessionState {
    /// Decode and dispatch every complete message in the buffer
    fn drain(&mut self, decoder: &mut FrameDecoder, buf: &mut BytesMut) -> Result<(), WireError> {
        while let Some(decoded) = decoder.decode(buf)? {
            self.stats.messages_in += 1;
            self.on_decoded(decoded);
        }
        Ok(())
    }

    fn on_decoded(&mut self, decoded: Decoded) {
        match decoded {
            Decoded::Message(message) if message.is_request() => self.route(message),
            Decoded::Rejected { message, error } if message.is_request() => self.reject(message, error),
            other => {
                let message = other.message();
                debug!(
                    peer = %self.label,
                    request_id = ?message.request_id,
                    kind = ?message.kind,
                    "ignoring non-request message"
                );
            }
        }
    }

    /// Answer a request that carried an illegal header. On a live channel the
    /// 404 queues behind the channel's earlier requests.
    fn reject(&mut self, message: Message, error: IllegalValue) {
        if self.is_duplicate(&message) {
            return;
        }
        warn!(peer = %self.label, request_id = ?message.request_id, "rejecting request: {}", error);

        let live = match (message.request_id, message.channel_identifier()) {
            (Some(id), Some(channel)) if self.channels.contains_key(channel) => Some((id, channel.clone())),
            _ => None,
        };
        let (request_id, channel) = match live {
            Some(live) => live,
            None => {
                self.reply(&message, StatusCode::IllegalValueForHeader);
                return;
            }
        };

        self.stats.requests_rejected += 1;
        let queued = match self.channels.get(&channel) {
            Some(worker) => {
                self.outbound.register(request_id, &channel);
                worker.reject(request_id, error)
            }
            None => false,
        };
        if !queued {
            self.worker_unavailable(request_id, channel);
        }
    }

    fn is_duplicate(&self, request: &Message) -> bool {
        match request.request_id {
            Some(id) if self.outbound.is_outstanding(id) => {
                warn!(peer = %self.label, request_id = id, "request id already outstanding, dropping");
                true
            }
            _ => false,
        }
    }

    fn route(&mut self, request: Message) {
        let request_id = match request.request_id {
            Some(id) => id,
            None => {
                warn!(peer = %self.label, "request without request id");
                return;
            }
        };
        if self.is_duplicate(&request) {
            return;
        }

        let channel = match request.channel_identifier() {
            Some(channel) => channel.clone(),
            None => {
                debug!(peer = %self.label, request_id, "request without Channel-Identifier");
                self.reply(&request, StatusCode::MandatoryHeaderMissing);
                return;
            }
        };

        if self.closed.contains(&channel) {
            debug!(peer = %self.label, %channel, request_id, "request for closed channel");
            self.reply(&request, StatusCode::ResourceNotAllocated);
            return;
        }

        if !self.channels.contains_key(&channel) && !self.open_channel(&channel, &request) {
            return;
        }

        let submitted = match self.channels.get(&channel) {
            Some(worker) => {
                self.outbound.register(request_id, &channel);
                worker.submit(request_id, request)
            }
            None => false,
        };
        if !submitted {
            self.worker_unavailable(request_id, channel);
        }
    }

    fn worker_unavailable(&self, request_id: RequestId, channel: ChannelIdentifier) {
        error!(peer = %self.label, %channel, request_id, "channel worker unavailable");
        let failure = MessageBuilder::response(StatusCode::ServerInternalError, RequestState::Complete)
            .request_id(request_id)
            .channel(channel)
            .build();
        if let Ok(failure) = failure {
            let _ = self.outbound.send(failure);
        }
    }

    /// Allocate a channel for its first request. Answers the request and
    /// returns `false` if that is not possible.
    fn open_channel(&mut self, channel: &ChannelIdentifier, request: &Message) -> bool {
        let registration = request
            .method()
            .map_or(false, |m| m.is_registration_capable());
        let factory = if registration {
            self.handlers.get(channel.resource_type()).cloned()
        } else {
            None
        };
        let factory = match factory {
            Some(factory) => factory,
            None => {
                debug!(
                    peer = %self.label,
                    %channel,
                    method = ?request.method(),
                    "no channel to allocate"
                );
                self.reply(request, StatusCode::ResourceNotAllocated);
                return false;
            }
        };

        match factory.create(channel) {
            Ok(handler) => {
                let worker = ChannelWorker::spawn(channel.clone(), handler, self.outbound.clone());
                self.channels.insert(channel.clone(), worker);
                self.stats.channels_opened += 1;
                info!(peer = %self.label, %channel, "channel opened");
                true
            }
            Err(e) => {
                error!(peer = %self.label, %channel, "handler factory failed: {:#}", e);
                self.reply(request, StatusCode::ServerInternalError);
                false
            }
        }
    }

    /// Session-generated terminal response
    fn reply(&mut self, request: &Message, status: StatusCode) {
        let request_id = match request.request_id {
            Some(id) => id,
            None => return,
        };
        let mut builder = MessageBuilder::response(status, RequestState::Complete).request_id(request_id);
        if let Some(channel) = request.channel_identifier() {
            builder = builder.channel(channel.clone());
        }
        match builder.build() {
            Ok(response) => {
                self.stats.requests_rejected += 1;
                if self.outbound.send_untracked(response).is_err() {
                    debug!(peer = %self.label, request_id, "session closing, reply dropped");
                }
            }
            Err(e) => warn!(peer = %self.label, request_id, "failed to build reply: {}", e),
        }
    }

    fn close_channel(&mut self, channel: &ChannelIdentifier) -> bool {
        match self.channels.remove(channel) {
            Some(worker) => {
                worker.close();
                self.closed.insert(channel.clone());
                let failed = self.outbound.fail_channel(channel);
                info!(peer = %self.label, %channel, failed = failed.len(), "channel closed");
                true
            }
            None => false,
        }
    }

    fn teardown(&mut self) {
        for (channel, worker) in self.channels.drain() {
            worker.close();
            self.outbound.forget_channel(&channel);
        }
        self.outbound.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::resources::{Synthesizer, SynthesizerHandler};
    use async_trait::async_trait;
    use mrcp_wire::{
        CompletionCause, EventName, MethodName, ResourceType, COMPLETION_CAUSE, COMPLETION_REASON,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    /// Synthesizer that announces IN-PROGRESS, waits, then completes. A
    /// SPEAK whose body is "hang" never finishes on its own.
    struct TestSpeaker {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SynthesizerHandler for TestSpeaker {
        async fn speak(&self, request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ctx.send(ctx.response(StatusCode::Success, RequestState::InProgress))?;
            if &request.body[..] == b"hang" {
                futures::future::pending::<()>().await;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(ctx
                .event(EventName::SpeakComplete, RequestState::Complete)
                .header(COMPLETION_CAUSE, CompletionCause::new(0, "normal"))
                .build()?)
        }

        async fn stop(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ctx.response(StatusCode::Success, RequestState::Complete).build()?)
        }

        async fn control(&self, _request: Message, _ctx: RequestContext) -> anyhow::Result<Message> {
            anyhow::bail!("control is broken")
        }
    }

    struct Peer {
        stream: DuplexStream,
        decoder: FrameDecoder,
        encoder: MessageEncoder,
        buf: BytesMut,
    }

    impl Peer {
        async fn send(&mut self, message: &Message) {
            let bytes = self.encoder.encode_to_bytes(message).unwrap();
            self.stream.write_all(&bytes).await.unwrap();
        }

        async fn send_raw(&mut self, bytes: &[u8]) {
            self.stream.write_all(bytes).await.unwrap();
        }

        async fn recv(&mut self) -> Message {
            loop {
                if let Some(decoded) = self.decoder.decode(&mut self.buf).unwrap() {
                    return decoded.message().clone();
                }
                let n = tokio::time::timeout(Duration::from_secs(5), self.stream.read_buf(&mut self.buf))
                    .await
                    .expect("timed out waiting for message")
                    .unwrap();
                assert!(n > 0, "session closed the connection");
            }
        }
    }

    fn start(calls: Arc<AtomicUsize>) -> (Peer, SessionHandle, JoinHandle<Result<SessionStats, SessionError>>) {
        let headers = Arc::new(HeaderRegistry::standard());
        let mut handlers = HandlerRegistry::new();
        handlers.register_handler(ResourceType::SpeechSynth, move |_| {
            Synthesizer(TestSpeaker { calls: calls.clone() })
        });
        let session = Session::new(SessionConfig::default(), headers.clone(), Arc::new(handlers))
            .with_label("test");
        let handle = session.handle();
        let (client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(session.run(server));
        let peer = Peer {
            stream: client,
            decoder: FrameDecoder::new(headers.clone()),
            encoder: MessageEncoder::new(headers),
            buf: BytesMut::new(),
        };
        (peer, handle, task)
    }

    fn synth(id: &str) -> ChannelIdentifier {
        ChannelIdentifier::new(id, ResourceType::SpeechSynth).unwrap()
    }

    fn request(method: MethodName, id: u64, channel: &ChannelIdentifier) -> Message {
        MessageBuilder::request(method)
            .request_id(id)
            .channel(channel.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_lifecycle() {
        let (mut peer, handle, task) = start(Arc::new(AtomicUsize::new(0)));
        let channel = synth("32AECB23433801");

        peer.send(&request(MethodName::Speak, 1, &channel)).await;
        let interim = peer.recv().await;
        assert_eq!(interim.status(), Some(StatusCode::Success));
        assert_eq!(interim.request_state(), Some(RequestState::InProgress));
        assert_eq!(interim.channel_identifier(), Some(&channel));

        let complete = peer.recv().await;
        assert_eq!(complete.event_name(), Some(&EventName::SpeakComplete));
        assert_eq!(complete.request_id, Some(1));
        assert!(complete.is_terminal());

        peer.send(&request(MethodName::Stop, 2, &channel)).await;
        let stopped = peer.recv().await;
        assert_eq!(stopped.request_id, Some(2));
        assert_eq!(stopped.status(), Some(StatusCode::Success));
        assert!(stopped.is_terminal());

        handle.shutdown();
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.channels_opened, 1);
        assert_eq!(stats.messages_in, 2);
        assert_eq!(stats.messages_out, 3);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_405_without_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (mut peer, handle, task) = start(calls.clone());

        // STOP cannot allocate a channel
        peer.send(&request(MethodName::Stop, 5, &synth("nope"))).await;
        let response = peer.recv().await;
        assert_eq!(response.status(), Some(StatusCode::ResourceNotAllocated));
        assert_eq!(response.request_id, Some(5));
        assert!(response.is_terminal());

        // no factory for recorders
        let recorder = ChannelIdentifier::new("rec", ResourceType::Recorder).unwrap();
        peer.send(&request(MethodName::Record, 6, &recorder)).await;
        let response = peer.recv().await;
        assert_eq!(response.status(), Some(StatusCode::ResourceNotAllocated));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_missing_channel_identifier_is_406() {
        let (mut peer, handle, task) = start(Arc::new(AtomicUsize::new(0)));
        let message = MessageBuilder::request(MethodName::Speak)
            .request_id(3)
            .build()
            .unwrap();
        peer.send(&message).await;
        let response = peer.recv().await;
        assert_eq!(response.status(), Some(StatusCode::MandatoryHeaderMissing));
        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_illegal_header_is_404() {
        let (mut peer, handle, task) = start(Arc::new(AtomicUsize::new(0)));
        let template = "MRCP/2.0 LEN SPEAK 8\r\nChannel-Identifier: 1@speechsynth\r\nKill-On-Barge-In: perhaps\r\n\r\n";
        let len = template.len() - 3 + 2;
        peer.send_raw(template.replace("LEN", &len.to_string()).as_bytes()).await;

        let response = peer.recv().await;
        assert_eq!(response.status(), Some(StatusCode::IllegalValueForHeader));
        assert_eq!(response.request_id, Some(8));
        assert_eq!(response.channel_identifier(), Some(&synth("1")));
        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_illegal_header_on_live_channel_keeps_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (mut peer, handle, task) = start(calls.clone());
        peer.send(&request(MethodName::Speak, 1, &synth("1"))).await;
        let template = "MRCP/2.0 LEN STOP 2\r\nChannel-Identifier: 1@speechsynth\r\nKill-On-Barge-In: perhaps\r\n\r\n";
        let len = template.len() - 3 + 2;
        peer.send_raw(template.replace("LEN", &len.to_string()).as_bytes()).await;

        let mut seen = Vec::new();
        for _ in 0..3 {
            let m = peer.recv().await;
            seen.push((m.request_id, m.status(), m.request_state()));
        }
        assert_eq!(
            seen,
            vec![
                (Some(1), Some(StatusCode::Success), Some(RequestState::InProgress)),
                (Some(1), None, Some(RequestState::Complete)),
                (
                    Some(2),
                    Some(StatusCode::IllegalValueForHeader),
                    Some(RequestState::Complete)
                ),
            ]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        handle.shutdown();
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.requests_rejected, 1);
    }

    #[tokio::test]
    async fn test_same_channel_order() {
        let (mut peer, handle, task) = start(Arc::new(AtomicUsize::new(0)));
        let channel = synth("ordered");
        peer.send(&request(MethodName::Speak, 10, &channel)).await;
        peer.send(&request(MethodName::Stop, 11, &channel)).await;
        peer.send(&request(MethodName::Stop, 12, &channel)).await;

        let mut seen = Vec::new();
        for _ in 0..4 {
            let m = peer.recv().await;
            seen.push((m.request_id, m.request_state()));
        }
        assert_eq!(
            seen,
            vec![
                (Some(10), Some(RequestState::InProgress)),
                (Some(10), Some(RequestState::Complete)),
                (Some(11), Some(RequestState::Complete)),
                (Some(12), Some(RequestState::Complete)),
            ]
        );
        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_handler_error_is_501_and_channel_survives() {
        let (mut peer, handle, task) = start(Arc::new(AtomicUsize::new(0)));
        let channel = synth("faulty");
        peer.send(&request(MethodName::Speak, 1, &channel)).await;
        peer.recv().await;
        peer.recv().await;

        peer.send(&request(MethodName::Control, 2, &channel)).await;
        let response = peer.recv().await;
        assert_eq!(response.status(), Some(StatusCode::ServerInternalError));
        assert!(response.is_terminal());

        // unimplemented operation falls back to 401
        peer.send(&request(MethodName::Pause, 3, &channel)).await;
        assert_eq!(peer.recv().await.status(), Some(StatusCode::MethodNotAllowed));

        peer.send(&request(MethodName::Stop, 4, &channel)).await;
        assert_eq!(peer.recv().await.status(), Some(StatusCode::Success));
        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_channel_fails_outstanding_with_407() {
        let (mut peer, handle, task) = start(Arc::new(AtomicUsize::new(0)));
        let channel = synth("closing");
        let hanging = MessageBuilder::request(MethodName::Speak)
            .request_id(20)
            .channel(channel.clone())
            .body("hang")
            .build()
            .unwrap();
        peer.send(&hanging).await;
        assert_eq!(peer.recv().await.request_state(), Some(RequestState::InProgress));

        // queued behind the hanging SPEAK
        peer.send(&request(MethodName::Stop, 21, &channel)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(handle.close_channel(channel.clone()).await.unwrap());
        let mut failed = Vec::new();
        for _ in 0..2 {
            let m = peer.recv().await;
            assert_eq!(m.status(), Some(StatusCode::OperationFailed));
            assert_eq!(
                m.header(COMPLETION_REASON).and_then(|v| v.as_text()),
                Some("channel closed")
            );
            failed.push(m.request_id);
        }
        failed.sort();
        assert_eq!(failed, vec![Some(20), Some(21)]);

        peer.send(&request(MethodName::Speak, 22, &channel)).await;
        assert_eq!(peer.recv().await.status(), Some(StatusCode::ResourceNotAllocated));

        assert!(!handle.close_channel(channel).await.unwrap());
        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_outstanding_id_dropped() {
        let (mut peer, handle, task) = start(Arc::new(AtomicUsize::new(0)));
        let channel = synth("dup");
        let hanging = MessageBuilder::request(MethodName::Speak)
            .request_id(30)
            .channel(channel.clone())
            .body("hang")
            .build()
            .unwrap();
        peer.send(&hanging).await;
        assert_eq!(peer.recv().await.request_id, Some(30));

        peer.send(&request(MethodName::Stop, 30, &synth("other"))).await;
        peer.send(&request(MethodName::Stop, 31, &synth("other"))).await;
        // the duplicate got no answer; the next request did
        let next = peer.recv().await;
        assert_eq!(next.request_id, Some(31));
        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_framing_error_closes_connection() {
        let (mut peer, _handle, task) = start(Arc::new(AtomicUsize::new(0)));
        peer.send_raw(b"GARBAGE\r\n").await;
        let result = task.await.unwrap();
        assert!(matches!(result, Err(SessionError::Wire(WireError::Framing(_)))));
    }

    #[tokio::test]
    async fn test_peer_close_ends_session() {
        let (peer, _handle, task) = start(Arc::new(AtomicUsize::new(0)));
        drop(peer);
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats, SessionStats::default());
    }

}
