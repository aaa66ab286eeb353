//! Request/response correlation over one MRCPv2 connection.
//!
//! A background I/O task owns the stream. Callers hand it requests through
//! a queue and wait on a oneshot; the read side routes each decoded message
//! to the waiting caller by request id and never blocks on one.

use bytes::BytesMut;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mrcp_wire::{
    ChannelIdentifier, Decoded, FrameDecoder, HeaderRegistry, Message, MessageBuilder,
    MessageEncoder, RequestId, RequestState, DEFAULT_MAX_MESSAGE_SIZE,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::ClientError;

/// Configuration for a client connection
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Largest message accepted or sent
    pub max_message_size: usize,
    /// Initial read buffer capacity
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_buffer_size: 16 * 1024,
        }
    }
}

/// Everything the server sent for one successful request
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Provisional `IN-PROGRESS` (or `PENDING`) response, if the request
    /// did not complete immediately
    pub response: Option<Message>,
    /// `IN-PROGRESS` events, in arrival order
    pub interim_events: Vec<Message>,
    /// The `COMPLETE` response or event
    pub terminal: Message,
}

impl Invocation {
    /// Whether the request completed with its first response
    pub fn completed_immediately(&self) -> bool {
        self.response.is_none() && self.terminal.is_response()
    }
}

type Reply = oneshot::Sender<Result<Invocation, ClientError>>;

struct PendingRequest {
    channel: Option<ChannelIdentifier>,
    provisional: Option<Message>,
    interim: Vec<Message>,
    reply: Reply,
}

impl PendingRequest {
    fn complete(self, terminal: Message) {
        let result = match terminal.status() {
            Some(status) if !status.is_success() => Err(ClientError::InvocationFailure {
                response: Box::new(terminal),
            }),
            _ => Ok(Invocation {
                response: self.provisional,
                interim_events: self.interim,
                terminal,
            }),
        };
        let _ = self.reply.send(result);
    }

    fn fail(self, error: ClientError) {
        let _ = self.reply.send(Err(error));
    }
}

struct Shared {
    pending: DashMap<RequestId, PendingRequest>,
    next_id: AtomicU64,
    closed: AtomicBool,
    shutdown: Notify,
}

impl Shared {
    fn allocate(&self, channel: Option<ChannelIdentifier>, reply: Reply) -> RequestId {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            if let Entry::Vacant(e) = self.pending.entry(id) {
                e.insert(PendingRequest {
                    channel,
                    provisional: None,
                    interim: Vec::new(),
                    reply,
                });
                return id;
            }
        }
    }

    fn claim(
        &self,
        id: RequestId,
        channel: Option<ChannelIdentifier>,
        reply: Reply,
    ) -> Result<(), ClientError> {
        match self.pending.entry(id) {
            Entry::Occupied(_) => Err(ClientError::DuplicateRequestId(id)),
            Entry::Vacant(e) => {
                e.insert(PendingRequest {
                    channel,
                    provisional: None,
                    interim: Vec::new(),
                    reply,
                });
                Ok(())
            }
        }
    }

    fn fail(&self, id: RequestId, error: ClientError) {
        if let Some((_, pending)) = self.pending.remove(&id) {
            pending.fail(error);
        }
    }

    fn fail_all(&self) -> usize {
        let ids: Vec<RequestId> = self.pending.iter().map(|e| *e.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                pending.fail(ClientError::Closed);
                failed += 1;
            }
        }
        failed
    }

    fn dispatch(&self, decoded: Decoded, events: &Option<mpsc::UnboundedSender<Message>>) {
        let (message, rejection) = match decoded {
            Decoded::Message(message) => (message, None),
            Decoded::Rejected { message, error } => (message, Some(error)),
        };

        if message.is_request() {
            warn!(request_id = ?message.request_id, "server sent a request, dropping");
            return;
        }

        let waiting = message
            .request_id
            .filter(|id| self.pending.contains_key(id));

        let id = match waiting {
            Some(id) => id,
            None if message.is_event() => {
                trace!(event = ?message.event_name(), "unsolicited event");
                if let Some(events) = events {
                    if events.send(message).is_err() {
                        debug!("unsolicited event listener is gone");
                    }
                }
                return;
            }
            None => {
                warn!(
                    request_id = ?message.request_id,
                    status = ?message.status(),
                    "response with no outstanding request, dropping"
                );
                return;
            }
        };

        if let Some(error) = rejection {
            warn!(request_id = id, "malformed reply: {}", error);
            self.fail(id, ClientError::Wire(error.into()));
            return;
        }

        let error_status = message.status().map_or(false, |s| !s.is_success());
        if message.is_terminal() || error_status {
            if let Some((_, pending)) = self.pending.remove(&id) {
                pending.complete(message);
            }
            return;
        }

        if let Some(mut pending) = self.pending.get_mut(&id) {
            if message.is_response() {
                pending.provisional = Some(message);
            } else {
                pending.interim.push(message);
            }
        }
    }
}

/// MRCPv2 client connection
pub struct MrcpClient {
    shared: Arc<Shared>,
    requests: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

impl MrcpClient {
    /// Start a client over an established stream. Events that match no
    /// outstanding request are forwarded to `events`, if given.
    pub fn connect<S>(
        stream: S,
        config: ClientConfig,
        headers: Arc<HeaderRegistry>,
        events: Option<mpsc::UnboundedSender<Message>>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::new(Shared {
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        });
        let (requests, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_io(stream, shared.clone(), rx, config, headers, events));

        Self {
            shared,
            requests,
            task,
        }
    }

    /// Connect over TCP
    pub async fn connect_tcp(
        addr: SocketAddr,
        config: ClientConfig,
        headers: Arc<HeaderRegistry>,
        events: Option<mpsc::UnboundedSender<Message>>,
    ) -> Result<Self, std::io::Error> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to MRCPv2 server at {}", addr);
        Ok(Self::connect(stream, config, headers, events))
    }

    /// Send a request and wait for its terminal message.
    ///
    /// The builder's request id is used when set; otherwise the next free
    /// connection-scoped id is allocated.
    pub async fn send_request(&self, builder: MessageBuilder) -> Result<Invocation, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        let (reply, rx) = oneshot::channel();
        let channel = builder.get_channel().cloned();
        let id = match builder.get_request_id() {
            Some(id) => {
                self.shared.claim(id, channel, reply)?;
                id
            }
            None => self.shared.allocate(channel, reply),
        };

        let request = match builder.request_id(id).build() {
            Ok(request) => request,
            Err(e) => {
                self.shared.pending.remove(&id);
                return Err(e.into());
            }
        };
        debug!(request_id = id, method = ?request.method(), "sending request");

        if self.requests.send(request).is_err() {
            self.shared.pending.remove(&id);
            return Err(ClientError::Closed);
        }

        rx.await.unwrap_or(Err(ClientError::Closed))
    }

    /// Fail every outstanding request on `channel` with `Cancelled`.
    /// Returns how many were cancelled.
    pub fn cancel_channel(&self, channel: &ChannelIdentifier) -> usize {
        let ids: Vec<RequestId> = self
            .shared
            .pending
            .iter()
            .filter(|e| e.value().channel.as_ref() == Some(channel))
            .map(|e| *e.key())
            .collect();

        let mut cancelled = 0;
        for id in ids {
            if let Some((_, pending)) = self.shared.pending.remove(&id) {
                pending.fail(ClientError::Cancelled);
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!(%channel, cancelled, "cancelled outstanding requests");
        }
        cancelled
    }

    /// Number of requests awaiting a terminal message
    pub fn outstanding(&self) -> usize {
        self.shared.pending.len()
    }

    /// Whether the connection has shut down
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Close the connection, failing every outstanding request
    pub async fn close(self) {
        self.shared.shutdown.notify_one();
        let _ = self.task.await;
    }
}

async fn run_io<S>(
    stream: S,
    shared: Arc<Shared>,
    mut requests: mpsc::UnboundedReceiver<Message>,
    config: ClientConfig,
    headers: Arc<HeaderRegistry>,
    events: Option<mpsc::UnboundedSender<Message>>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let encoder = MessageEncoder::new(headers.clone()).with_max_message_size(config.max_message_size);
    let mut decoder = FrameDecoder::new(headers).with_max_message_size(config.max_message_size);
    let mut read_buf = BytesMut::with_capacity(config.read_buffer_size);
    let mut write_buf = BytesMut::new();

    loop {
        tokio::select! {
            biased;

            _ = shared.shutdown.notified() => {
                debug!("client closing");
                break;
            }

            request = requests.recv() => {
                let request = match request {
                    Some(request) => request,
                    None => break,
                };
                let id = request.request_id.unwrap_or_default();
                write_buf.clear();
                if let Err(e) = encoder.encode(&request, &mut write_buf) {
                    warn!(request_id = id, "failed to encode request: {}", e);
                    shared.fail(id, ClientError::Wire(e));
                    continue;
                }
                if let Err(e) = writer.write_all(&write_buf).await {
                    warn!("write failed: {}", e);
                    break;
                }
            }

            read = reader.read_buf(&mut read_buf) => {
                match read {
                    Ok(0) => {
                        info!("server closed the connection");
                        break;
                    }
                    Ok(n) => {
                        trace!(bytes = n, "read");
                        match decoder.decode_all(&mut read_buf) {
                            Ok(decoded) => {
                                for item in decoded {
                                    shared.dispatch(item, &events);
                                }
                            }
                            Err(e) => {
                                warn!("framing error from server: {}", e);
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("read failed: {}", e);
                        break;
                    }
                }
            }
        }
    }

    // Requests queued after this point are refused at send time; anything
    // already registered is failed below.
    shared.closed.store(true, Ordering::Release);
    requests.close();
    let failed = shared.fail_all();
    if failed > 0 {
        debug!(failed, "failed outstanding requests on close");
    }
    let _ = writer.shutdown().await;
}
