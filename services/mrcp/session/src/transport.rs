//! TCP transport for MRCPv2 sessions.

use crate::handler::HandlerRegistry;
use crate::session::{Session, SessionConfig, SessionHandle};
use mrcp_wire::HeaderRegistry;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Create a TCP listener bound to the given address
pub async fn listen_tcp(addr: SocketAddr) -> tokio::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Connect to a TCP address
pub async fn connect_tcp(addr: SocketAddr) -> tokio::io::Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Accept connections until `shutdown` resolves, running one [`Session`]
/// per connection. Live sessions are asked to shut down on the way out.
pub async fn serve<F>(
    listener: TcpListener,
    config: SessionConfig,
    headers: Arc<HeaderRegistry>,
    handlers: Arc<HandlerRegistry>,
    shutdown: F,
) -> tokio::io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut sessions: Vec<(SessionHandle, JoinHandle<()>)> = Vec::new();
    info!("Accepting MRCPv2 connections on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Listener shutting down");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                }

                let session = Session::new(config.clone(), headers.clone(), handlers.clone())
                    .with_label(peer.to_string());
                let handle = session.handle();
                let task = tokio::spawn(async move {
                    match session.run(stream).await {
                        Ok(stats) => debug!("Session with {} finished: {:?}", peer, stats),
                        Err(e) => warn!("Session with {} failed: {}", peer, e),
                    }
                });

                sessions.retain(|(_, task)| !task.is_finished());
                sessions.push((handle, task));
                info!("Accepted connection from {} ({} active)", peer, sessions.len());
            }
        }
    }

    for (handle, _) in &sessions {
        handle.shutdown();
    }
    for (_, task) in sessions {
        let _ = task.await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use mrcp_wire::{
        ChannelIdentifier, FrameDecoder, MessageBuilder, MessageEncoder, MethodName, ResourceType,
        StatusCode,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_serve_over_tcp() {
        let listener = listen_tcp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let headers = Arc::new(HeaderRegistry::standard());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(
            listener,
            SessionConfig::default(),
            headers.clone(),
            Arc::new(HandlerRegistry::new()),
            async move {
                let _ = stop_rx.await;
            },
        ));

        let mut stream = connect_tcp(addr).await.unwrap();
        let channel = ChannelIdentifier::new("tcp1", ResourceType::SpeechRecog).unwrap();
        let request = MessageBuilder::request(MethodName::Recognize)
            .request_id(1)
            .channel(channel)
            .build()
            .unwrap();
        let bytes = MessageEncoder::new(headers.clone()).encode_to_bytes(&request).unwrap();
        stream.write_all(&bytes).await.unwrap();

        let mut decoder = FrameDecoder::new(headers);
        let mut buf = BytesMut::new();
        let response = loop {
            if let Some(decoded) = decoder.decode(&mut buf).unwrap() {
                break decoded.message().clone();
            }
            assert!(stream.read_buf(&mut buf).await.unwrap() > 0);
        };
        // nothing registered for speechrecog
        assert_eq!(response.status(), Some(StatusCode::ResourceNotAllocated));

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
