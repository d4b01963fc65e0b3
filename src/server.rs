use crate::bridge::BridgeHandle;
use crate::error::Result;
use crate::router::ClientRequest;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Bind the subscriber listener
pub async fn bind(addr: impl ToSocketAddrs) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening for subscribers on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept WebSocket subscribers until the listener fails
pub async fn serve(listener: TcpListener, bridge: BridgeHandle) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let bridge = bridge.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, bridge).await {
                tracing::debug!("Subscriber {} ended: {}", peer, e);
            }
        });
    }
}

/// Run one subscriber session
///
/// Snapshots flow out through a forwarding task while inbound text frames are
/// handed to the bridge as requests.
async fn handle_connection(stream: TcpStream, peer: SocketAddr, bridge: BridgeHandle) -> Result<()> {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::info!("Rejected non-WebSocket request from {}: {}", peer, e);
            return Ok(());
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let mut subscription = bridge.subscribe().await?;
    let id = subscription.id();
    tracing::debug!("Subscriber {} connected from {}", id, peer);

    let forward = tokio::spawn(async move {
        while let Ok(json) = subscription.recv().await {
            if let Err(e) = write.send(Message::Text(json)).await {
                tracing::debug!("Failed to send snapshot: {}", e);
                break;
            }
        }
    });

    while let Some(msg_result) = read.next().await {
        match msg_result {
            Ok(Message::Text(text)) => bridge.submit(ClientRequest::Text(text))?,
            Ok(Message::Binary(data)) => bridge.submit(ClientRequest::Binary(data))?,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!("WebSocket error from {}: {}", peer, e);
                break;
            }
            _ => {}
        }
    }

    forward.abort();
    bridge.unsubscribe(id)?;
    Ok(())
}
