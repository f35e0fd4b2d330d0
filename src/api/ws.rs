//! WebSocket adapter
//!
//! Binds an upgraded WebSocket to a [`DuplexChannel`] so the fleet layer
//! never sees the wire protocol. Two relay tasks run per socket: one maps
//! inbound messages to frames, one maps outbound frames to messages and
//! closes the socket when the frame side ends.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::channel::{DuplexChannel, Frame};

const RELAY_BUFFER: usize = 32;

/// Wrap a live WebSocket in a duplex frame channel.
///
/// The returned channel closes when the client disconnects; dropping every
/// sink clone of the channel closes the socket.
pub fn bind_socket(socket: WebSocket) -> DuplexChannel {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (in_tx, in_rx) = mpsc::channel(RELAY_BUFFER);
    let (out_tx, mut out_rx) = mpsc::channel::<Frame>(RELAY_BUFFER);

    // Inbound relay: client messages become frames. Ends on disconnect or
    // when the frame side stops listening; dropping `in_tx` signals EOF.
    tokio::spawn(async move {
        while let Some(Ok(message)) = ws_rx.next().await {
            let frame = match message {
                Message::Text(text) => Frame::Text(text.to_string()),
                Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
                // Ping/pong bookkeeping stays inside the socket layer.
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => break,
            };
            if in_tx.send(frame).await.is_err() {
                break;
            }
        }
        debug!("WebSocket inbound relay ended");
    });

    // Outbound relay: frames become client messages. A closed frame side
    // produces a clean WebSocket close.
    tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let message = match frame {
                Frame::Text(text) => Message::Text(text.into()),
                Frame::Binary(bytes) => Message::Binary(bytes.into()),
                Frame::Ping => Message::Ping(Vec::new().into()),
            };
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
        debug!("WebSocket outbound relay ended");
    });

    DuplexChannel::from_halves(in_rx, out_tx)
}
