//! Duplex frame channel
//!
//! Abstract bidirectional message transport used by the streaming and
//! terminal-bridge operations. The API layer builds one side from a
//! WebSocket; tests build in-memory pairs. The core never sees the wire
//! protocol.

use tokio::sync::mpsc;

use crate::error::{DockhandError, Result};

/// One message on a duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload (command output, error frames).
    Text(String),
    /// Raw bytes (terminal output, terminal input).
    Binary(Vec<u8>),
    /// Keep-alive probe; a failed ping send means the subscriber is gone.
    Ping,
}

impl Frame {
    /// Payload bytes of the frame, for writing into a PTY.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Self::Text(s) => s.into_bytes(),
            Self::Binary(b) => b,
            Self::Ping => Vec::new(),
        }
    }
}

/// Structured error frame payload: valid JSON `{"err":"<message>"}`.
///
/// The upstream wire protocol used a malformed shape here; this crate emits
/// proper JSON so clients can parse it strictly.
#[must_use]
pub fn error_frame(message: &str) -> Frame {
    Frame::Text(serde_json::json!({ "err": message }).to_string())
}

/// Sending half of a duplex channel.
///
/// Cloneable so concurrent pump tasks can share it. The channel is closed
/// exactly once: when the last sink clone is dropped.
#[derive(Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<Frame>,
}

impl FrameSink {
    /// Send one frame; fails when the subscriber side is gone.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::SubscriberGone`] if the receiving side has
    /// been dropped.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| DockhandError::SubscriberGone)
    }

    /// Blocking variant for pump threads that are not async.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::SubscriberGone`] if the receiving side has
    /// been dropped.
    pub fn blocking_send(&self, frame: Frame) -> Result<()> {
        self.tx
            .blocking_send(frame)
            .map_err(|_| DockhandError::SubscriberGone)
    }

    /// Send a structured error frame, ignoring delivery failure.
    /// Used on terminal paths where the subscriber may already be gone.
    pub async fn send_error(&self, message: &str) {
        let _ = self.send(error_frame(message)).await;
    }
}

/// Receiving half of a duplex channel.
pub struct FrameSource {
    rx: mpsc::Receiver<Frame>,
}

impl FrameSource {
    /// Receive the next inbound frame; `None` when the channel is closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Blocking variant for pump threads that are not async.
    pub fn blocking_recv(&mut self) -> Option<Frame> {
        self.rx.blocking_recv()
    }
}

/// A duplex frame channel: one inbound source, one outbound sink.
pub struct DuplexChannel {
    source: FrameSource,
    sink: FrameSink,
}

impl DuplexChannel {
    /// Build a channel from raw mpsc halves (used by the WebSocket adapter).
    #[must_use]
    pub fn from_halves(rx: mpsc::Receiver<Frame>, tx: mpsc::Sender<Frame>) -> Self {
        Self {
            source: FrameSource { rx },
            sink: FrameSink { tx },
        }
    }

    /// Create a connected in-memory pair, one channel per endpoint.
    /// Frames sent on one side arrive on the other.
    #[must_use]
    pub fn pair(buffer: usize) -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(buffer);
        let (b_tx, b_rx) = mpsc::channel(buffer);
        (
            Self::from_halves(a_rx, b_tx),
            Self::from_halves(b_rx, a_tx),
        )
    }

    /// Split into independent halves for concurrent pump tasks.
    #[must_use]
    pub fn split(self) -> (FrameSource, FrameSink) {
        (self.source, self.sink)
    }

    /// Receive the next inbound frame; `None` when the channel is closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.source.recv().await
    }

    /// Send one frame to the subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::SubscriberGone`] if the receiving side has
    /// been dropped.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.sink.send(frame).await
    }

    /// Cloneable sending half.
    #[must_use]
    pub fn sink(&self) -> FrameSink {
        self.sink.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============== Error Frame Format ==============

    #[test]
    fn test_error_frame_is_valid_json() {
        let Frame::Text(payload) = error_frame("dial tcp: connection refused") else {
            panic!("error frame must be a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["err"], "dial tcp: connection refused");
    }

    #[test]
    fn test_error_frame_escapes_quotes() {
        let Frame::Text(payload) = error_frame(r#"bad "quoted" reason"#) else {
            panic!("error frame must be a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["err"], r#"bad "quoted" reason"#);
    }

    // ============== Frame Payloads ==============

    #[test]
    fn test_frame_into_payload() {
        assert_eq!(Frame::Text("hi".to_string()).into_payload(), b"hi".to_vec());
        assert_eq!(Frame::Binary(vec![1, 2]).into_payload(), vec![1, 2]);
        assert!(Frame::Ping.into_payload().is_empty());
    }

    // ============== Pair Semantics ==============

    #[tokio::test]
    async fn test_pair_round_trip() {
        let (a, mut b) = DuplexChannel::pair(4);
        a.send(Frame::Text("hello".to_string())).await.unwrap();
        assert_eq!(b.recv().await, Some(Frame::Text("hello".to_string())));

        b.send(Frame::Binary(vec![0xff])).await.unwrap();
        let mut a = a;
        assert_eq!(a.recv().await, Some(Frame::Binary(vec![0xff])));
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped_is_subscriber_gone() {
        let (a, b) = DuplexChannel::pair(1);
        drop(b);
        let err = a.send(Frame::Ping).await.unwrap_err();
        assert!(matches!(err, DockhandError::SubscriberGone));
    }

    #[tokio::test]
    async fn test_recv_after_peer_dropped_returns_none() {
        let (mut a, b) = DuplexChannel::pair(1);
        drop(b);
        assert_eq!(a.recv().await, None);
    }

    #[tokio::test]
    async fn test_split_halves_work_independently() {
        let (a, mut b) = DuplexChannel::pair(4);
        let (mut source, sink) = a.split();

        b.send(Frame::Text("inbound".to_string())).await.unwrap();
        assert_eq!(source.recv().await, Some(Frame::Text("inbound".to_string())));

        sink.send(Frame::Ping).await.unwrap();
        assert_eq!(b.recv().await, Some(Frame::Ping));
    }

    #[tokio::test]
    async fn test_channel_closes_when_last_sink_dropped() {
        let (a, mut b) = DuplexChannel::pair(4);
        let sink = a.sink();
        drop(a);
        // One clone still alive: not closed yet.
        sink.send(Frame::Ping).await.unwrap();
        assert_eq!(b.recv().await, Some(Frame::Ping));
        drop(sink);
        assert_eq!(b.recv().await, None);
    }
}
