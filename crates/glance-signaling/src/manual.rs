//! In-process payload exchange.
//!
//! Stands in for the human who pastes tokens between two windows: each
//! side publishes into its own mailbox and waits on the peer's. Used
//! by tests and by same-process demos.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::{SignalError, SignalingChannel};

/// Builds connected pairs of [`ManualChannel`]s.
pub struct ManualExchange;

impl ManualExchange {
    /// A cross-wired channel pair: what one side publishes, the other
    /// receives.
    pub fn pair() -> (ManualChannel, ManualChannel) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            ManualChannel {
                outbox: a_tx,
                inbox: Arc::new(Mutex::new(b_rx)),
            },
            ManualChannel {
                outbox: b_tx,
                inbox: Arc::new(Mutex::new(a_rx)),
            },
        )
    }
}

/// One side of a manual exchange.
pub struct ManualChannel {
    outbox: mpsc::UnboundedSender<String>,
    inbox: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

#[async_trait]
impl SignalingChannel for ManualChannel {
    async fn publish(&self, payload: &str) -> Result<(), SignalError> {
        self.outbox
            .send(payload.to_string())
            .map_err(|_| SignalError::Closed)
    }

    async fn wait_for_peer(&self, timeout: Duration) -> Result<String, SignalError> {
        let mut inbox = self.inbox.lock().await;
        match tokio::time::timeout(timeout, inbox.recv()).await {
            Ok(Some(payload)) => Ok(payload),
            Ok(None) => Err(SignalError::Closed),
            Err(_) => Err(SignalError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_crosses_payloads() {
        let (host, viewer) = ManualExchange::pair();
        host.publish("offer-token").await.expect("publish");
        let got = viewer
            .wait_for_peer(Duration::from_secs(1))
            .await
            .expect("receive");
        assert_eq!(got, "offer-token");

        viewer.publish("answer-token").await.expect("publish");
        let got = host
            .wait_for_peer(Duration::from_secs(1))
            .await
            .expect("receive");
        assert_eq!(got, "answer-token");
    }

    #[tokio::test]
    async fn test_wait_times_out_without_peer() {
        let (host, _viewer) = ManualExchange::pair();
        let err = host.wait_for_peer(Duration::from_millis(50)).await;
        assert!(matches!(err, Err(SignalError::Timeout)));
    }

    #[tokio::test]
    async fn test_dropped_peer_closes_channel() {
        let (host, viewer) = ManualExchange::pair();
        drop(viewer);
        assert!(matches!(
            host.publish("x").await,
            Err(SignalError::Closed)
        ));
    }
}
