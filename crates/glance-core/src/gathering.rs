//! Candidate gathering deadline control.
//!
//! After the local description is set, the transport gathers candidates
//! in the background. Waiting for the full set gives the best payload
//! but can stall for many seconds on some networks, so a deadline races
//! completion: whichever fires first, the descriptor captured at that
//! moment ships.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::codec::SessionDescriptor;
use crate::error::EngineError;
use crate::transport::{PeerTransport, TransportEvent};

/// How long to wait for gathering before shipping a partial payload.
pub const DEFAULT_GATHERING_DEADLINE: Duration = Duration::from_secs(3);

/// Outcome of one gathering wait.
#[derive(Debug, Clone)]
pub struct GatheringResult {
    /// Local description snapshot at resolution time.
    pub descriptor: SessionDescriptor,
    /// Whether gathering actually finished before the deadline.
    pub complete: bool,
}

/// Waits for gathering completion with a deadline fallback.
#[derive(Debug, Clone)]
pub struct GatheringCoordinator {
    deadline: Duration,
}

impl GatheringCoordinator {
    pub fn new(deadline: Duration) -> Self {
        GatheringCoordinator { deadline }
    }

    /// Resolve the sendable local description for `transport`.
    ///
    /// Returns as soon as gathering completes, or at the deadline with
    /// whatever candidates accumulated by then. A partial description
    /// is valid; it just may carry fewer connectivity options.
    pub async fn resolve(&self, transport: &dyn PeerTransport) -> Result<GatheringResult, EngineError> {
        let mut events = transport.subscribe();

        // Completion may predate the subscription.
        let complete = if transport.is_gathering_complete().await {
            true
        } else {
            self.wait_for_completion(&mut events).await
        };

        if !complete {
            warn!(
                deadline_ms = self.deadline.as_millis() as u64,
                "candidate gathering deadline hit, shipping partial description"
            );
        }

        let descriptor = transport
            .local_description()
            .await
            .ok_or_else(|| EngineError::transport("no local description after gathering"))?;

        Ok(GatheringResult { descriptor, complete })
    }

    async fn wait_for_completion(
        &self,
        events: &mut tokio::sync::broadcast::Receiver<TransportEvent>,
    ) -> bool {
        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return false,
                event = events.recv() => match event {
                    Ok(TransportEvent::GatheringComplete) => {
                        debug!("candidate gathering complete");
                        return true;
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        // Dropped events may have included the completion
                        // signal; fall through to another recv and let the
                        // deadline bound the wait.
                        debug!(skipped, "gathering event stream lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => return false,
                },
            }
        }
    }
}

impl Default for GatheringCoordinator {
    fn default() -> Self {
        GatheringCoordinator::new(DEFAULT_GATHERING_DEADLINE)
    }
}
