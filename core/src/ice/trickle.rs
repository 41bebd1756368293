//! Trickle ICE coordination
//!
//! Local candidates go straight out to the delegate. Remote candidates are
//! held back until a remote description exists, then drained into the
//! engine in arrival order. While that backlog drains, new arrivals queue
//! behind it rather than overtaking it.

use crate::engine::MediaEngine;
use crate::session::{GatheringState, IceCandidate, SharedSession, SignalingState};
use crate::signaling::SignalingDelegate;
use crate::SignalingError;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to a remote candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    /// Handed to the engine and accepted
    Applied,
    /// Held until the remote description is applied
    Buffered,
}

pub struct IceTrickleCoordinator {
    session: SharedSession,
    engine: Arc<dyn MediaEngine>,
    delegate: Arc<dyn SignalingDelegate>,
}

impl IceTrickleCoordinator {
    pub fn new(
        session: SharedSession,
        engine: Arc<dyn MediaEngine>,
        delegate: Arc<dyn SignalingDelegate>,
    ) -> Self {
        Self {
            session,
            engine,
            delegate,
        }
    }

    /// Forward a freshly gathered local candidate to the peer
    pub fn on_local_candidate_discovered(&self, candidate: IceCandidate) {
        if self.session.lock().is_closed() {
            debug!("Dropping local candidate gathered after close: {}", candidate);
            return;
        }
        debug!("Trickling local candidate {}", candidate);
        self.delegate.on_local_candidate(&candidate);
    }

    /// Apply a candidate received from the peer, or buffer it when no remote
    /// description exists yet.
    pub async fn add_remote_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<CandidateDisposition, SignalingError> {
        let released = {
            let mut session = self.session.lock();
            if session.is_closed() {
                return Err(SignalingError::invalid(
                    SignalingState::Closed,
                    "add-ice-candidate",
                ));
            }
            session.buffer_or_release(candidate)
        };

        match released {
            Some(candidate) => {
                self.apply(candidate).await?;
                Ok(CandidateDisposition::Applied)
            }
            None => {
                debug!("Buffered early remote candidate");
                Ok(CandidateDisposition::Buffered)
            }
        }
    }

    /// Drain buffered candidates into the engine. A rejected candidate does
    /// not stop the drain; rejections are returned in order.
    pub async fn flush_early_candidates(&self) -> Vec<SignalingError> {
        let mut errors = Vec::new();
        let mut applied = 0usize;
        loop {
            let next = self.session.lock().next_early_candidate();
            let Some(candidate) = next else { break };
            match self.apply(candidate).await {
                Ok(()) => applied += 1,
                Err(e) => errors.push(e),
            }
        }
        if applied > 0 || !errors.is_empty() {
            info!(
                "Flushed early candidates: {} applied, {} rejected",
                applied,
                errors.len()
            );
        }
        errors
    }

    /// Record the engine's gathering state. Only forward progress is
    /// accepted, except a restart once gathering has completed. Returns
    /// whether the state changed.
    pub fn on_gathering_state_changed(&self, state: GatheringState) -> bool {
        let mut session = self.session.lock();
        if session.is_closed() {
            return false;
        }
        let current = session.gathering_state();
        let accepted = state > current || (current == GatheringState::Complete && state < current);
        if accepted {
            session.set_gathering_state(state);
            info!("ICE gathering {} -> {}", current, state);
        } else if state != current {
            debug!("Ignoring gathering regression {} -> {}", current, state);
        }
        accepted
    }

    pub fn gathering_state(&self) -> GatheringState {
        self.session.lock().gathering_state()
    }

    /// Candidates still waiting for a remote description, in arrival order
    pub fn early_remote_candidates(&self) -> Vec<IceCandidate> {
        self.session.lock().early_remote_candidates().cloned().collect()
    }

    async fn apply(&self, candidate: IceCandidate) -> Result<(), SignalingError> {
        self.engine
            .add_ice_candidate(candidate)
            .await
            .map_err(|e| {
                warn!("Engine rejected remote candidate: {}", e);
                SignalingError::IceCandidateRejected(e.into_reason())
            })
    }
}
