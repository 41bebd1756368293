//! Negotiation controller
//!
//! Orchestrates the engine's asynchronous operations against the signaling
//! state machine. An action is validated before the engine is asked to do
//! anything and committed only after the engine reports success, so an
//! engine failure never moves the state machine.
//!
//! Local operations (create offer/answer, set local description) and the
//! remote operation (set remote description) each own a slot; a second
//! operation on a busy slot fails with `NegotiationInProgress`. Operations
//! on different slots may overlap only when their transitions commit
//! cleanly in either order; the later one is refused before it reaches the
//! engine.

use crate::config::{OfferOptions, SessionConfig};
use crate::engine::{EngineEvent, MediaEngine};
use crate::ice::IceTrickleCoordinator;
use crate::session::{
    Role, SdpType, SessionDescription, SessionSnapshot, SharedSession, SignalingAction,
    SignalingState, SignalingStateMachine, Slot, SlotGuard,
};
use crate::signaling::SignalingDelegate;
use crate::SignalingError;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct NegotiationController {
    session: SharedSession,
    engine: Arc<dyn MediaEngine>,
    trickle: Arc<IceTrickleCoordinator>,
    delegate: Arc<dyn SignalingDelegate>,
    config: SessionConfig,
}

impl NegotiationController {
    pub fn new(
        session: SharedSession,
        engine: Arc<dyn MediaEngine>,
        trickle: Arc<IceTrickleCoordinator>,
        delegate: Arc<dyn SignalingDelegate>,
        config: SessionConfig,
    ) -> Self {
        Self {
            session,
            engine,
            trickle,
            delegate,
            config,
        }
    }

    pub fn role(&self) -> Role {
        self.session.lock().role()
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.session.lock().signaling_state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().snapshot()
    }

    pub fn trickle(&self) -> &Arc<IceTrickleCoordinator> {
        &self.trickle
    }

    /// Create an offer with the configured options and apply it locally.
    /// Legal in `Stable`, or in `HaveLocalOffer` to replace an unanswered
    /// offer.
    pub async fn create_offer(&self) -> Result<SessionDescription, SignalingError> {
        self.create_offer_with(self.config.offer).await
    }

    /// As [`create_offer`](Self::create_offer) with explicit options, e.g.
    /// to request an ICE restart.
    pub async fn create_offer_with(
        &self,
        options: OfferOptions,
    ) -> Result<SessionDescription, SignalingError> {
        let _slot = SlotGuard::acquire(
            &self.session,
            Slot::Local,
            SignalingAction::SetLocalOffer,
            |state| match state {
                SignalingState::Stable | SignalingState::HaveLocalOffer => Ok(()),
                SignalingState::Closed => {
                    Err(SignalingError::invalid(SignalingState::Closed, "create-offer"))
                }
                _ => Err(SignalingError::NegotiationInProgress),
            },
        )?;

        info!("Creating offer (ice_restart={})", options.ice_restart);
        let result = self.engine.create_offer(options).await;
        self.ensure_open("create-offer")?;
        let offer = result.map_err(|e| {
            warn!("Offer creation failed: {}", e);
            SignalingError::OfferCreationFailed(e.into_reason())
        })?;

        self.apply_local(offer.clone()).await?;
        Ok(offer)
    }

    /// Create an answer to the pending remote offer and apply it locally
    pub async fn create_answer(&self) -> Result<SessionDescription, SignalingError> {
        let slot = self.claim_answer_slot()?;
        self.answer_in_slot(slot).await
    }

    fn claim_answer_slot(&self) -> Result<SlotGuard, SignalingError> {
        SlotGuard::acquire(
            &self.session,
            Slot::Local,
            SignalingAction::SetLocalAnswer,
            |state| match state {
                SignalingState::HaveRemoteOffer => Ok(()),
                state => Err(SignalingError::invalid(state, "create-answer")),
            },
        )
    }

    async fn answer_in_slot(&self, _slot: SlotGuard) -> Result<SessionDescription, SignalingError> {
        info!("Creating answer");
        let result = self.engine.create_answer(self.config.answer).await;
        self.ensure_open("create-answer")?;
        let answer = result.map_err(|e| {
            warn!("Answer creation failed: {}", e);
            SignalingError::AnswerCreationFailed(e.into_reason())
        })?;

        self.apply_local(answer.clone()).await?;
        Ok(answer)
    }

    /// Apply a local description produced elsewhere
    pub async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), SignalingError> {
        let action = SignalingAction::local(description.kind());
        let _slot = SlotGuard::acquire(&self.session, Slot::Local, action, legal(action))?;
        self.apply_local(description).await
    }

    /// Apply a description received from the peer. Buffered early
    /// candidates are flushed before this returns. A remote offer is
    /// answered automatically and the answer returned; the local slot for
    /// that answer is claimed before the remote slot is released.
    pub async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<Option<SessionDescription>, SignalingError> {
        let action = SignalingAction::remote(description.kind());
        let answer_slot = {
            let _slot = SlotGuard::acquire(&self.session, Slot::Remote, action, legal(action))?;

            let result = self.engine.set_remote_description(description.clone()).await;
            self.ensure_open(&action.to_string())?;
            result.map_err(|e| {
                warn!("Remote {} rejected by engine: {}", description.kind(), e);
                SignalingError::SetRemoteDescriptionFailed(e.into_reason())
            })?;

            let next = self.session.lock().commit_remote(description.clone())?;
            info!("Applied remote {}; signaling state {}", description.kind(), next);

            for error in self.trickle.flush_early_candidates().await {
                self.report(error);
            }

            match description.kind() {
                SdpType::Offer => Some(self.claim_answer_slot()?),
                _ => None,
            }
        };

        match answer_slot {
            Some(slot) => self.answer_in_slot(slot).await.map(Some),
            None => Ok(None),
        }
    }

    /// React to the engine asking for a new offer/answer round. Returns the
    /// new offer, or `None` when the policy leaves re-offering to the peer.
    pub async fn on_renegotiation_needed(&self) -> Result<Option<SessionDescription>, SignalingError> {
        let (role, state) = {
            let session = self.session.lock();
            (session.role(), session.signaling_state())
        };
        if state == SignalingState::Closed {
            debug!("Renegotiation requested after close; ignoring");
            return Ok(None);
        }
        if !self.config.renegotiation.allows_offer(role) {
            info!("Renegotiation needed; {} waits for the remote offer", role);
            return Ok(None);
        }
        info!("Renegotiation needed; re-offering");
        self.create_offer().await.map(Some)
    }

    /// Single entry point for everything the engine reports
    pub async fn handle_engine_event(&self, event: EngineEvent) {
        debug!("Engine event: {}", event);
        match event {
            EngineEvent::LocalCandidate(candidate) => {
                self.trickle.on_local_candidate_discovered(candidate)
            }
            EngineEvent::CandidatesRemoved(candidates) => {
                debug!("Engine removed {} candidates", candidates.len())
            }
            EngineEvent::CandidateError {
                url,
                error_code,
                error_text,
            } => warn!("ICE candidate error on {}: {} {}", url, error_code, error_text),
            EngineEvent::GatheringStateChanged(state) => {
                self.trickle.on_gathering_state_changed(state);
            }
            EngineEvent::SignalingStateChanged(state) => {
                debug!("Engine reports signaling state {}", state)
            }
            EngineEvent::ConnectionStateChanged(state) => {
                let mut session = self.session.lock();
                if !session.is_closed() {
                    session.set_connection_state(state);
                    info!("Peer connection state: {}", state);
                }
            }
            EngineEvent::IceConnectionStateChanged(state) => {
                let mut session = self.session.lock();
                if !session.is_closed() {
                    session.set_ice_connection_state(state);
                    info!("ICE connection state: {}", state);
                }
            }
            EngineEvent::IceConnectionReceivingChanged(receiving) => {
                debug!("ICE receiving: {}", receiving)
            }
            EngineEvent::DataChannel { label } => info!("Remote opened data channel '{}'", label),
            EngineEvent::RenegotiationNeeded => {
                if let Err(e) = self.on_renegotiation_needed().await {
                    self.report(e);
                }
            }
        }
    }

    /// Close the session. Descriptions and buffered candidates are dropped
    /// and the engine is released; a second close is rejected.
    pub fn close(&self) -> Result<(), SignalingError> {
        let id = {
            let mut session = self.session.lock();
            session.close()?;
            session.id().to_string()
        };
        self.engine.close();
        info!("Session {} closed", id);
        Ok(())
    }

    /// Validate, hand to the engine, then commit and announce. The caller
    /// holds the local slot.
    async fn apply_local(&self, description: SessionDescription) -> Result<(), SignalingError> {
        let action = SignalingAction::local(description.kind());
        self.session.lock().check(action)?;

        let result = self.engine.set_local_description(description.clone()).await;
        self.ensure_open(&action.to_string())?;
        result.map_err(|e| {
            warn!("Local {} rejected by engine: {}", description.kind(), e);
            SignalingError::SetLocalDescriptionFailed(e.into_reason())
        })?;

        let next = self.session.lock().commit_local(description.clone())?;
        info!("Applied local {}; signaling state {}", description.kind(), next);
        self.delegate.on_local_description(&description);
        Ok(())
    }

    /// Completions arriving after close are discarded
    fn ensure_open(&self, action: &str) -> Result<(), SignalingError> {
        if self.session.lock().is_closed() {
            debug!("Discarding {} completion after close", action);
            return Err(SignalingError::invalid(SignalingState::Closed, action));
        }
        Ok(())
    }

    fn report(&self, error: SignalingError) {
        warn!("{}", error);
        self.delegate.on_error(&error);
    }
}

fn legal(action: SignalingAction) -> impl Fn(SignalingState) -> Result<(), SignalingError> {
    move |state| SignalingStateMachine::transition(state, action).map(|_| ())
}
