//! Peer connection session, the aggregate every component mutates
//!
//! All mutable signaling state for one peer connection lives in a single
//! [`PeerConnectionSession`] behind one mutex. The lock is held for a state
//! mutation only, never across an engine call.

pub mod state_machine;
pub mod store;
pub mod types;

pub use state_machine::{SignalingAction, SignalingState, SignalingStateMachine};
pub use store::SessionDescriptionStore;
pub use types::{
    GatheringState, IceCandidate, IceConnectionState, PeerConnectionState, Role, SdpType,
    SessionDescription,
};

use crate::SignalingError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

pub type SharedSession = Arc<Mutex<PeerConnectionSession>>;

/// Independent negotiation sequences. One operation per slot at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Local,
    Remote,
}

impl Slot {
    fn other(self) -> Slot {
        match self {
            Slot::Local => Slot::Remote,
            Slot::Remote => Slot::Local,
        }
    }
}

/// Occupancy of one slot. `intent` is the transition the running
/// operation will commit; it is cleared once committed.
#[derive(Debug, Default, Clone, Copy)]
struct SlotState {
    busy: bool,
    intent: Option<SignalingAction>,
}

/// Signaling state of a single peer connection
#[derive(Debug)]
pub struct PeerConnectionSession {
    id: String,
    role: Role,
    machine: SignalingStateMachine,
    descriptions: SessionDescriptionStore,
    gathering_state: GatheringState,
    connection_state: PeerConnectionState,
    ice_connection_state: IceConnectionState,
    /// Remote candidates received before any remote description existed,
    /// or while such a backlog is being flushed. Arrival order.
    early_remote_candidates: VecDeque<IceCandidate>,
    flushing: bool,
    local_slot: SlotState,
    remote_slot: SlotState,
}

impl PeerConnectionSession {
    pub fn new(role: Role) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            machine: SignalingStateMachine::new(),
            descriptions: SessionDescriptionStore::new(),
            gathering_state: GatheringState::New,
            connection_state: PeerConnectionState::New,
            ice_connection_state: IceConnectionState::New,
            early_remote_candidates: VecDeque::new(),
            flushing: false,
            local_slot: SlotState::default(),
            remote_slot: SlotState::default(),
        }
    }

    pub fn shared(role: Role) -> SharedSession {
        Arc::new(Mutex::new(Self::new(role)))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.machine.state()
    }

    pub fn is_closed(&self) -> bool {
        self.machine.is_closed()
    }

    pub fn descriptions(&self) -> &SessionDescriptionStore {
        &self.descriptions
    }

    pub fn gathering_state(&self) -> GatheringState {
        self.gathering_state
    }

    pub fn connection_state(&self) -> PeerConnectionState {
        self.connection_state
    }

    pub fn ice_connection_state(&self) -> IceConnectionState {
        self.ice_connection_state
    }

    pub fn early_remote_candidates(&self) -> impl Iterator<Item = &IceCandidate> {
        self.early_remote_candidates.iter()
    }

    /// Whether a remote description (pending or current) has been applied
    pub fn has_remote_description(&self) -> bool {
        self.descriptions.remote_description().is_some()
    }

    /// Validate an action against the current state without applying it
    pub fn check(&self, action: SignalingAction) -> Result<SignalingState, SignalingError> {
        self.machine.check(action)
    }

    /// Commit a local description the engine has accepted.
    pub(crate) fn commit_local(
        &mut self,
        description: SessionDescription,
    ) -> Result<SignalingState, SignalingError> {
        let next = self.machine.apply(SignalingAction::local(description.kind()))?;
        self.local_slot.intent = None;
        self.descriptions.set_pending_local(description);
        if next == SignalingState::Stable {
            self.promote();
        }
        Ok(next)
    }

    /// Commit a remote description the engine has accepted. Buffered early
    /// candidates switch into flushing mode in the same critical section, so
    /// nothing that arrives afterwards can overtake them.
    pub(crate) fn commit_remote(
        &mut self,
        description: SessionDescription,
    ) -> Result<SignalingState, SignalingError> {
        let next = self.machine.apply(SignalingAction::remote(description.kind()))?;
        self.remote_slot.intent = None;
        self.descriptions.set_pending_remote(description);
        if next == SignalingState::Stable {
            self.promote();
        }
        if !self.early_remote_candidates.is_empty() {
            self.flushing = true;
        }
        Ok(next)
    }

    fn promote(&mut self) {
        self.descriptions.promote_local();
        self.descriptions.promote_remote();
        debug!("Session {} descriptions promoted to current", self.id);
    }

    /// Transition to `Closed` and drop everything negotiated so far
    pub(crate) fn close(&mut self) -> Result<(), SignalingError> {
        self.machine.apply(SignalingAction::Close)?;
        self.descriptions.clear();
        self.early_remote_candidates.clear();
        self.flushing = false;
        self.connection_state = PeerConnectionState::Closed;
        self.ice_connection_state = IceConnectionState::Closed;
        Ok(())
    }

    /// Buffer the candidate if it cannot be handed to the engine yet.
    /// Returns the candidate back when it should be forwarded now.
    pub(crate) fn buffer_or_release(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if !self.has_remote_description() || self.flushing {
            self.early_remote_candidates.push_back(candidate);
            None
        } else {
            Some(candidate)
        }
    }

    /// Next buffered candidate to flush; leaves flushing mode once drained.
    pub(crate) fn next_early_candidate(&mut self) -> Option<IceCandidate> {
        if self.is_closed() || !self.has_remote_description() {
            self.flushing = false;
            return None;
        }
        let next = self.early_remote_candidates.pop_front();
        if next.is_none() {
            self.flushing = false;
        }
        next
    }

    pub(crate) fn set_gathering_state(&mut self, state: GatheringState) {
        self.gathering_state = state;
    }

    pub(crate) fn set_connection_state(&mut self, state: PeerConnectionState) {
        self.connection_state = state;
    }

    pub(crate) fn set_ice_connection_state(&mut self, state: IceConnectionState) {
        self.ice_connection_state = state;
    }

    fn slot(&mut self, slot: Slot) -> &mut SlotState {
        match slot {
            Slot::Local => &mut self.local_slot,
            Slot::Remote => &mut self.remote_slot,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            role: self.role,
            signaling_state: self.signaling_state(),
            gathering_state: self.gathering_state,
            connection_state: self.connection_state,
            ice_connection_state: self.ice_connection_state,
            current_local: self.descriptions.current_local().cloned(),
            pending_local: self.descriptions.pending_local().cloned(),
            current_remote: self.descriptions.current_remote().cloned(),
            pending_remote: self.descriptions.pending_remote().cloned(),
            early_remote_candidates: self.early_remote_candidates.iter().cloned().collect(),
        }
    }
}

/// Point-in-time copy of a session's observable fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub role: Role,
    pub signaling_state: SignalingState,
    pub gathering_state: GatheringState,
    pub connection_state: PeerConnectionState,
    pub ice_connection_state: IceConnectionState,
    pub current_local: Option<SessionDescription>,
    pub pending_local: Option<SessionDescription>,
    pub current_remote: Option<SessionDescription>,
    pub pending_remote: Option<SessionDescription>,
    pub early_remote_candidates: Vec<IceCandidate>,
}

/// Marks a slot busy, and reserves the transition it will commit, for the
/// lifetime of the guard.
pub(crate) struct SlotGuard {
    session: SharedSession,
    slot: Slot,
}

impl SlotGuard {
    /// Claim `slot` for an operation that will commit `intent`.
    ///
    /// `precheck` runs against the current state and, when the other slot
    /// has an uncommitted intent, against the state that intent leads to.
    /// Both intents must then commit cleanly in either order, otherwise the
    /// claim fails before any engine call is made.
    pub(crate) fn acquire<F>(
        session: &SharedSession,
        slot: Slot,
        intent: SignalingAction,
        precheck: F,
    ) -> Result<Self, SignalingError>
    where
        F: Fn(SignalingState) -> Result<(), SignalingError>,
    {
        let mut guard = session.lock();
        let current = guard.signaling_state();
        precheck(current)?;
        SignalingStateMachine::transition(current, intent)?;
        if guard.slot(slot).busy {
            return Err(SignalingError::NegotiationInProgress);
        }

        if let Some(other) = guard.slot(slot.other()).intent {
            let projected = SignalingStateMachine::transition(current, other)
                .map_err(|_| SignalingError::NegotiationInProgress)?;
            precheck(projected)?;
            SignalingStateMachine::transition(projected, intent)?;
            SignalingStateMachine::transition(current, intent)
                .and_then(|ours| SignalingStateMachine::transition(ours, other))
                .map_err(|_| SignalingError::NegotiationInProgress)?;
            debug!("Claimed {:?} slot for {} alongside {}", slot, intent, other);
        }

        *guard.slot(slot) = SlotState {
            busy: true,
            intent: Some(intent),
        };
        Ok(Self {
            session: Arc::clone(session),
            slot,
        })
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        *self.session.lock().slot(self.slot) = SlotState::default();
    }
}
