// RTCSignal Core: JSEP signaling orchestration
//
// Drives offer/answer negotiation and trickle ICE for a single peer
// connection. The media engine and the signaling transport are external;
// this crate only decides what to ask the engine for, and in which order.

pub mod config;
pub mod engine;
pub mod ice;
pub mod negotiation;
pub mod peer;
pub mod session;
pub mod signaling;

use thiserror::Error;

pub use config::{
    AnswerOptions, BundlePolicy, IceServer, IceTransportPolicy, OfferOptions,
    RenegotiationPolicy, RtcConfiguration, RtcpMuxPolicy, SessionConfig,
};
pub use engine::{
    EngineError, EngineEvent, EngineEvents, EngineFactory, EngineOp, MediaEngine, SimulatedEngine,
    SimulatedEngineFactory,
};
pub use ice::{CandidateDisposition, IceTrickleCoordinator};
pub use negotiation::NegotiationController;
pub use peer::PeerConnectionManager;
pub use session::{
    GatheringState, IceCandidate, IceConnectionState, PeerConnectionSession,
    PeerConnectionState, Role, SdpType, SessionDescription, SessionDescriptionStore,
    SessionSnapshot, SignalingAction, SignalingState, SignalingStateMachine,
};
pub use signaling::{
    ChannelDelegate, DispatchOutcome, OutboundSignal, RouterStats, SignalingDelegate,
    SignalingMessage, SignalingMessageRouter, WireError, WireMessage,
};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Every failure a signaling operation can report.
///
/// Errors are local to the operation that raised them. None of them closes
/// the session; only [`NegotiationController::close`] does that.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalingError {
    /// The requested action is not legal in the current signaling state.
    /// A `Closed` session reports this for every operation.
    #[error("Invalid state transition: {action} in state {state}")]
    InvalidStateTransition {
        state: SignalingState,
        action: String,
    },
    /// A conflicting operation is already outstanding on the same slot.
    #[error("Negotiation in progress")]
    NegotiationInProgress,
    #[error("Offer creation failed: {0}")]
    OfferCreationFailed(String),
    #[error("Answer creation failed: {0}")]
    AnswerCreationFailed(String),
    #[error("Set local description failed: {0}")]
    SetLocalDescriptionFailed(String),
    #[error("Set remote description failed: {0}")]
    SetRemoteDescriptionFailed(String),
    #[error("ICE candidate rejected: {0}")]
    IceCandidateRejected(String),
    #[error("Malformed signaling message: {0}")]
    MalformedSignalingMessage(String),
    /// The engine factory could not create a peer connection.
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl SignalingError {
    pub(crate) fn invalid(state: SignalingState, action: impl Into<String>) -> Self {
        SignalingError::InvalidStateTransition {
            state,
            action: action.into(),
        }
    }

    /// True for errors the engine reported, as opposed to errors raised by
    /// the state machine or the message layer.
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            SignalingError::OfferCreationFailed(_)
                | SignalingError::AnswerCreationFailed(_)
                | SignalingError::SetLocalDescriptionFailed(_)
                | SignalingError::SetRemoteDescriptionFailed(_)
                | SignalingError::IceCandidateRejected(_)
        )
    }
}

// ============================================================================
// LOGGING
// ============================================================================

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive`. Safe to call more than once.
pub fn init_logging(default_directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_failure_classification() {
        assert!(SignalingError::OfferCreationFailed("x".into()).is_engine_failure());
        assert!(SignalingError::IceCandidateRejected("x".into()).is_engine_failure());
        assert!(!SignalingError::NegotiationInProgress.is_engine_failure());
        assert!(!SignalingError::MalformedSignalingMessage("x".into()).is_engine_failure());
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = SignalingError::invalid(SignalingState::HaveLocalOffer, "set-remote-offer");
        assert_eq!(
            err.to_string(),
            "Invalid state transition: set-remote-offer in state have-local-offer"
        );
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging("warn");
        init_logging("debug");
    }
}
