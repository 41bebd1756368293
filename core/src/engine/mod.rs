//! Media engine capability surface
//!
//! The engine owns ICE, DTLS and codecs. Signaling only ever talks to it
//! through [`MediaEngine`], and only hears back from it through the
//! [`EngineEvent`] stream returned alongside the engine by an
//! [`EngineFactory`].

pub mod simulated;

pub use simulated::{EngineOp, SimulatedEngine, SimulatedEngineFactory};

use crate::config::{AnswerOptions, OfferOptions, RtcConfiguration};
use crate::session::{
    GatheringState, IceCandidate, IceConnectionState, PeerConnectionState, SessionDescription,
    SignalingState,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure reported by the engine. Carries the engine's reason text verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct EngineError {
    reason: String,
}

impl EngineError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn into_reason(self) -> String {
        self.reason
    }
}

/// Asynchronous operations of one engine-side peer connection.
///
/// Each call completes exactly once, with success or failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription, EngineError>;
    async fn create_answer(&self, options: AnswerOptions) -> Result<SessionDescription, EngineError>;
    async fn set_local_description(&self, description: SessionDescription) -> Result<(), EngineError>;
    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), EngineError>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError>;
    /// Release engine resources. Events may still be in flight afterwards.
    fn close(&self);
}

/// Everything the engine reports outside of an operation's own result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A local candidate was gathered and should be trickled
    LocalCandidate(IceCandidate),
    /// Candidates the engine no longer uses
    CandidatesRemoved(Vec<IceCandidate>),
    /// Gathering failed for one server; not fatal to the session
    CandidateError { url: String, error_code: u16, error_text: String },
    GatheringStateChanged(GatheringState),
    /// Engine-side view of the signaling state. Logged only; the session's
    /// own state machine is driven by operation results.
    SignalingStateChanged(SignalingState),
    ConnectionStateChanged(PeerConnectionState),
    IceConnectionStateChanged(IceConnectionState),
    IceConnectionReceivingChanged(bool),
    /// The remote peer opened a data channel
    DataChannel { label: String },
    /// Local media or channels changed and a new offer/answer round is needed
    RenegotiationNeeded,
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::LocalCandidate(c) => write!(f, "LocalCandidate({})", c),
            EngineEvent::CandidatesRemoved(c) => write!(f, "CandidatesRemoved({})", c.len()),
            EngineEvent::CandidateError { url, error_code, .. } => {
                write!(f, "CandidateError {{ url: {}, code: {} }}", url, error_code)
            }
            EngineEvent::GatheringStateChanged(s) => write!(f, "GatheringStateChanged({})", s),
            EngineEvent::SignalingStateChanged(s) => write!(f, "SignalingStateChanged({})", s),
            EngineEvent::ConnectionStateChanged(s) => write!(f, "ConnectionStateChanged({})", s),
            EngineEvent::IceConnectionStateChanged(s) => {
                write!(f, "IceConnectionStateChanged({})", s)
            }
            EngineEvent::IceConnectionReceivingChanged(r) => {
                write!(f, "IceConnectionReceivingChanged({})", r)
            }
            EngineEvent::DataChannel { label } => write!(f, "DataChannel({})", label),
            EngineEvent::RenegotiationNeeded => write!(f, "RenegotiationNeeded"),
        }
    }
}

pub type EngineEvents = mpsc::UnboundedReceiver<EngineEvent>;

/// Creates engine-side peer connections. Constructed once per process and
/// passed explicitly to every session.
pub trait EngineFactory: Send + Sync {
    fn create_peer_connection(
        &self,
        config: &RtcConfiguration,
    ) -> Result<(Arc<dyn MediaEngine>, EngineEvents), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_keeps_reason_verbatim() {
        let err = EngineError::new("network error");
        assert_eq!(err.to_string(), "network error");
        assert_eq!(err.reason(), "network error");
        assert_eq!(err.into_reason(), "network error");
    }

    #[test]
    fn test_event_display() {
        let event = EngineEvent::GatheringStateChanged(GatheringState::Complete);
        assert_eq!(event.to_string(), "GatheringStateChanged(complete)");
        assert_eq!(EngineEvent::RenegotiationNeeded.to_string(), "RenegotiationNeeded");
    }
}
