//! Outbound side of signaling: what the session hands to the application

use crate::session::{IceCandidate, SessionDescription};
use crate::SignalingError;
use std::fmt;
use tokio::sync::mpsc;
use tracing::warn;

/// Receives everything the session wants sent to the remote peer, plus
/// failures on paths nobody awaits. Called outside the session lock; must
/// not block.
pub trait SignalingDelegate: Send + Sync {
    /// A local description was applied and should be sent to the peer
    fn on_local_description(&self, description: &SessionDescription);

    /// A local candidate was gathered and should be trickled to the peer
    fn on_local_candidate(&self, candidate: &IceCandidate);

    /// A failure on an engine-driven path (renegotiation, candidate flush,
    /// inbound message stream)
    fn on_error(&self, error: &SignalingError) {
        warn!("Unhandled signaling error: {}", error);
    }
}

/// One outbound notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundSignal {
    Description(SessionDescription),
    Candidate(IceCandidate),
    Error(SignalingError),
}

impl fmt::Display for OutboundSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundSignal::Description(d) => write!(f, "Description({})", d.kind()),
            OutboundSignal::Candidate(c) => write!(f, "Candidate({})", c),
            OutboundSignal::Error(e) => write!(f, "Error({})", e),
        }
    }
}

/// Delegate that forwards every notification into an unbounded channel.
/// Sends after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelDelegate {
    tx: mpsc::UnboundedSender<OutboundSignal>,
}

impl ChannelDelegate {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, signal: OutboundSignal) {
        let _ = self.tx.send(signal);
    }
}

impl SignalingDelegate for ChannelDelegate {
    fn on_local_description(&self, description: &SessionDescription) {
        self.send(OutboundSignal::Description(description.clone()));
    }

    fn on_local_candidate(&self, candidate: &IceCandidate) {
        self.send(OutboundSignal::Candidate(candidate.clone()));
    }

    fn on_error(&self, error: &SignalingError) {
        self.send(OutboundSignal::Error(error.clone()));
    }
}
