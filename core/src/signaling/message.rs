//! Inbound signaling messages and their validation

use crate::session::{IceCandidate, SdpType, SessionDescription};
use crate::SignalingError;
use std::fmt;

/// A message received from the remote peer over the signaling transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMessage {
    Offer {
        sdp: String,
        /// Transport-level identity of the offering peer, if known
        sender: Option<String>,
    },
    Answer {
        sdp: String,
    },
    Candidate {
        sdp_mid: Option<String>,
        /// Signed as received; negative values are rejected on validation
        sdp_m_line_index: i64,
        candidate: String,
    },
}

/// A validated inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Description(SessionDescription),
    Candidate(IceCandidate),
}

impl SignalingMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::Candidate { .. } => "candidate",
        }
    }

    /// Validate the payload into a typed description or candidate
    pub fn into_inbound(self) -> Result<Inbound, SignalingError> {
        match self {
            SignalingMessage::Offer { sdp, .. } => {
                validate_sdp(&sdp)?;
                Ok(Inbound::Description(SessionDescription::new(SdpType::Offer, sdp)))
            }
            SignalingMessage::Answer { sdp } => {
                validate_sdp(&sdp)?;
                Ok(Inbound::Description(SessionDescription::new(SdpType::Answer, sdp)))
            }
            SignalingMessage::Candidate {
                sdp_mid,
                sdp_m_line_index,
                candidate,
            } => {
                if candidate.trim().is_empty() {
                    return Err(malformed("candidate attribute is empty"));
                }
                let index = u32::try_from(sdp_m_line_index).map_err(|_| {
                    malformed(format!("sdpMLineIndex out of range: {}", sdp_m_line_index))
                })?;
                if matches!(sdp_mid.as_deref(), Some("")) {
                    return Err(malformed("sdpMid is empty"));
                }
                Ok(Inbound::Candidate(IceCandidate::new(sdp_mid, index, candidate)))
            }
        }
    }
}

impl fmt::Display for SignalingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalingMessage::Offer { sender: Some(s), .. } => write!(f, "offer from {}", s),
            SignalingMessage::Offer { sender: None, .. } => write!(f, "offer"),
            SignalingMessage::Answer { .. } => write!(f, "answer"),
            SignalingMessage::Candidate {
                sdp_mid,
                sdp_m_line_index,
                ..
            } => write!(
                f,
                "candidate (mid={}, index={})",
                sdp_mid.as_deref().unwrap_or("-"),
                sdp_m_line_index
            ),
        }
    }
}

fn malformed(details: impl Into<String>) -> SignalingError {
    SignalingError::MalformedSignalingMessage(details.into())
}

/// SDP must at least open with a version line
fn validate_sdp(sdp: &str) -> Result<(), SignalingError> {
    if sdp.trim().is_empty() {
        return Err(malformed("SDP is empty"));
    }
    if !sdp.trim_start().starts_with("v=") {
        return Err(malformed("SDP does not start with a version line"));
    }
    Ok(())
}
