//! Value types shared by every signaling component.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    PrAnswer,
    Answer,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::PrAnswer => write!(f, "pranswer"),
            SdpType::Answer => write!(f, "answer"),
        }
    }
}

/// An immutable SDP blob tagged with its kind.
///
/// Descriptions come from the engine's create operations or from a parsed
/// inbound message. The SDP text itself is opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    kind: SdpType,
    sdp: String,
}

impl SessionDescription {
    pub fn new(kind: SdpType, sdp: impl Into<String>) -> Self {
        Self {
            kind,
            sdp: sdp.into(),
        }
    }

    pub fn kind(&self) -> SdpType {
        self.kind
    }

    pub fn sdp(&self) -> &str {
        &self.sdp
    }
}

/// A trickled ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    sdp_m_line_index: u32,
    candidate: String,
}

impl IceCandidate {
    pub fn new(sdp_mid: Option<String>, sdp_m_line_index: u32, candidate: impl Into<String>) -> Self {
        Self {
            sdp_mid,
            sdp_m_line_index,
            candidate: candidate.into(),
        }
    }

    pub fn sdp_mid(&self) -> Option<&str> {
        self.sdp_mid.as_deref()
    }

    pub fn sdp_m_line_index(&self) -> u32 {
        self.sdp_m_line_index
    }

    pub fn candidate(&self) -> &str {
        &self.candidate
    }
}

impl fmt::Display for IceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (mid={}, mline={})",
            self.candidate,
            self.sdp_mid.as_deref().unwrap_or("-"),
            self.sdp_m_line_index
        )
    }
}

/// Which side of the connection is expected to start negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Initiator,
    Responder,
}

impl Default for Role {
    fn default() -> Self {
        Role::Responder
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "initiator" => Ok(Role::Initiator),
            "responder" => Ok(Role::Responder),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// ICE gathering progress as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatheringState {
    New,
    Gathering,
    Complete,
}

impl fmt::Display for GatheringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatheringState::New => write!(f, "new"),
            GatheringState::Gathering => write!(f, "gathering"),
            GatheringState::Complete => write!(f, "complete"),
        }
    }
}

/// Aggregate connection state. Observed for monitoring only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerConnectionState::New => write!(f, "new"),
            PeerConnectionState::Connecting => write!(f, "connecting"),
            PeerConnectionState::Connected => write!(f, "connected"),
            PeerConnectionState::Disconnected => write!(f, "disconnected"),
            PeerConnectionState::Failed => write!(f, "failed"),
            PeerConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// ICE transport state. Observed for monitoring only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IceConnectionState::New => write!(f, "new"),
            IceConnectionState::Checking => write!(f, "checking"),
            IceConnectionState::Connected => write!(f, "connected"),
            IceConnectionState::Completed => write!(f, "completed"),
            IceConnectionState::Failed => write!(f, "failed"),
            IceConnectionState::Disconnected => write!(f, "disconnected"),
            IceConnectionState::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_json_shape() {
        let desc = SessionDescription::new(SdpType::Offer, "v=0\r\n");
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["type"], "offer");
        assert_eq!(json["sdp"], "v=0\r\n");
    }

    #[test]
    fn test_candidate_json_uses_browser_field_names() {
        let cand = IceCandidate::new(Some("0".into()), 0, "candidate:1 1 udp 1 10.0.0.1 5000 typ host");
        let json = serde_json::to_value(&cand).unwrap();
        assert_eq!(json["sdpMid"], "0");
        assert_eq!(json["sdpMLineIndex"], 0);
        assert!(json["candidate"].as_str().unwrap().starts_with("candidate:"));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Initiator".parse::<Role>().unwrap(), Role::Initiator);
        assert_eq!(" responder ".parse::<Role>().unwrap(), Role::Responder);
        assert!("observer".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::Responder);
    }

    #[test]
    fn test_gathering_state_ordering() {
        assert!(GatheringState::New < GatheringState::Gathering);
        assert!(GatheringState::Gathering < GatheringState::Complete);
    }
}
