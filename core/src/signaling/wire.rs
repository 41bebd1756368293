//! JSON envelope exchanged over the signaling transport
//!
//! ```json
//! {"type":"offer","from":"alice","to":"bob","data":{"sdp":"v=0..."}}
//! {"type":"ice-candidate","from":"alice","to":"bob",
//!  "data":{"sdpMid":"0","sdpMLineIndex":0,"candidate":"candidate:..."}}
//! ```
//!
//! Payload fields are optional at the serde level so that a missing field
//! is reported by name instead of as a generic decode failure.

use super::message::SignalingMessage;
use super::outbound::OutboundSignal;
use crate::session::{IceCandidate, SdpType, SessionDescription};
use crate::SignalingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Invalid JSON: {0}")]
    Decode(String),
    #[error("Encoding failed: {0}")]
    Encode(String),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("No wire representation for {0}")]
    Unsupported(String),
}

impl From<WireError> for SignalingError {
    fn from(e: WireError) -> Self {
        SignalingError::MalformedSignalingMessage(e.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
}

/// One signaling envelope. `from`/`to` are opaque peer identifiers used by
/// the transport; the session itself only looks at `from` of an offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireMessage {
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default)]
        data: SdpPayload,
    },
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default)]
        data: SdpPayload,
    },
    IceCandidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default)]
        data: CandidatePayload,
    },
}

impl WireMessage {
    pub fn decode(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(|e| WireError::Decode(e.to_string()))
    }

    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(|e| WireError::Encode(e.to_string()))
    }

    /// Envelope for a local description. Provisional answers have no wire
    /// representation.
    pub fn from_description(
        description: &SessionDescription,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<Self, WireError> {
        let data = SdpPayload {
            sdp: Some(description.sdp().to_string()),
        };
        match description.kind() {
            SdpType::Offer => Ok(WireMessage::Offer { from, to, data }),
            SdpType::Answer => Ok(WireMessage::Answer { from, to, data }),
            SdpType::PrAnswer => Err(WireError::Unsupported(SdpType::PrAnswer.to_string())),
        }
    }

    pub fn from_candidate(candidate: &IceCandidate, from: Option<String>, to: Option<String>) -> Self {
        WireMessage::IceCandidate {
            from,
            to,
            data: CandidatePayload {
                sdp_mid: candidate.sdp_mid().map(str::to_string),
                sdp_m_line_index: Some(i64::from(candidate.sdp_m_line_index())),
                candidate: Some(candidate.candidate().to_string()),
            },
        }
    }

    /// Envelope for an outbound signal; errors stay local and yield `None`.
    pub fn from_outbound(
        signal: &OutboundSignal,
        from: Option<String>,
        to: Option<String>,
    ) -> Option<Result<Self, WireError>> {
        match signal {
            OutboundSignal::Description(d) => Some(Self::from_description(d, from, to)),
            OutboundSignal::Candidate(c) => Some(Ok(Self::from_candidate(c, from, to))),
            OutboundSignal::Error(_) => None,
        }
    }

    pub fn from_peer(&self) -> Option<&str> {
        match self {
            WireMessage::Offer { from, .. }
            | WireMessage::Answer { from, .. }
            | WireMessage::IceCandidate { from, .. } => from.as_deref(),
        }
    }

    pub fn to_peer(&self) -> Option<&str> {
        match self {
            WireMessage::Offer { to, .. }
            | WireMessage::Answer { to, .. }
            | WireMessage::IceCandidate { to, .. } => to.as_deref(),
        }
    }
}

impl TryFrom<WireMessage> for SignalingMessage {
    type Error = WireError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        match wire {
            WireMessage::Offer { from, data, .. } => Ok(SignalingMessage::Offer {
                sdp: data.sdp.ok_or(WireError::MissingField("sdp"))?,
                sender: from,
            }),
            WireMessage::Answer { data, .. } => Ok(SignalingMessage::Answer {
                sdp: data.sdp.ok_or(WireError::MissingField("sdp"))?,
            }),
            WireMessage::IceCandidate { data, .. } => Ok(SignalingMessage::Candidate {
                sdp_mid: data.sdp_mid,
                sdp_m_line_index: data
                    .sdp_m_line_index
                    .ok_or(WireError::MissingField("sdpMLineIndex"))?,
                candidate: data.candidate.ok_or(WireError::MissingField("candidate"))?,
            }),
        }
    }
}

/// Decode a JSON envelope straight into a [`SignalingMessage`]
pub fn decode_message(text: &str) -> Result<SignalingMessage, WireError> {
    SignalingMessage::try_from(WireMessage::decode(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_offer_envelope() {
        let text = r#"{"type":"offer","from":"alice","to":"bob","data":{"sdp":"v=0\r\n"}}"#;
        let wire = WireMessage::decode(text).unwrap();
        assert_eq!(wire.from_peer(), Some("alice"));
        assert_eq!(wire.to_peer(), Some("bob"));

        let msg = SignalingMessage::try_from(wire).unwrap();
        assert_eq!(
            msg,
            SignalingMessage::Offer {
                sdp: "v=0\r\n".into(),
                sender: Some("alice".into())
            }
        );
    }

    #[test]
    fn test_decode_candidate_envelope() {
        let text = r#"{"type":"ice-candidate","data":{"sdpMid":"0","sdpMLineIndex":0,"candidate":"candidate:1 1 udp 1 192.0.2.1 5000 typ host"}}"#;
        match decode_message(text).unwrap() {
            SignalingMessage::Candidate {
                sdp_mid,
                sdp_m_line_index,
                ..
            } => {
                assert_eq!(sdp_mid.as_deref(), Some("0"));
                assert_eq!(sdp_m_line_index, 0);
            }
            _ => panic!("Expected a candidate"),
        }
    }

    #[test]
    fn test_missing_field_is_named() {
        let text = r#"{"type":"ice-candidate","data":{"sdpMid":"0","candidate":"candidate:1"}}"#;
        assert_eq!(
            decode_message(text).unwrap_err(),
            WireError::MissingField("sdpMLineIndex")
        );

        let text = r#"{"type":"answer"}"#;
        assert_eq!(decode_message(text).unwrap_err(), WireError::MissingField("sdp"));
    }

    #[test]
    fn test_unknown_type_fails_decode() {
        let err = WireMessage::decode(r#"{"type":"bye"}"#).unwrap_err();
        assert!(matches!(err, WireError::Decode(_)));

        let err: SignalingError = WireMessage::decode("not json").unwrap_err().into();
        assert!(matches!(err, SignalingError::MalformedSignalingMessage(_)));
    }

    #[test]
    fn test_encode_candidate_uses_camel_case() {
        let cand = IceCandidate::new(Some("0".into()), 2, "candidate:1 1 udp 1 192.0.2.1 5000 typ host");
        let json = WireMessage::from_candidate(&cand, Some("alice".into()), None)
            .encode()
            .unwrap();
        assert!(json.contains(r#""type":"ice-candidate""#));
        assert!(json.contains(r#""sdpMLineIndex":2"#));
        assert!(!json.contains("\"to\""));
    }

    #[test]
    fn test_pranswer_has_no_wire_form() {
        let desc = SessionDescription::new(SdpType::PrAnswer, "v=0\r\n");
        assert!(matches!(
            WireMessage::from_description(&desc, None, None),
            Err(WireError::Unsupported(_))
        ));
    }

    #[test]
    fn test_errors_are_not_sent() {
        let signal = OutboundSignal::Error(SignalingError::NegotiationInProgress);
        assert!(WireMessage::from_outbound(&signal, None, None).is_none());
    }
}
