//! Session configuration
//!
//! Everything a peer connection needs before its first negotiation: the
//! signaling role, the renegotiation policy, the ICE servers handed to the
//! engine, and the options passed with each create-offer/create-answer call.

use crate::session::Role;
use serde::{Deserialize, Serialize};

/// Public STUN server used when no ICE servers are configured
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// A STUN or TURN server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// TURN servers must carry credentials; STUN servers must not need them.
    pub fn validate(&self) -> Result<(), String> {
        if self.urls.is_empty() {
            return Err("ICE server has no URLs".to_string());
        }
        for url in &self.urls {
            let is_turn = url.starts_with("turn:") || url.starts_with("turns:");
            if !is_turn && !url.starts_with("stun:") && !url.starts_with("stuns:") {
                return Err(format!("Unsupported ICE server URL: {url}"));
            }
            if is_turn && (self.username.is_none() || self.credential.is_none()) {
                return Err(format!("TURN server {url} requires username and credential"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    Relay,
    #[default]
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundlePolicy {
    #[default]
    Balanced,
    MaxCompat,
    MaxBundle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RtcpMuxPolicy {
    Negotiate,
    #[default]
    Require,
}

/// Configuration handed to the engine factory when the peer connection is
/// created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcConfiguration {
    pub ice_servers: Vec<IceServer>,
    #[serde(default)]
    pub ice_transport_policy: IceTransportPolicy,
    #[serde(default)]
    pub bundle_policy: BundlePolicy,
    #[serde(default)]
    pub rtcp_mux_policy: RtcpMuxPolicy,
}

impl Default for RtcConfiguration {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::stun(DEFAULT_STUN_URL)],
            ice_transport_policy: IceTransportPolicy::default(),
            bundle_policy: BundlePolicy::default(),
            rtcp_mux_policy: RtcpMuxPolicy::default(),
        }
    }
}

/// Options for the engine's create-offer capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferOptions {
    /// Request fresh ICE credentials, restarting gathering
    pub ice_restart: bool,
    pub voice_activity_detection: bool,
}

impl Default for OfferOptions {
    fn default() -> Self {
        Self {
            ice_restart: false,
            voice_activity_detection: true,
        }
    }
}

/// Options for the engine's create-answer capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOptions {
    pub voice_activity_detection: bool,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self {
            voice_activity_detection: true,
        }
    }
}

/// What to do when the engine raises renegotiation-needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenegotiationPolicy {
    /// Re-offer regardless of role. Both peers adding a channel at once will
    /// glare.
    #[default]
    AlwaysOffer,
    /// Only the initiator re-offers; the responder waits for the remote offer.
    InitiatorOnly,
}

impl RenegotiationPolicy {
    pub fn allows_offer(&self, role: Role) -> bool {
        match self {
            RenegotiationPolicy::AlwaysOffer => true,
            RenegotiationPolicy::InitiatorOnly => role == Role::Initiator,
        }
    }
}

/// Full configuration of one signaling session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Fixed for the lifetime of the session
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub renegotiation: RenegotiationPolicy,
    #[serde(default)]
    pub rtc: RtcConfiguration,
    #[serde(default)]
    pub offer: OfferOptions,
    #[serde(default)]
    pub answer: AnswerOptions,
}

impl SessionConfig {
    pub fn initiator() -> Self {
        Self {
            role: Role::Initiator,
            ..Self::default()
        }
    }

    pub fn responder() -> Self {
        Self {
            role: Role::Responder,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for server in &self.rtc.ice_servers {
            server.validate()?;
        }
        if self.rtc.ice_transport_policy == IceTransportPolicy::Relay
            && !self
                .rtc
                .ice_servers
                .iter()
                .flat_map(|s| s.urls.iter())
                .any(|u| u.starts_with("turn"))
        {
            return Err("Relay-only transport policy needs at least one TURN server".to_string());
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
