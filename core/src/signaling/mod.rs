//! Signaling message layer
//!
//! Inbound messages are validated and routed by [`SignalingMessageRouter`];
//! outbound descriptions and candidates leave through a
//! [`SignalingDelegate`]. The [`wire`] module maps both to the JSON
//! envelope carried by the transport.

pub mod message;
pub mod outbound;
pub mod router;
pub mod wire;

pub use message::{Inbound, SignalingMessage};
pub use outbound::{ChannelDelegate, OutboundSignal, SignalingDelegate};
pub use router::{DispatchOutcome, RouterStats, SignalingMessageRouter};
pub use wire::{decode_message, CandidatePayload, SdpPayload, WireError, WireMessage};
