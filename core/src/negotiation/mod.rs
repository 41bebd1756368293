//! Offer/answer negotiation

pub mod controller;

pub use controller::NegotiationController;
