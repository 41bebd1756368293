//! Trickle ICE

pub mod trickle;

pub use trickle::{CandidateDisposition, IceTrickleCoordinator};
