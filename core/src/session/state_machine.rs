//! JSEP signaling state machine
//!
//! Pure transition table. Callers validate an action before starting an
//! engine operation and commit it only once the engine reports success.

use super::types::SdpType;
use crate::SignalingError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSEP signaling state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPrAnswer,
    HaveRemotePrAnswer,
    Closed,
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalingState::Stable => write!(f, "stable"),
            SignalingState::HaveLocalOffer => write!(f, "have-local-offer"),
            SignalingState::HaveRemoteOffer => write!(f, "have-remote-offer"),
            SignalingState::HaveLocalPrAnswer => write!(f, "have-local-pranswer"),
            SignalingState::HaveRemotePrAnswer => write!(f, "have-remote-pranswer"),
            SignalingState::Closed => write!(f, "closed"),
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalingAction {
    SetLocalOffer,
    SetLocalAnswer,
    SetLocalPrAnswer,
    SetRemoteOffer,
    SetRemoteAnswer,
    SetRemotePrAnswer,
    Close,
}

impl SignalingAction {
    /// Action for applying a local description of the given kind
    pub fn local(kind: SdpType) -> Self {
        match kind {
            SdpType::Offer => SignalingAction::SetLocalOffer,
            SdpType::Answer => SignalingAction::SetLocalAnswer,
            SdpType::PrAnswer => SignalingAction::SetLocalPrAnswer,
        }
    }

    /// Action for applying a remote description of the given kind
    pub fn remote(kind: SdpType) -> Self {
        match kind {
            SdpType::Offer => SignalingAction::SetRemoteOffer,
            SdpType::Answer => SignalingAction::SetRemoteAnswer,
            SdpType::PrAnswer => SignalingAction::SetRemotePrAnswer,
        }
    }
}

impl fmt::Display for SignalingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalingAction::SetLocalOffer => write!(f, "set-local-offer"),
            SignalingAction::SetLocalAnswer => write!(f, "set-local-answer"),
            SignalingAction::SetLocalPrAnswer => write!(f, "set-local-pranswer"),
            SignalingAction::SetRemoteOffer => write!(f, "set-remote-offer"),
            SignalingAction::SetRemoteAnswer => write!(f, "set-remote-answer"),
            SignalingAction::SetRemotePrAnswer => write!(f, "set-remote-pranswer"),
            SignalingAction::Close => write!(f, "close"),
        }
    }
}

/// Holds the current signaling state and applies legal transitions
#[derive(Debug, Clone)]
pub struct SignalingStateMachine {
    state: SignalingState,
}

impl SignalingStateMachine {
    pub fn new() -> Self {
        Self {
            state: SignalingState::Stable,
        }
    }

    pub fn state(&self) -> SignalingState {
        self.state
    }

    /// The transition table. Returns the next state or
    /// `InvalidStateTransition`; never mutates anything.
    pub fn transition(
        current: SignalingState,
        action: SignalingAction,
    ) -> Result<SignalingState, SignalingError> {
        use SignalingAction::*;
        use SignalingState::*;

        let next = match (current, action) {
            (Closed, _) => None,
            (_, Close) => Some(Closed),
            (Stable, SetLocalOffer) => Some(HaveLocalOffer),
            (Stable, SetRemoteOffer) => Some(HaveRemoteOffer),
            // Re-offer while our previous offer is still unanswered.
            (HaveLocalOffer, SetLocalOffer) => Some(HaveLocalOffer),
            (HaveLocalOffer, SetRemoteAnswer) => Some(Stable),
            (HaveLocalOffer, SetRemotePrAnswer) => Some(HaveRemotePrAnswer),
            (HaveRemoteOffer, SetLocalAnswer) => Some(Stable),
            (HaveRemoteOffer, SetLocalPrAnswer) => Some(HaveLocalPrAnswer),
            (HaveLocalPrAnswer, SetLocalAnswer) => Some(Stable),
            (HaveRemotePrAnswer, SetRemoteAnswer) => Some(Stable),
            _ => None,
        };

        next.ok_or_else(|| SignalingError::invalid(current, action.to_string()))
    }

    /// Validate `action` against the current state without applying it
    pub fn check(&self, action: SignalingAction) -> Result<SignalingState, SignalingError> {
        Self::transition(self.state, action)
    }

    /// Apply `action`; on rejection the state is left untouched
    pub fn apply(&mut self, action: SignalingAction) -> Result<SignalingState, SignalingError> {
        let next = Self::transition(self.state, action)?;
        self.state = next;
        Ok(next)
    }

    pub fn is_closed(&self) -> bool {
        self.state == SignalingState::Closed
    }
}

impl Default for SignalingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_STATES: [SignalingState; 6] = [
        SignalingState::Stable,
        SignalingState::HaveLocalOffer,
        SignalingState::HaveRemoteOffer,
        SignalingState::HaveLocalPrAnswer,
        SignalingState::HaveRemotePrAnswer,
        SignalingState::Closed,
    ];

    const ALL_ACTIONS: [SignalingAction; 7] = [
        SignalingAction::SetLocalOffer,
        SignalingAction::SetLocalAnswer,
        SignalingAction::SetLocalPrAnswer,
        SignalingAction::SetRemoteOffer,
        SignalingAction::SetRemoteAnswer,
        SignalingAction::SetRemotePrAnswer,
        SignalingAction::Close,
    ];

    #[test]
    fn test_offerer_round() {
        let mut sm = SignalingStateMachine::new();
        assert_eq!(sm.apply(SignalingAction::SetLocalOffer).unwrap(), SignalingState::HaveLocalOffer);
        assert_eq!(sm.apply(SignalingAction::SetRemoteAnswer).unwrap(), SignalingState::Stable);
    }

    #[test]
    fn test_answerer_round_with_provisional_answer() {
        let mut sm = SignalingStateMachine::new();
        sm.apply(SignalingAction::SetRemoteOffer).unwrap();
        assert_eq!(
            sm.apply(SignalingAction::SetLocalPrAnswer).unwrap(),
            SignalingState::HaveLocalPrAnswer
        );
        assert_eq!(sm.apply(SignalingAction::SetLocalAnswer).unwrap(), SignalingState::Stable);
    }

    #[test]
    fn test_remote_provisional_answer() {
        let mut sm = SignalingStateMachine::new();
        sm.apply(SignalingAction::SetLocalOffer).unwrap();
        sm.apply(SignalingAction::SetRemotePrAnswer).unwrap();
        assert_eq!(sm.state(), SignalingState::HaveRemotePrAnswer);
        assert!(sm.apply(SignalingAction::SetLocalAnswer).is_err());
        assert_eq!(sm.apply(SignalingAction::SetRemoteAnswer).unwrap(), SignalingState::Stable);
    }

    #[test]
    fn test_glare_is_rejected() {
        let mut sm = SignalingStateMachine::new();
        sm.apply(SignalingAction::SetLocalOffer).unwrap();

        let err = sm.apply(SignalingAction::SetRemoteOffer).unwrap_err();
        assert!(matches!(
            err,
            SignalingError::InvalidStateTransition {
                state: SignalingState::HaveLocalOffer,
                ..
            }
        ));
        assert_eq!(sm.state(), SignalingState::HaveLocalOffer);
    }

    #[test]
    fn test_reoffer_keeps_local_offer_state() {
        let mut sm = SignalingStateMachine::new();
        sm.apply(SignalingAction::SetLocalOffer).unwrap();
        assert_eq!(sm.apply(SignalingAction::SetLocalOffer).unwrap(), SignalingState::HaveLocalOffer);
    }

    #[test]
    fn test_close_from_every_open_state() {
        for state in ALL_STATES.iter().copied().filter(|s| *s != SignalingState::Closed) {
            assert_eq!(
                SignalingStateMachine::transition(state, SignalingAction::Close).unwrap(),
                SignalingState::Closed
            );
        }
    }

    #[test]
    fn test_closed_rejects_everything_with_same_error() {
        for action in ALL_ACTIONS {
            let err = SignalingStateMachine::transition(SignalingState::Closed, action).unwrap_err();
            match err {
                SignalingError::InvalidStateTransition { state, .. } => {
                    assert_eq!(state, SignalingState::Closed)
                }
                other => panic!("Wrong error type: {other:?}"),
            }
        }
    }

    #[test]
    fn test_check_does_not_mutate() {
        let sm = SignalingStateMachine::new();
        assert_eq!(sm.check(SignalingAction::SetLocalOffer).unwrap(), SignalingState::HaveLocalOffer);
        assert_eq!(sm.state(), SignalingState::Stable);
    }

    fn arb_action() -> impl Strategy<Value = SignalingAction> {
        (0..ALL_ACTIONS.len()).prop_map(|i| ALL_ACTIONS[i])
    }

    proptest! {
        #[test]
        fn prop_rejected_actions_leave_state_unchanged(actions in prop::collection::vec(arb_action(), 0..40)) {
            let mut sm = SignalingStateMachine::new();
            for action in actions {
                let before = sm.state();
                match sm.apply(action) {
                    Ok(next) => prop_assert_eq!(next, sm.state()),
                    Err(_) => prop_assert_eq!(before, sm.state()),
                }
            }
        }

        #[test]
        fn prop_closed_is_absorbing(actions in prop::collection::vec(arb_action(), 0..40)) {
            let mut sm = SignalingStateMachine::new();
            let mut closed = false;
            for action in actions {
                let _ = sm.apply(action);
                if closed {
                    prop_assert_eq!(sm.state(), SignalingState::Closed);
                }
                closed = sm.is_closed();
            }
        }
    }
}
