//! Inbound message routing
//!
//! Classifies each message from the peer and hands it to the controller or
//! the trickle coordinator. Message-layer failures are reported, never
//! fatal to the session.

use super::message::{Inbound, SignalingMessage};
use super::outbound::SignalingDelegate;
use super::wire::decode_message;
use crate::ice::{CandidateDisposition, IceTrickleCoordinator};
use crate::negotiation::NegotiationController;
use crate::session::SessionDescription;
use crate::SignalingError;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of routing one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The remote description was applied; `answer` is set when it was an
    /// offer and the answer went out
    RemoteDescriptionApplied { answer: Option<SessionDescription> },
    CandidateApplied,
    CandidateBuffered,
}

/// Counters for one [`SignalingMessageRouter::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub dispatched: usize,
    pub failed: usize,
}

pub struct SignalingMessageRouter {
    controller: Arc<NegotiationController>,
    trickle: Arc<IceTrickleCoordinator>,
    delegate: Arc<dyn SignalingDelegate>,
}

impl SignalingMessageRouter {
    pub fn new(
        controller: Arc<NegotiationController>,
        trickle: Arc<IceTrickleCoordinator>,
        delegate: Arc<dyn SignalingDelegate>,
    ) -> Self {
        Self {
            controller,
            trickle,
            delegate,
        }
    }

    pub async fn dispatch(&self, message: SignalingMessage) -> Result<DispatchOutcome, SignalingError> {
        debug!("Routing inbound {}", message);
        match message.into_inbound()? {
            Inbound::Description(description) => {
                let answer = self.controller.set_remote_description(description).await?;
                Ok(DispatchOutcome::RemoteDescriptionApplied { answer })
            }
            Inbound::Candidate(candidate) => {
                match self.trickle.add_remote_candidate(candidate).await? {
                    CandidateDisposition::Applied => Ok(DispatchOutcome::CandidateApplied),
                    CandidateDisposition::Buffered => Ok(DispatchOutcome::CandidateBuffered),
                }
            }
        }
    }

    /// Decode a JSON envelope, then dispatch it
    pub async fn dispatch_json(&self, text: &str) -> Result<DispatchOutcome, SignalingError> {
        let message = decode_message(text).map_err(|e| {
            warn!("Dropping undecodable signaling message: {}", e);
            SignalingError::from(e)
        })?;
        self.dispatch(message).await
    }

    /// Dispatch every message of `stream` in order until it ends. Each
    /// failure goes to the delegate and processing continues.
    pub async fn run<S>(&self, mut stream: S) -> RouterStats
    where
        S: Stream<Item = SignalingMessage> + Unpin,
    {
        let mut stats = RouterStats::default();
        while let Some(message) = stream.next().await {
            match self.dispatch(message).await {
                Ok(_) => stats.dispatched += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!("Inbound signaling message failed: {}", e);
                    self.delegate.on_error(&e);
                }
            }
        }
        info!(
            "Signaling stream ended: {} dispatched, {} failed",
            stats.dispatched, stats.failed
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::engine::SimulatedEngine;
    use crate::session::{PeerConnectionSession, SdpType, SignalingState};
    use crate::signaling::{ChannelDelegate, OutboundSignal};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn router() -> (
        SignalingMessageRouter,
        Arc<NegotiationController>,
        UnboundedReceiver<OutboundSignal>,
    ) {
        let config = SessionConfig::responder();
        let (engine, _events) = SimulatedEngine::new("router", "192.0.2.7", 0);
        let session = PeerConnectionSession::shared(config.role);
        let (delegate, rx) = ChannelDelegate::new();
        let delegate: Arc<dyn SignalingDelegate> = Arc::new(delegate);
        let trickle = Arc::new(IceTrickleCoordinator::new(
            session.clone(),
            engine.clone(),
            delegate.clone(),
        ));
        let controller = Arc::new(NegotiationController::new(
            session,
            engine,
            trickle.clone(),
            delegate.clone(),
            config,
        ));
        (
            SignalingMessageRouter::new(controller.clone(), trickle, delegate),
            controller,
            rx,
        )
    }

    fn candidate_message(n: u32) -> SignalingMessage {
        SignalingMessage::Candidate {
            sdp_mid: Some("0".into()),
            sdp_m_line_index: 0,
            candidate: format!("candidate:{n} 1 udp 1 203.0.113.{n} 5000 typ host"),
        }
    }

    #[tokio::test]
    async fn test_offer_routes_to_remote_description() {
        let (router, controller, _rx) = router();
        let outcome = router
            .dispatch(SignalingMessage::Offer {
                sdp: "v=0\r\n".into(),
                sender: Some("alice".into()),
            })
            .await
            .unwrap();

        match outcome {
            DispatchOutcome::RemoteDescriptionApplied { answer: Some(a) } => {
                assert_eq!(a.kind(), SdpType::Answer)
            }
            other => panic!("Unexpected outcome: {:?}", other),
        }
        assert_eq!(controller.signaling_state(), SignalingState::Stable);
    }

    #[tokio::test]
    async fn test_candidates_buffer_then_apply() {
        let (router, _controller, _rx) = router();
        assert_eq!(
            router.dispatch(candidate_message(1)).await.unwrap(),
            DispatchOutcome::CandidateBuffered
        );
        router
            .dispatch(SignalingMessage::Offer { sdp: "v=0\r\n".into(), sender: None })
            .await
            .unwrap();
        assert_eq!(
            router.dispatch(candidate_message(2)).await.unwrap(),
            DispatchOutcome::CandidateApplied
        );
    }

    #[tokio::test]
    async fn test_malformed_message_leaves_state() {
        let (router, controller, _rx) = router();
        let result = router
            .dispatch(SignalingMessage::Offer { sdp: String::new(), sender: None })
            .await;
        assert!(matches!(result, Err(SignalingError::MalformedSignalingMessage(_))));
        assert_eq!(controller.signaling_state(), SignalingState::Stable);

        let result = router.dispatch_json("{\"type\":\"offer\"").await;
        assert!(matches!(result, Err(SignalingError::MalformedSignalingMessage(_))));
    }

    #[tokio::test]
    async fn test_dispatch_json_answer_without_offer() {
        let (router, _controller, _rx) = router();
        let result = router
            .dispatch_json(r#"{"type":"answer","data":{"sdp":"v=0\r\n"}}"#)
            .await;
        match result {
            Err(SignalingError::InvalidStateTransition { state, action }) => {
                assert_eq!(state, SignalingState::Stable);
                assert_eq!(action, "set-remote-answer");
            }
            _ => panic!("Wrong error type"),
        }
    }

    #[tokio::test]
    async fn test_run_reports_failures_and_continues() {
        let (router, controller, mut rx) = router();
        let messages = vec![
            candidate_message(1),
            SignalingMessage::Answer { sdp: "bogus".into() },
            SignalingMessage::Offer { sdp: "v=0\r\n".into(), sender: None },
        ];

        let stats = router.run(futures::stream::iter(messages)).await;
        assert_eq!(stats, RouterStats { dispatched: 2, failed: 1 });
        assert_eq!(controller.signaling_state(), SignalingState::Stable);

        match rx.try_recv().unwrap() {
            OutboundSignal::Error(SignalingError::MalformedSignalingMessage(_)) => (),
            other => panic!("Unexpected signal: {}", other),
        }
    }
}
