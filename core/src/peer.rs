// PeerConnectionManager: one peer connection, fully wired
//
// Creates the engine through the factory, builds the session, controller,
// trickle coordinator and router around it, and pumps the engine's event
// stream into the controller.

use crate::config::SessionConfig;
use crate::engine::{EngineEvents, EngineFactory, MediaEngine};
use crate::ice::{CandidateDisposition, IceTrickleCoordinator};
use crate::negotiation::NegotiationController;
use crate::session::{
    IceCandidate, PeerConnectionSession, Role, SessionDescription, SessionSnapshot,
    SharedSession, SignalingState,
};
use crate::signaling::{DispatchOutcome, SignalingDelegate, SignalingMessage, SignalingMessageRouter};
use crate::SignalingError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct PeerConnectionManager {
    session: SharedSession,
    controller: Arc<NegotiationController>,
    trickle: Arc<IceTrickleCoordinator>,
    router: Arc<SignalingMessageRouter>,
    /// Present until the event loop takes ownership of the stream
    events: Mutex<Option<EngineEvents>>,
}

impl PeerConnectionManager {
    pub fn new(
        factory: &dyn EngineFactory,
        config: SessionConfig,
        delegate: Arc<dyn SignalingDelegate>,
    ) -> Result<Self, SignalingError> {
        config
            .validate()
            .map_err(SignalingError::InvalidConfiguration)?;

        let (engine, events): (Arc<dyn MediaEngine>, EngineEvents) = factory
            .create_peer_connection(&config.rtc)
            .map_err(|e| SignalingError::EngineUnavailable(e.into_reason()))?;

        let session = PeerConnectionSession::shared(config.role);
        let trickle = Arc::new(IceTrickleCoordinator::new(
            Arc::clone(&session),
            Arc::clone(&engine),
            Arc::clone(&delegate),
        ));
        let controller = Arc::new(NegotiationController::new(
            Arc::clone(&session),
            engine,
            Arc::clone(&trickle),
            Arc::clone(&delegate),
            config,
        ));
        let router = Arc::new(SignalingMessageRouter::new(
            Arc::clone(&controller),
            Arc::clone(&trickle),
            delegate,
        ));

        {
            let s = session.lock();
            info!("Peer connection {} created as {}", s.id(), s.role());
        }

        Ok(Self {
            session,
            controller,
            trickle,
            router,
            events: Mutex::new(Some(events)),
        })
    }

    // ------------------------------------------------------------------------
    // ENGINE EVENTS
    // ------------------------------------------------------------------------

    /// Hand the engine event stream to a background task. Returns `None` if
    /// the stream was already taken.
    pub fn spawn_event_loop(&self) -> Option<JoinHandle<()>> {
        let mut events = self.events.lock().take()?;
        let controller = Arc::clone(&self.controller);
        let id = self.id();
        Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                controller.handle_engine_event(event).await;
            }
            debug!("Engine event stream for {} ended", id);
        }))
    }

    /// Handle every engine event queued right now, without waiting for more.
    /// Returns how many were handled; always 0 once the event loop runs.
    pub async fn process_pending_events(&self) -> usize {
        let mut handled = 0;
        loop {
            let next = {
                let mut guard = self.events.lock();
                guard.as_mut().and_then(|rx| rx.try_recv().ok())
            };
            let Some(event) = next else { break };
            self.controller.handle_engine_event(event).await;
            handled += 1;
        }
        handled
    }

    // ------------------------------------------------------------------------
    // NEGOTIATION
    // ------------------------------------------------------------------------

    pub async fn create_offer(&self) -> Result<SessionDescription, SignalingError> {
        self.controller.create_offer().await
    }

    pub async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<Option<SessionDescription>, SignalingError> {
        self.controller.set_remote_description(description).await
    }

    pub async fn add_remote_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<CandidateDisposition, SignalingError> {
        self.trickle.add_remote_candidate(candidate).await
    }

    pub async fn dispatch(&self, message: SignalingMessage) -> Result<DispatchOutcome, SignalingError> {
        self.router.dispatch(message).await
    }

    pub async fn dispatch_json(&self, text: &str) -> Result<DispatchOutcome, SignalingError> {
        self.router.dispatch_json(text).await
    }

    pub fn close(&self) -> Result<(), SignalingError> {
        self.controller.close()
    }

    // ------------------------------------------------------------------------
    // QUERIES
    // ------------------------------------------------------------------------

    pub fn id(&self) -> String {
        self.session.lock().id().to_string()
    }

    pub fn role(&self) -> Role {
        self.controller.role()
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.controller.signaling_state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.controller.snapshot()
    }

    pub fn controller(&self) -> &Arc<NegotiationController> {
        &self.controller
    }

    pub fn router(&self) -> &Arc<SignalingMessageRouter> {
        &self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IceTransportPolicy;
    use crate::engine::SimulatedEngineFactory;
    use crate::session::GatheringState;
    use crate::signaling::{ChannelDelegate, OutboundSignal};

    #[tokio::test]
    async fn test_offer_gathers_candidates() {
        let factory = SimulatedEngineFactory::new(2);
        let (delegate, mut rx) = ChannelDelegate::new();
        let peer = PeerConnectionManager::new(&factory, SessionConfig::initiator(), Arc::new(delegate))
            .unwrap();

        peer.create_offer().await.unwrap();
        assert_eq!(peer.process_pending_events().await, 4);
        assert_eq!(peer.snapshot().gathering_state, GatheringState::Complete);

        assert!(matches!(rx.try_recv().unwrap(), OutboundSignal::Description(_)));
        assert!(matches!(rx.try_recv().unwrap(), OutboundSignal::Candidate(_)));
        assert!(matches!(rx.try_recv().unwrap(), OutboundSignal::Candidate(_)));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let factory = SimulatedEngineFactory::default();
        let mut config = SessionConfig::initiator();
        config.rtc.ice_transport_policy = IceTransportPolicy::Relay;
        let (delegate, _rx) = ChannelDelegate::new();

        match PeerConnectionManager::new(&factory, config, Arc::new(delegate)) {
            Err(SignalingError::InvalidConfiguration(_)) => (),
            _ => panic!("Wrong error type"),
        }
        assert!(factory.engines().is_empty());
    }

    #[tokio::test]
    async fn test_event_loop_takes_stream_once() {
        let factory = SimulatedEngineFactory::new(1);
        let (delegate, mut rx) = ChannelDelegate::new();
        let peer = PeerConnectionManager::new(&factory, SessionConfig::initiator(), Arc::new(delegate))
            .unwrap();

        let handle = peer.spawn_event_loop().unwrap();
        assert!(peer.spawn_event_loop().is_none());
        assert_eq!(peer.process_pending_events().await, 0);

        peer.create_offer().await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), OutboundSignal::Description(_)));
        assert!(matches!(rx.recv().await.unwrap(), OutboundSignal::Candidate(_)));

        peer.close().unwrap();
        handle.abort();
    }
}
