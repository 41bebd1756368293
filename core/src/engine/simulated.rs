//! In-memory engine for demos and tests
//!
//! Produces syntactically plausible SDP and host candidates without touching
//! the network. Every operation yields once before completing so callers
//! observe real suspension points. Failures can be scripted per operation.

use super::{EngineError, EngineEvent, EngineEvents, EngineFactory, MediaEngine};
use crate::config::{AnswerOptions, OfferOptions, RtcConfiguration};
use crate::session::{
    GatheringState, IceCandidate, IceConnectionState, PeerConnectionState, SdpType,
    SessionDescription,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

const BASE_PORT: u16 = 50_000;
const HOST_PRIORITY: u32 = 2_130_706_431;

/// Engine operation, used to script failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    CreateOffer,
    CreateAnswer,
    SetLocalDescription,
    SetRemoteDescription,
    AddIceCandidate,
}

#[derive(Debug)]
struct SimulatedState {
    session_id: u64,
    version: u64,
    ufrag: String,
    pwd: String,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    failures: HashMap<EngineOp, VecDeque<String>>,
    applied_candidates: Vec<IceCandidate>,
    /// Gathering already ran for the current ICE credentials
    gathered: bool,
    connected: bool,
    closed: bool,
}

fn fresh_credentials() -> (String, String) {
    let token = uuid::Uuid::new_v4().simple().to_string();
    (token[..8].to_string(), token[8..].to_string())
}

/// A fake engine-side peer connection
pub struct SimulatedEngine {
    label: String,
    host: String,
    candidates_per_round: usize,
    state: Mutex<SimulatedState>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl SimulatedEngine {
    /// Create an engine whose host candidates use `host` as address.
    /// `candidates_per_round` candidates are gathered after each local
    /// description that starts a new ICE generation.
    pub fn new(label: impl Into<String>, host: impl Into<String>, candidates_per_round: usize) -> (Arc<Self>, EngineEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let (ufrag, pwd) = fresh_credentials();
        let engine = Arc::new(Self {
            label: label.into(),
            host: host.into(),
            candidates_per_round,
            state: Mutex::new(SimulatedState {
                session_id: uuid::Uuid::new_v4().as_u64_pair().0 >> 1,
                version: 1,
                ufrag,
                pwd,
                local: None,
                remote: None,
                failures: HashMap::new(),
                applied_candidates: Vec::new(),
                gathered: false,
                connected: false,
                closed: false,
            }),
            events,
        });
        (engine, rx)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Make the next call of `op` fail with `reason`. Calls queue up.
    pub fn fail_next(&self, op: EngineOp, reason: impl Into<String>) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(reason.into());
    }

    /// Candidates the engine accepted, in the order they were added
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().applied_candidates.clone()
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().local.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().remote.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Push an arbitrary event, as if the engine raised it
    pub fn emit(&self, event: EngineEvent) {
        trace!("{} emitting {}", self.label, event);
        let _ = self.events.send(event);
    }

    /// Raise renegotiation-needed, as adding a data channel would
    pub fn request_renegotiation(&self) {
        self.emit(EngineEvent::RenegotiationNeeded);
    }

    fn take_failure(&self, op: EngineOp) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(EngineError::new("peer connection is closed"));
        }
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(reason) => {
                debug!("{} failing {:?}: {}", self.label, op, reason);
                Err(EngineError::new(reason))
            }
            None => Ok(()),
        }
    }

    fn build_sdp(&self, state: &mut SimulatedState, setup: &str) -> String {
        state.version += 1;
        format!(
            "v=0\r\n\
             o=- {} {} IN IP4 {}\r\n\
             s=-\r\n\
             t=0 0\r\n\
             a=group:BUNDLE 0\r\n\
             m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
             c=IN IP4 0.0.0.0\r\n\
             a=mid:0\r\n\
             a=ice-ufrag:{}\r\n\
             a=ice-pwd:{}\r\n\
             a=setup:{}\r\n\
             a=sctp-port:5000\r\n",
            state.session_id, state.version, self.host, state.ufrag, state.pwd, setup
        )
    }

    /// `None` once the index runs past the last usable port
    fn host_candidate(&self, index: usize) -> Option<IceCandidate> {
        let offset = u16::try_from(index).ok()?;
        let port = BASE_PORT.checked_add(offset)?;
        Some(IceCandidate::new(
            Some("0".to_string()),
            0,
            format!(
                "candidate:{} 1 udp {} {} {} typ host",
                index + 1,
                HOST_PRIORITY - u32::from(offset),
                self.host,
                port
            ),
        ))
    }

    fn gather(&self) {
        if self.candidates_per_round == 0 {
            return;
        }
        self.emit(EngineEvent::GatheringStateChanged(GatheringState::Gathering));
        for index in 0..self.candidates_per_round {
            let Some(candidate) = self.host_candidate(index) else {
                warn!("{} out of host ports after {} candidates", self.label, index);
                break;
            };
            self.emit(EngineEvent::LocalCandidate(candidate));
        }
        self.emit(EngineEvent::GatheringStateChanged(GatheringState::Complete));
    }

    fn maybe_connect(&self) {
        let mut state = self.state.lock();
        let ready = !state.connected
            && state.local.is_some()
            && state.remote.is_some()
            && !state.applied_candidates.is_empty();
        if !ready {
            return;
        }
        state.connected = true;
        drop(state);
        self.emit(EngineEvent::IceConnectionStateChanged(IceConnectionState::Checking));
        self.emit(EngineEvent::IceConnectionStateChanged(IceConnectionState::Connected));
        self.emit(EngineEvent::ConnectionStateChanged(PeerConnectionState::Connected));
    }
}

#[async_trait]
impl MediaEngine for SimulatedEngine {
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription, EngineError> {
        tokio::task::yield_now().await;
        self.take_failure(EngineOp::CreateOffer)?;

        let mut state = self.state.lock();
        if options.ice_restart {
            let (ufrag, pwd) = fresh_credentials();
            state.ufrag = ufrag;
            state.pwd = pwd;
            state.gathered = false;
        }
        let sdp = self.build_sdp(&mut state, "actpass");
        Ok(SessionDescription::new(SdpType::Offer, sdp))
    }

    async fn create_answer(&self, _options: AnswerOptions) -> Result<SessionDescription, EngineError> {
        tokio::task::yield_now().await;
        self.take_failure(EngineOp::CreateAnswer)?;

        let mut state = self.state.lock();
        match state.remote.as_ref().map(SessionDescription::kind) {
            Some(SdpType::Offer) => {}
            _ => return Err(EngineError::new("no remote offer to answer")),
        }
        let sdp = self.build_sdp(&mut state, "active");
        Ok(SessionDescription::new(SdpType::Answer, sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), EngineError> {
        tokio::task::yield_now().await;
        self.take_failure(EngineOp::SetLocalDescription)?;

        let start_gathering = {
            let mut state = self.state.lock();
            state.local = Some(description);
            let start = !state.gathered;
            state.gathered = true;
            start
        };
        if start_gathering {
            self.gather();
        }
        self.maybe_connect();
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), EngineError> {
        tokio::task::yield_now().await;
        self.take_failure(EngineOp::SetRemoteDescription)?;

        if !description.sdp().starts_with("v=") {
            return Err(EngineError::new("failed to parse session description"));
        }
        self.state.lock().remote = Some(description);
        self.maybe_connect();
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        tokio::task::yield_now().await;
        self.take_failure(EngineOp::AddIceCandidate)?;

        {
            let mut state = self.state.lock();
            if state.remote.is_none() {
                return Err(EngineError::new("remote description not set"));
            }
            if !candidate.candidate().starts_with("candidate:") {
                return Err(EngineError::new("invalid candidate attribute"));
            }
            state.applied_candidates.push(candidate);
        }
        self.maybe_connect();
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            debug!("{} closed", self.label);
        }
    }
}

/// Factory handing out [`SimulatedEngine`]s. Keeps a handle on each engine
/// it created so tests and the demo can script and inspect them.
pub struct SimulatedEngineFactory {
    candidates_per_round: usize,
    /// Engines handed out so far
    next_host: AtomicUsize,
    created: Mutex<Vec<Arc<SimulatedEngine>>>,
}

impl SimulatedEngineFactory {
    pub fn new(candidates_per_round: usize) -> Self {
        Self {
            candidates_per_round,
            next_host: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Engines created so far, oldest first
    pub fn engines(&self) -> Vec<Arc<SimulatedEngine>> {
        self.created.lock().clone()
    }

    pub fn last_engine(&self) -> Option<Arc<SimulatedEngine>> {
        self.created.lock().last().cloned()
    }
}

impl Default for SimulatedEngineFactory {
    fn default() -> Self {
        Self::new(2)
    }
}

impl EngineFactory for SimulatedEngineFactory {
    fn create_peer_connection(
        &self,
        config: &RtcConfiguration,
    ) -> Result<(Arc<dyn MediaEngine>, EngineEvents), EngineError> {
        for server in &config.ice_servers {
            server.validate().map_err(EngineError::new)?;
        }
        let n = self.next_host.fetch_add(1, Ordering::Relaxed);
        // Host octets cycle through 1..=254 of the documentation range.
        let octet = n % 254 + 1;
        let label = format!("sim-{}", n + 1);
        let (engine, events) =
            SimulatedEngine::new(label, format!("192.0.2.{}", octet), self.candidates_per_round);
        self.created.lock().push(Arc::clone(&engine));
        debug!("Created simulated engine {}", engine.label());
        Ok((engine, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut EngineEvents) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_offer_sdp_shape() {
        let (engine, _rx) = SimulatedEngine::new("a", "192.0.2.1", 0);
        let offer = engine.create_offer(OfferOptions::default()).await.unwrap();
        assert_eq!(offer.kind(), SdpType::Offer);
        assert!(offer.sdp().starts_with("v=0\r\n"));
        assert!(offer.sdp().contains("a=setup:actpass"));
    }

    #[tokio::test]
    async fn test_answer_requires_remote_offer() {
        let (engine, _rx) = SimulatedEngine::new("b", "192.0.2.2", 0);
        let err = engine.create_answer(AnswerOptions::default()).await.unwrap_err();
        assert_eq!(err.reason(), "no remote offer to answer");
    }

    #[tokio::test]
    async fn test_scripted_failure_is_consumed_once() {
        let (engine, _rx) = SimulatedEngine::new("a", "192.0.2.1", 0);
        engine.fail_next(EngineOp::CreateOffer, "network error");

        let err = engine.create_offer(OfferOptions::default()).await.unwrap_err();
        assert_eq!(err.reason(), "network error");
        assert!(engine.create_offer(OfferOptions::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_local_description_triggers_gathering_once() {
        let (engine, mut rx) = SimulatedEngine::new("a", "192.0.2.1", 2);
        let offer = engine.create_offer(OfferOptions::default()).await.unwrap();
        engine.set_local_description(offer.clone()).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], EngineEvent::GatheringStateChanged(GatheringState::Gathering));
        assert!(matches!(events[1], EngineEvent::LocalCandidate(_)));
        assert_eq!(events[3], EngineEvent::GatheringStateChanged(GatheringState::Complete));

        engine.set_local_description(offer).await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_ice_restart_gathers_again() {
        let (engine, mut rx) = SimulatedEngine::new("a", "192.0.2.1", 1);
        let offer = engine.create_offer(OfferOptions::default()).await.unwrap();
        engine.set_local_description(offer).await.unwrap();
        drain(&mut rx);

        let restart = OfferOptions { ice_restart: true, ..OfferOptions::default() };
        let offer = engine.create_offer(restart).await.unwrap();
        engine.set_local_description(offer).await.unwrap();
        assert_eq!(drain(&mut rx).len(), 3);
    }

    #[tokio::test]
    async fn test_candidate_needs_remote_description() {
        let (engine, _rx) = SimulatedEngine::new("a", "192.0.2.1", 0);
        let cand = IceCandidate::new(Some("0".into()), 0, "candidate:1 1 udp 1 192.0.2.9 5000 typ host");
        assert!(engine.add_ice_candidate(cand.clone()).await.is_err());

        let remote = SessionDescription::new(SdpType::Offer, "v=0\r\n");
        engine.set_remote_description(remote).await.unwrap();
        engine.add_ice_candidate(cand.clone()).await.unwrap();
        assert_eq!(engine.applied_candidates(), vec![cand]);
    }

    #[tokio::test]
    async fn test_closed_engine_rejects_operations() {
        let (engine, _rx) = SimulatedEngine::new("a", "192.0.2.1", 0);
        engine.close();
        assert!(engine.is_closed());
        assert!(engine.create_offer(OfferOptions::default()).await.is_err());
    }

    #[test]
    fn test_factory_tracks_engines() {
        let factory = SimulatedEngineFactory::new(1);
        factory.create_peer_connection(&RtcConfiguration::default()).unwrap();
        factory.create_peer_connection(&RtcConfiguration::default()).unwrap();

        let engines = factory.engines();
        assert_eq!(engines.len(), 2);
        assert_ne!(engines[0].label(), engines[1].label());
    }

    #[test]
    fn test_host_candidates_stop_at_last_port() {
        let (engine, _rx) = SimulatedEngine::new("a", "192.0.2.1", 0);
        let last = usize::from(u16::MAX - BASE_PORT);

        let candidate = engine.host_candidate(last).unwrap();
        assert!(candidate.candidate().ends_with(" 65535 typ host"));
        assert!(engine.host_candidate(last + 1).is_none());
        assert!(engine.host_candidate(70_000).is_none());
    }

    #[tokio::test]
    async fn test_gathering_never_repeats_a_port() {
        let (engine, mut rx) = SimulatedEngine::new("a", "192.0.2.1", 70_000);
        let offer = engine.create_offer(OfferOptions::default()).await.unwrap();
        engine.set_local_description(offer).await.unwrap();

        let ports: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                EngineEvent::LocalCandidate(c) => {
                    c.candidate().split_whitespace().nth(5).map(str::to_string)
                }
                _ => None,
            })
            .collect();
        let unique: std::collections::HashSet<&String> = ports.iter().collect();
        assert_eq!(ports.len(), usize::from(u16::MAX - BASE_PORT) + 1);
        assert_eq!(unique.len(), ports.len());
    }

    #[test]
    fn test_factory_hosts_wrap_inside_range() {
        let factory = SimulatedEngineFactory {
            candidates_per_round: 0,
            next_host: AtomicUsize::new(253),
            created: Mutex::new(Vec::new()),
        };
        for _ in 0..3 {
            factory.create_peer_connection(&RtcConfiguration::default()).unwrap();
        }

        let labels: Vec<String> = factory.engines().iter().map(|e| e.label().to_string()).collect();
        assert_eq!(labels, vec!["sim-254", "sim-255", "sim-256"]);
        let hosts: Vec<String> = factory.engines().iter().map(|e| e.host.clone()).collect();
        assert_eq!(hosts, vec!["192.0.2.254", "192.0.2.1", "192.0.2.2"]);
    }

    #[test]
    fn test_factory_rejects_invalid_servers() {
        let factory = SimulatedEngineFactory::default();
        let mut config = RtcConfiguration::default();
        config.ice_servers[0].urls = vec!["turn:turn.example.org".to_string()];
        assert!(factory.create_peer_connection(&config).is_err());
    }
}
