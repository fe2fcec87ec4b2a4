//! Mock platform pieces shared by the client tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pxs_client::{
    DataChannelInit, PeerConnection, PeerConnectionFactory, Result, SessionDescription,
    SessionObserver, SignallingSink, NegotiationState,
};
use pxs_core::{PeerConnectionOptions, SignallingMessage};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Calls made on a [`MockPeer`], in order
#[derive(Debug, Clone, PartialEq)]
pub enum PeerCall {
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    AddCandidate(Value),
    DataChannel(DataChannelInit),
    Close,
}

#[derive(Default)]
pub struct MockPeer {
    pub calls: Mutex<Vec<PeerCall>>,
    pub stats_polls: AtomicUsize,
}

impl MockPeer {
    pub fn calls(&self) -> Vec<PeerCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: PeerCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl PeerConnection for MockPeer {
    async fn create_offer(&self) -> Result<String> {
        self.record(PeerCall::CreateOffer);
        Ok("v=0 local-offer".into())
    }

    async fn create_answer(&self) -> Result<String> {
        self.record(PeerCall::CreateAnswer);
        Ok("v=0 local-answer".into())
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.record(PeerCall::SetLocal(description));
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.record(PeerCall::SetRemote(description));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: Value) -> Result<()> {
        self.record(PeerCall::AddCandidate(candidate));
        Ok(())
    }

    async fn create_data_channel(&self, init: DataChannelInit) -> Result<()> {
        self.record(PeerCall::DataChannel(init));
        Ok(())
    }

    async fn get_stats(&self) -> Result<Value> {
        let n = self.stats_polls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({"poll": n}))
    }

    async fn close(&self) {
        self.record(PeerCall::Close);
    }
}

/// Hands out [`MockPeer`]s and keeps them for inspection
#[derive(Default)]
pub struct MockFactory {
    pub peers: Mutex<Vec<Arc<MockPeer>>>,
    pub options: Mutex<Vec<PeerConnectionOptions>>,
}

impl MockFactory {
    pub fn last_peer(&self) -> Arc<MockPeer> {
        self.peers.lock().last().cloned().expect("no peer created")
    }

    pub fn created(&self) -> usize {
        self.peers.lock().len()
    }
}

impl PeerConnectionFactory for MockFactory {
    fn create(&self, options: &PeerConnectionOptions) -> Result<Arc<dyn PeerConnection>> {
        let peer = Arc::new(MockPeer::default());
        self.peers.lock().push(peer.clone());
        self.options.lock().push(options.clone());
        Ok(peer)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<SignallingMessage>>,
}

impl RecordingSink {
    pub fn take(&self) -> Vec<SignallingMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent.lock().iter().map(SignallingMessage::kind).collect()
    }
}

#[async_trait]
impl SignallingSink for RecordingSink {
    async fn send(&self, msg: SignallingMessage) -> Result<()> {
        self.sent.lock().push(msg);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub states: Mutex<Vec<NegotiationState>>,
    pub stats: Mutex<Vec<Value>>,
    pub player_counts: Mutex<Vec<usize>>,
    pub input_enabled: Mutex<Vec<bool>>,
}

impl RecordingObserver {
    pub fn state_names(&self) -> Vec<&'static str> {
        self.states.lock().iter().map(NegotiationState::name).collect()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_state_change(&self, state: &NegotiationState) {
        self.states.lock().push(state.clone());
    }

    fn on_stats(&self, stats: &Value) {
        self.stats.lock().push(stats.clone());
    }

    fn on_player_count(&self, count: usize) {
        self.player_counts.lock().push(count);
    }

    fn on_input_enabled(&self, enabled: bool) {
        self.input_enabled.lock().push(enabled);
    }
}
