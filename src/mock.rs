//! In-memory fakes of the host capabilities, for tests

use async_trait::async_trait;
use futures::{channel::mpsc, StreamExt};
use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};
use tokio::sync::broadcast;

use crate::{
    error::{Result, ScaleError},
    health::{HealthAuthorization, HealthSample, HealthStore},
    radio::{PeerStream, Radio},
    types::{
        BodyCharacteristics, CharacteristicId, CharacteristicUpdate, ConnectionEvent,
        DiscoveredPeer, PeerId, PreferredUnits, RadioState, ServiceId,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RadioCall {
    Scan(Vec<ServiceId>),
    StopScan,
    Connect(PeerId),
    Disconnect(PeerId),
    Read(PeerId, CharacteristicId),
    SetNotify(PeerId, CharacteristicId, bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectBehavior {
    Fail,
    Hang,
}

pub(crate) struct MockRadio {
    state: Mutex<RadioState>,
    state_tx: broadcast::Sender<RadioState>,
    update_tx: broadcast::Sender<CharacteristicUpdate>,
    connection_tx: broadcast::Sender<ConnectionEvent>,
    scripted: Mutex<Vec<DiscoveredPeer>>,
    scans: Mutex<Vec<mpsc::UnboundedSender<DiscoveredPeer>>>,
    connect_behavior: Mutex<HashMap<PeerId, ConnectBehavior>>,
    failing_disconnects: Mutex<u32>,
    values: Mutex<HashMap<CharacteristicId, Vec<u8>>>,
    failing_reads: Mutex<HashSet<CharacteristicId>>,
    calls: Mutex<Vec<RadioCall>>,
}

impl MockRadio {
    pub(crate) fn new(state: RadioState) -> Self {
        Self {
            state: Mutex::new(state),
            state_tx: broadcast::channel(16).0,
            update_tx: broadcast::channel(64).0,
            connection_tx: broadcast::channel(16).0,
            scripted: Mutex::new(Vec::new()),
            scans: Mutex::new(Vec::new()),
            connect_behavior: Mutex::new(HashMap::new()),
            failing_disconnects: Mutex::new(0),
            values: Mutex::new(HashMap::new()),
            failing_reads: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_state(&self, state: RadioState) {
        *self.state.lock().unwrap() = state;
        let _ = self.state_tx.send(state);
    }

    /// Peers every subsequent scan yields right away
    pub(crate) fn script_peers(&self, peers: Vec<DiscoveredPeer>) {
        *self.scripted.lock().unwrap() = peers;
    }

    /// Deliver a peer to the running scans
    pub(crate) fn advertise(&self, peer: &DiscoveredPeer) {
        for scan in self.scans.lock().unwrap().iter() {
            let _ = scan.unbounded_send(peer.clone());
        }
    }

    /// End the streams of all running scans
    pub(crate) fn end_scans(&self) {
        self.scans.lock().unwrap().clear();
    }

    pub(crate) fn set_connect_behavior(&self, peer: &PeerId, behavior: ConnectBehavior) {
        self.connect_behavior
            .lock()
            .unwrap()
            .insert(peer.clone(), behavior);
    }

    /// Make the next `count` disconnect requests fail
    pub(crate) fn fail_disconnects(&self, count: u32) {
        *self.failing_disconnects.lock().unwrap() = count;
    }

    pub(crate) fn set_value(&self, characteristic: CharacteristicId, value: Vec<u8>) {
        self.values.lock().unwrap().insert(characteristic, value);
    }

    pub(crate) fn fail_reads(&self, characteristic: CharacteristicId) {
        self.failing_reads.lock().unwrap().insert(characteristic);
    }

    pub(crate) fn notify(&self, peer: &PeerId, characteristic: CharacteristicId, value: Vec<u8>) {
        let _ = self.update_tx.send(CharacteristicUpdate {
            peer: peer.clone(),
            characteristic,
            value,
        });
    }

    pub(crate) fn emit_connection(&self, peer: &PeerId, connected: bool) {
        let _ = self.connection_tx.send(ConnectionEvent {
            peer: peer.clone(),
            connected,
        });
    }

    pub(crate) fn calls(&self) -> Vec<RadioCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&RadioCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: RadioCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Radio for MockRadio {
    fn current_state(&self) -> RadioState {
        *self.state.lock().unwrap()
    }

    fn state_events(&self) -> broadcast::Receiver<RadioState> {
        self.state_tx.subscribe()
    }

    async fn scan(&self, services: &[ServiceId]) -> Result<PeerStream> {
        self.record(RadioCall::Scan(services.to_vec()));

        let (tx, rx) = mpsc::unbounded();
        for peer in self.scripted.lock().unwrap().iter() {
            let _ = tx.unbounded_send(peer.clone());
        }
        self.scans.lock().unwrap().push(tx);
        Ok(rx.boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.record(RadioCall::StopScan);
        self.end_scans();
        Ok(())
    }

    async fn connect(&self, peer: &PeerId) -> Result<()> {
        self.record(RadioCall::Connect(peer.clone()));

        let behavior = self.connect_behavior.lock().unwrap().get(peer).copied();
        match behavior {
            Some(ConnectBehavior::Fail) => {
                Err(ScaleError::ConnectionFailed(format!("{peer} refused")))
            }
            Some(ConnectBehavior::Hang) => futures::future::pending().await,
            None => {
                self.emit_connection(peer, true);
                Ok(())
            }
        }
    }

    async fn disconnect(&self, peer: &PeerId) -> Result<()> {
        self.record(RadioCall::Disconnect(peer.clone()));

        let rejected = {
            let mut failing = self.failing_disconnects.lock().unwrap();
            let rejected = *failing > 0;
            *failing = failing.saturating_sub(1);
            rejected
        };
        if rejected {
            return Err(ScaleError::Protocol("disconnect rejected".to_string()));
        }

        self.emit_connection(peer, false);
        Ok(())
    }

    async fn read_characteristic(
        &self,
        peer: &PeerId,
        service: ServiceId,
        characteristic: CharacteristicId,
    ) -> Result<Vec<u8>> {
        self.record(RadioCall::Read(peer.clone(), characteristic));

        if self.failing_reads.lock().unwrap().contains(&characteristic) {
            return Err(ScaleError::Protocol("read failed".to_string()));
        }
        self.values
            .lock()
            .unwrap()
            .get(&characteristic)
            .cloned()
            .ok_or(ScaleError::CharacteristicNotFound {
                service,
                characteristic,
            })
    }

    async fn set_notify(
        &self,
        peer: &PeerId,
        _service: ServiceId,
        characteristic: CharacteristicId,
        enabled: bool,
    ) -> Result<()> {
        self.record(RadioCall::SetNotify(peer.clone(), characteristic, enabled));
        Ok(())
    }

    fn characteristic_updates(&self) -> broadcast::Receiver<CharacteristicUpdate> {
        self.update_tx.subscribe()
    }

    fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection_tx.subscribe()
    }
}

pub(crate) struct MockHealthStore {
    pub(crate) available: bool,
    pub(crate) authorization: Mutex<HealthAuthorization>,
    pub(crate) characteristics: BodyCharacteristics,
    pub(crate) units: Option<PreferredUnits>,
    pub(crate) fail_share: bool,
    pub(crate) shared: Mutex<Vec<HealthSample>>,
}

impl MockHealthStore {
    pub(crate) fn new(characteristics: BodyCharacteristics) -> Self {
        Self {
            available: true,
            authorization: Mutex::new(HealthAuthorization::Authorized),
            characteristics,
            units: None,
            fail_share: false,
            shared: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn shared(&self) -> Vec<HealthSample> {
        self.shared.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthStore for MockHealthStore {
    fn is_available(&self) -> bool {
        self.available
    }

    fn authorization_status(&self) -> HealthAuthorization {
        *self.authorization.lock().unwrap()
    }

    async fn request_authorization(&self) -> Result<()> {
        if !self.available {
            return Err(ScaleError::HealthStore("not available".to_string()));
        }
        *self.authorization.lock().unwrap() = HealthAuthorization::Authorized;
        Ok(())
    }

    async fn read_body_characteristics(&self) -> BodyCharacteristics {
        self.characteristics
    }

    async fn read_preferred_units(&self) -> Result<PreferredUnits> {
        self.units
            .ok_or_else(|| ScaleError::HealthStore("no preferred units".to_string()))
    }

    async fn share(&self, sample: &HealthSample) -> Result<()> {
        if self.fail_share {
            return Err(ScaleError::HealthStore("save rejected".to_string()));
        }
        self.shared.lock().unwrap().push(sample.clone());
        Ok(())
    }
}
