use async_trait::async_trait;
use btleplug::{
    api::{
        Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
        PeripheralProperties, ScanFilter,
    },
    platform::{Adapter, Manager, Peripheral, PeripheralId},
};
use futures::stream::{Stream, StreamExt};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};

use crate::{
    error::{Result, ScaleError},
    radio::{PeerStream, Radio},
    types::{
        CharacteristicId, CharacteristicUpdate, ConnectionEvent, DiscoveredPeer, PeerId,
        RadioState, ServiceId,
    },
};

/// Default capacity of the radio event channels
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// [`Radio`] implementation on top of `btleplug`, using the first local adapter
///
/// Peripherals are cached by platform id as they are discovered; only peers
/// seen by a scan of this radio can be connected. Scan streams end when
/// [`Radio::stop_scan`] is called.
pub struct BtleplugRadio {
    central: Adapter,
    peripherals: Arc<Mutex<HashMap<PeerId, Peripheral>>>,
    notification_tasks: Mutex<HashMap<PeerId, JoinHandle<()>>>,
    state: Arc<watch::Sender<RadioState>>,
    state_tx: broadcast::Sender<RadioState>,
    update_tx: broadcast::Sender<CharacteristicUpdate>,
    connection_tx: broadcast::Sender<ConnectionEvent>,
    scan_stop: watch::Sender<u64>,
    event_task: JoinHandle<()>,
}

impl BtleplugRadio {
    /// Open the first Bluetooth adapter of the host
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::RadioUnavailable`] if the host has no Bluetooth adapter,
    /// or [`ScaleError::Ble`] if the Bluetooth stack cannot be initialized.
    pub async fn new() -> Result<Self> {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY).await
    }

    /// Open the first Bluetooth adapter with custom event channel capacity
    ///
    /// # Errors
    ///
    /// See [`BtleplugRadio::new`].
    pub async fn with_capacity(capacity: usize) -> Result<Self> {
        let manager = Manager::new().await?;
        let central = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(ScaleError::RadioUnavailable {
                state: RadioState::Unsupported,
            })?;

        let events = central.events().await?;
        let initial = match central.adapter_state().await {
            Ok(state) => radio_state(state),
            Err(e) => {
                debug!("Adapter state not available yet: {}", e);
                RadioState::Unknown
            }
        };
        info!("Bluetooth adapter opened, state: {}", initial);

        let (state, _) = watch::channel(initial);
        let state = Arc::new(state);
        let (state_tx, _) = broadcast::channel(capacity);
        let (update_tx, _) = broadcast::channel(capacity);
        let (connection_tx, _) = broadcast::channel(capacity);

        let event_task = tokio::spawn(pump_central_events(
            events,
            state.clone(),
            state_tx.clone(),
            connection_tx.clone(),
        ));

        Ok(Self {
            central,
            peripherals: Arc::new(Mutex::new(HashMap::new())),
            notification_tasks: Mutex::new(HashMap::new()),
            state,
            state_tx,
            update_tx,
            connection_tx,
            scan_stop: watch::channel(0).0,
            event_task,
        })
    }

    async fn peripheral(&self, peer: &PeerId) -> Result<Peripheral> {
        self.peripherals
            .lock()
            .await
            .get(peer)
            .cloned()
            .ok_or_else(|| ScaleError::PeerNotFound(peer.to_string()))
    }

    async fn forward_notifications(&self, peer: &PeerId, peripheral: &Peripheral) -> Result<()> {
        let mut tasks = self.notification_tasks.lock().await;
        if tasks.get(peer).is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }

        let mut notifications = peripheral.notifications().await?;
        let sender = self.update_tx.clone();
        let peer_id = peer.clone();

        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                trace!(
                    "Notification from {} on {}: {:02X?}",
                    peer_id,
                    notification.uuid,
                    notification.value
                );
                let _ = sender.send(CharacteristicUpdate {
                    peer: peer_id.clone(),
                    characteristic: notification.uuid,
                    value: notification.value,
                });
            }
            debug!("Notification stream of {} ended", peer_id);
        });

        tasks.insert(peer.clone(), task);
        Ok(())
    }
}

#[async_trait]
impl Radio for BtleplugRadio {
    fn current_state(&self) -> RadioState {
        *self.state.borrow()
    }

    fn state_events(&self) -> broadcast::Receiver<RadioState> {
        self.state_tx.subscribe()
    }

    async fn scan(&self, services: &[ServiceId]) -> Result<PeerStream> {
        info!("Starting scan for scales...");

        let events = self.central.events().await?;
        self.central
            .start_scan(ScanFilter {
                services: services.to_vec(),
            })
            .await?;

        let central = self.central.clone();
        let peripherals = self.peripherals.clone();
        let admission = Arc::new(Mutex::new(ScanAdmission::new(services)));

        let stream = events.filter_map(move |event| {
            let central = central.clone();
            let peripherals = peripherals.clone();
            let admission = admission.clone();

            async move {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id)
                    | CentralEvent::DeviceUpdated(id)
                    | CentralEvent::ServicesAdvertisement { id, .. } => id,
                    _ => return None,
                };

                let peripheral = central.peripheral(&id).await.ok()?;
                let properties = peripheral.properties().await.ok().flatten()?;

                let peer_id = peer_id(&id);
                if !admission.lock().await.admit(&peer_id, &properties) {
                    return None;
                }

                debug!(
                    "Discovered {} ({:?}, address {}), services {:?}",
                    peer_id, properties.local_name, properties.address, properties.services
                );
                peripherals.lock().await.insert(peer_id.clone(), peripheral);

                Some(discovered_peer(peer_id, properties))
            }
        });

        Ok(until_stopped(stream, self.scan_stop.subscribe()))
    }

    async fn stop_scan(&self) -> Result<()> {
        self.scan_stop.send_modify(|generation| *generation = generation.wrapping_add(1));
        self.central.stop_scan().await?;
        info!("Scan stopped");
        Ok(())
    }

    async fn connect(&self, peer: &PeerId) -> Result<()> {
        info!("Connecting to {}", peer);
        let peripheral = self.peripheral(peer).await?;

        peripheral
            .connect()
            .await
            .map_err(|e| ScaleError::ConnectionFailed(e.to_string()))?;
        peripheral.discover_services().await?;

        info!("Successfully connected to {}", peer);
        Ok(())
    }

    async fn disconnect(&self, peer: &PeerId) -> Result<()> {
        if let Some(task) = self.notification_tasks.lock().await.remove(peer) {
            task.abort();
        }

        let peripheral = self.peripheral(peer).await?;
        peripheral.disconnect().await?;
        info!("Disconnect requested for {}", peer);
        Ok(())
    }

    async fn read_characteristic(
        &self,
        peer: &PeerId,
        service: ServiceId,
        characteristic: CharacteristicId,
    ) -> Result<Vec<u8>> {
        let peripheral = self.peripheral(peer).await?;
        let characteristic = find_characteristic(&peripheral, service, characteristic)?;
        Ok(peripheral.read(&characteristic).await?)
    }

    async fn set_notify(
        &self,
        peer: &PeerId,
        service: ServiceId,
        characteristic: CharacteristicId,
        enabled: bool,
    ) -> Result<()> {
        let peripheral = self.peripheral(peer).await?;
        let characteristic = find_characteristic(&peripheral, service, characteristic)?;

        if enabled {
            self.forward_notifications(peer, &peripheral).await?;
            peripheral.subscribe(&characteristic).await?;
        } else {
            peripheral.unsubscribe(&characteristic).await?;
        }

        debug!(
            "Notifications {} for {} on {}",
            if enabled { "enabled" } else { "disabled" },
            characteristic.uuid,
            peer
        );
        Ok(())
    }

    fn characteristic_updates(&self) -> broadcast::Receiver<CharacteristicUpdate> {
        self.update_tx.subscribe()
    }

    fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection_tx.subscribe()
    }
}

impl Drop for BtleplugRadio {
    fn drop(&mut self) {
        self.event_task.abort();
        for (_, task) in self.notification_tasks.get_mut().drain() {
            task.abort();
        }
    }
}

/// Map the backend's adapter state onto [`RadioState`]
#[must_use]
pub const fn radio_state(state: CentralState) -> RadioState {
    match state {
        CentralState::PoweredOn => RadioState::PoweredOn,
        CentralState::PoweredOff => RadioState::PoweredOff,
        _ => RadioState::Unknown,
    }
}

fn find_characteristic(
    peripheral: &Peripheral,
    service: ServiceId,
    characteristic: CharacteristicId,
) -> Result<Characteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == characteristic && c.service_uuid == service)
        .ok_or(ScaleError::CharacteristicNotFound {
            service,
            characteristic,
        })
}

/// End `peers` at the next change of the stop signal
fn until_stopped(
    peers: impl Stream<Item = DiscoveredPeer> + Send + 'static,
    mut stop: watch::Receiver<u64>,
) -> PeerStream {
    peers
        .take_until(async move {
            let _ = stop.changed().await;
        })
        .boxed()
}

/// Stable identifier of a peripheral
///
/// Keyed on the platform id rather than the hardware address, which some
/// backends (CoreBluetooth) report as all zeros.
fn peer_id(id: &PeripheralId) -> PeerId {
    PeerId(id.to_string())
}

/// Admits each peripheral of one scan at most once
struct ScanAdmission {
    filter: Vec<ServiceId>,
    seen: HashSet<PeerId>,
}

impl ScanAdmission {
    fn new(filter: &[ServiceId]) -> Self {
        Self {
            filter: filter.to_vec(),
            seen: HashSet::new(),
        }
    }

    fn admit(&mut self, peer: &PeerId, properties: &PeripheralProperties) -> bool {
        // Platform scan filters are advisory, services may also arrive after discovery
        if !self.filter.is_empty() && !properties.services.iter().any(|s| self.filter.contains(s)) {
            return false;
        }
        self.seen.insert(peer.clone())
    }
}

fn discovered_peer(id: PeerId, properties: PeripheralProperties) -> DiscoveredPeer {
    DiscoveredPeer {
        id,
        name: properties.local_name,
        services: properties.services,
        manufacturer_data: properties.manufacturer_data,
        rssi: properties.rssi,
    }
}

async fn pump_central_events(
    mut events: impl Stream<Item = CentralEvent> + Unpin,
    state: Arc<watch::Sender<RadioState>>,
    state_tx: broadcast::Sender<RadioState>,
    connection_tx: broadcast::Sender<ConnectionEvent>,
) {
    while let Some(event) = events.next().await {
        match event {
            CentralEvent::StateUpdate(central_state) => {
                let new_state = radio_state(central_state);
                info!("Bluetooth state: {}", new_state);
                state.send_replace(new_state);
                let _ = state_tx.send(new_state);
            }
            CentralEvent::DeviceConnected(id) => {
                let _ = connection_tx.send(ConnectionEvent {
                    peer: peer_id(&id),
                    connected: true,
                });
            }
            CentralEvent::DeviceDisconnected(id) => {
                let _ = connection_tx.send(ConnectionEvent {
                    peer: peer_id(&id),
                    connected: false,
                });
            }
            _ => {}
        }
    }
    warn!("Bluetooth adapter event stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_state_mapping() {
        assert_eq!(radio_state(CentralState::PoweredOn), RadioState::PoweredOn);
        assert_eq!(radio_state(CentralState::PoweredOff), RadioState::PoweredOff);
        assert_eq!(radio_state(CentralState::Unknown), RadioState::Unknown);
    }

    #[tokio::test]
    async fn test_scan_stream_ends_on_stop() {
        let (stop, _) = watch::channel(0u64);
        let (tx, rx) = futures::channel::mpsc::unbounded();
        let mut peers = until_stopped(rx, stop.subscribe());

        tx.unbounded_send(DiscoveredPeer::new("a", vec![])).unwrap();
        assert_eq!(peers.next().await.unwrap().id, PeerId::from("a"));

        stop.send_modify(|generation| *generation = generation.wrapping_add(1));
        assert!(peers.next().await.is_none());

        // A scan started after the stop is not affected by it
        let (tx, rx) = futures::channel::mpsc::unbounded();
        let mut next_scan = until_stopped(rx, stop.subscribe());
        tx.unbounded_send(DiscoveredPeer::new("b", vec![])).unwrap();
        assert_eq!(next_scan.next().await.unwrap().id, PeerId::from("b"));
    }

    fn advertising(services: Vec<ServiceId>) -> PeripheralProperties {
        PeripheralProperties {
            services,
            local_name: Some("eufy T9147".to_string()),
            ..PeripheralProperties::default()
        }
    }

    #[test]
    fn test_admission_keys_on_peer_id_not_address() {
        let service = crate::types::bluetooth_uuid(0xFFF0);
        let mut admission = ScanAdmission::new(&[service]);

        // Both report the all-zero address some backends use
        let first = advertising(vec![service]);
        let second = advertising(vec![service]);
        assert_eq!(first.address, second.address);

        assert!(admission.admit(&PeerId::from("5A1E0000-0000-0000-0000-000000000001"), &first));
        assert!(admission.admit(&PeerId::from("5A1E0000-0000-0000-0000-000000000002"), &second));
        assert!(!admission.admit(&PeerId::from("5A1E0000-0000-0000-0000-000000000001"), &first));
    }

    #[test]
    fn test_admission_filters_services() {
        let service = crate::types::bluetooth_uuid(0xFFF0);
        let mut admission = ScanAdmission::new(&[service]);

        let battery_only = advertising(vec![crate::types::bluetooth_uuid(0x180F)]);
        assert!(!admission.admit(&PeerId::from("a"), &battery_only));
        assert!(!admission.admit(&PeerId::from("b"), &advertising(vec![])));

        // Services announced later still admit the peer
        assert!(admission.admit(&PeerId::from("a"), &advertising(vec![service])));

        let mut unfiltered = ScanAdmission::new(&[]);
        assert!(unfiltered.admit(&PeerId::from("c"), &advertising(vec![])));
    }

    #[test]
    fn test_discovered_peer_carries_advertisement() {
        let service = crate::types::bluetooth_uuid(0xFFF0);
        let mut properties = advertising(vec![service]);
        properties.rssi = Some(-60);
        properties.manufacturer_data.insert(0x02A8, vec![0x01, 0x02]);

        let peer = discovered_peer(PeerId::from("id"), properties);
        assert_eq!(peer.id, PeerId::from("id"));
        assert_eq!(peer.name.as_deref(), Some("eufy T9147"));
        assert_eq!(peer.services, vec![service]);
        assert_eq!(peer.rssi, Some(-60));
        assert_eq!(peer.manufacturer_data.get(&0x02A8), Some(&vec![0x01, 0x02]));
    }
}
