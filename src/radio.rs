use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::broadcast;

use crate::{
    error::Result,
    types::{
        CharacteristicId, CharacteristicUpdate, ConnectionEvent, DiscoveredPeer, PeerId,
        RadioState, ServiceId,
    },
};

/// Stream of peers produced by a scan, in advertisement order
pub type PeerStream = BoxStream<'static, DiscoveredPeer>;

/// Bluetooth Low Energy central capability
///
/// This is the narrow surface the discovery manager, the adapters and the
/// sessions need from the host BLE stack. Asynchronous notifications are
/// delivered through bounded [`broadcast`] channels: each subscriber gets
/// every event in order, and a subscriber that falls behind loses the oldest
/// events (it observes [`broadcast::error::RecvError::Lagged`]) instead of
/// blocking the radio.
///
/// [`crate::ble::BtleplugRadio`] is the production implementation.
#[async_trait]
pub trait Radio: Send + Sync + 'static {
    /// Latest known radio state
    fn current_state(&self) -> RadioState;

    /// Subscribe to radio state changes
    fn state_events(&self) -> broadcast::Receiver<RadioState>;

    /// Start a scan filtered on `services`
    ///
    /// The returned stream is unbounded and ends once [`Radio::stop_scan`] is called.
    async fn scan(&self, services: &[ServiceId]) -> Result<PeerStream>;

    /// Stop a running scan
    async fn stop_scan(&self) -> Result<()>;

    /// Establish a link to `peer` and discover its services
    async fn connect(&self, peer: &PeerId) -> Result<()>;

    /// Tear down the link to `peer`
    async fn disconnect(&self, peer: &PeerId) -> Result<()>;

    /// Read a characteristic value once
    async fn read_characteristic(
        &self,
        peer: &PeerId,
        service: ServiceId,
        characteristic: CharacteristicId,
    ) -> Result<Vec<u8>>;

    /// Enable or disable value notifications on a characteristic
    async fn set_notify(
        &self,
        peer: &PeerId,
        service: ServiceId,
        characteristic: CharacteristicId,
        enabled: bool,
    ) -> Result<()>;

    /// Subscribe to characteristic value notifications from all peers
    fn characteristic_updates(&self) -> broadcast::Receiver<CharacteristicUpdate>;

    /// Subscribe to link state changes of all peers
    fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent>;
}
