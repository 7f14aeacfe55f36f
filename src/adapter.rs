use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::{
    error::{Result, ScaleError},
    protocol,
    radio::Radio,
    session::{ScaleSession, SessionLink, SessionUpdater},
    types::{
        bluetooth_uuid, CharacteristicId, DeviceInfo, DiscoveredPeer, PeerId, ServiceId,
        SessionConfig,
    },
};

/// Weight measurement service of the Eufy Smart Scale C1
pub const EUFY_C1_SERVICE: ServiceId = bluetooth_uuid(0xFFF0);
/// Notify characteristic carrying measurement frames
pub const EUFY_C1_MEASUREMENT: CharacteristicId = bluetooth_uuid(0xFFF4);

/// Standard Battery Service
pub const BATTERY_SERVICE: ServiceId = bluetooth_uuid(0x180F);
/// Battery Level characteristic
pub const BATTERY_LEVEL: CharacteristicId = bluetooth_uuid(0x2A19);

/// Standard Device Information Service
pub const DEVICE_INFORMATION_SERVICE: ServiceId = bluetooth_uuid(0x180A);
/// System ID characteristic
pub const SYSTEM_ID: CharacteristicId = bluetooth_uuid(0x2A23);
/// Model Number String characteristic
pub const MODEL_NUMBER: CharacteristicId = bluetooth_uuid(0x2A24);
/// Serial Number String characteristic
pub const SERIAL_NUMBER: CharacteristicId = bluetooth_uuid(0x2A25);
/// Firmware Revision String characteristic
pub const FIRMWARE_REVISION: CharacteristicId = bluetooth_uuid(0x2A26);
/// Hardware Revision String characteristic
pub const HARDWARE_REVISION: CharacteristicId = bluetooth_uuid(0x2A27);
/// Software Revision String characteristic
pub const SOFTWARE_REVISION: CharacteristicId = bluetooth_uuid(0x2A28);
/// Manufacturer Name String characteristic
pub const MANUFACTURER_NAME: CharacteristicId = bluetooth_uuid(0x2A29);

static EUFY_C1_SERVICES: [ServiceId; 1] = [EUFY_C1_SERVICE];

/// Support for one family of scale hardware
///
/// An adapter advertises the services its hardware exposes during discovery
/// and knows how to turn a discovered peer into a running [`ScaleSession`].
#[async_trait]
pub trait ScaleAdapter: Send + Sync {
    /// Human readable name of the hardware family
    fn name(&self) -> &'static str;

    /// Services to scan for
    fn scannable_services(&self) -> &[ServiceId];

    /// Whether this adapter can handle `peer`
    fn claims(&self, peer: &DiscoveredPeer) -> bool {
        peer.advertises_any(self.scannable_services())
    }

    /// Connect to `peer` and start a session
    ///
    /// A link left half-open by a failure or by dropping the returned future is
    /// torn down.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be established or configured.
    async fn connect(
        &self,
        peer: &DiscoveredPeer,
        radio: Arc<dyn Radio>,
        config: &SessionConfig,
    ) -> Result<ScaleSession>;
}

/// Ordered collection of the supported scale adapters
///
/// Order is priority: a peer claimed by several adapters is tried with each in
/// registration order.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn ScaleAdapter>>,
}

impl AdapterRegistry {
    /// Registry without any adapter
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Registry with every adapter this crate ships
    #[must_use]
    pub fn with_known_scales() -> Self {
        Self::new().with_adapter(EufyC1Adapter)
    }

    /// Append an adapter
    #[must_use]
    pub fn with_adapter(mut self, adapter: impl ScaleAdapter + 'static) -> Self {
        self.register(Arc::new(adapter));
        self
    }

    /// Append a shared adapter
    pub fn register(&mut self, adapter: Arc<dyn ScaleAdapter>) {
        debug!("Registered scale adapter {}", adapter.name());
        self.adapters.push(adapter);
    }

    /// Registered adapters in priority order
    #[must_use]
    pub fn adapters(&self) -> &[Arc<dyn ScaleAdapter>] {
        &self.adapters
    }

    /// Number of registered adapters
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapter is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Union of the services of all adapters, in first-seen order
    #[must_use]
    pub fn scannable_services(&self) -> Vec<ServiceId> {
        let mut services = Vec::new();
        for service in self.adapters.iter().flat_map(|a| a.scannable_services()) {
            if !services.contains(service) {
                services.push(*service);
            }
        }
        services
    }

    /// Adapters claiming `peer`, in priority order
    pub fn candidates_for<'a>(
        &'a self,
        peer: &'a DiscoveredPeer,
    ) -> impl Iterator<Item = &'a Arc<dyn ScaleAdapter>> + 'a {
        self.adapters.iter().filter(move |a| a.claims(peer))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_known_scales()
    }
}

/// Eufy Smart Scale C1 (T9147)
#[derive(Debug, Clone, Copy, Default)]
pub struct EufyC1Adapter;

#[async_trait]
impl ScaleAdapter for EufyC1Adapter {
    fn name(&self) -> &'static str {
        "Eufy Smart Scale C1"
    }

    fn scannable_services(&self) -> &[ServiceId] {
        &EUFY_C1_SERVICES
    }

    async fn connect(
        &self,
        peer: &DiscoveredPeer,
        radio: Arc<dyn Radio>,
        config: &SessionConfig,
    ) -> Result<ScaleSession> {
        info!("Connecting to {} at {}", self.name(), peer.id);
        for (company, data) in &peer.manufacturer_data {
            debug!("Manufacturer data {:04X}: {:02X?}", company, data);
        }

        // Subscribe before connecting so the first frames and an early link loss are seen
        let updates = radio.characteristic_updates();
        let connections = radio.connection_events();

        let link = LinkGuard::new(radio.clone(), peer.id.clone());
        let timeout_ms = config.connect_timeout_ms;
        timeout(Duration::from_millis(timeout_ms), radio.connect(&peer.id))
            .await
            .map_err(|_| ScaleError::Timeout { timeout_ms })??;

        radio
            .set_notify(&peer.id, EUFY_C1_SERVICE, EUFY_C1_MEASUREMENT, true)
            .await?;

        let mut session = ScaleSession::start(
            SessionLink {
                radio: radio.clone(),
                peer: peer.id.clone(),
                measurement_characteristic: EUFY_C1_MEASUREMENT,
                decoder: protocol::decode,
                adapter: self.name(),
            },
            updates,
            connections,
            config,
        );
        link.release();

        let auxiliary = tokio::spawn(read_auxiliary(
            radio,
            peer.id.clone(),
            session.updater(),
            config.clone(),
        ));
        session.attach_task(auxiliary);

        Ok(session)
    }
}

/// Tears down a link that was not handed over to a session
struct LinkGuard {
    radio: Option<Arc<dyn Radio>>,
    peer: PeerId,
}

impl LinkGuard {
    fn new(radio: Arc<dyn Radio>, peer: PeerId) -> Self {
        Self {
            radio: Some(radio),
            peer,
        }
    }

    fn release(mut self) {
        self.radio = None;
    }
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        let Some(radio) = self.radio.take() else {
            return;
        };

        let peer = self.peer.clone();
        debug!("Tearing down half-open link to {}", peer);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = radio.disconnect(&peer).await {
                    debug!("Teardown of {} failed: {}", peer, e);
                }
            });
        }
    }
}

async fn read_auxiliary(
    radio: Arc<dyn Radio>,
    peer: PeerId,
    updater: SessionUpdater,
    config: SessionConfig,
) {
    match read_with_retry(radio.as_ref(), &peer, BATTERY_SERVICE, BATTERY_LEVEL, &config).await {
        Some(value) => match value.first() {
            Some(&level) if level <= 100 => {
                info!("Battery level of {}: {}%", peer, level);
                updater.set_battery_level(level);
            }
            _ => warn!("Unexpected battery level value from {}: {:02X?}", peer, value),
        },
        None => warn!("Battery level of {} unavailable", peer),
    }

    if let Ok(system_id) = radio
        .read_characteristic(&peer, DEVICE_INFORMATION_SERVICE, SYSTEM_ID)
        .await
    {
        debug!("System ID of {}: {:02X?}", peer, system_id);
    }

    let info = DeviceInfo {
        model_number: read_string(radio.as_ref(), &peer, MODEL_NUMBER).await,
        serial_number: read_string(radio.as_ref(), &peer, SERIAL_NUMBER).await,
        firmware_revision: read_string(radio.as_ref(), &peer, FIRMWARE_REVISION).await,
        hardware_revision: read_string(radio.as_ref(), &peer, HARDWARE_REVISION).await,
        software_revision: read_string(radio.as_ref(), &peer, SOFTWARE_REVISION).await,
        manufacturer_name: read_string(radio.as_ref(), &peer, MANUFACTURER_NAME).await,
    };

    if info == DeviceInfo::default() {
        debug!("No device information from {}", peer);
    } else {
        info!("Device information of {}: {:?}", peer, info);
        updater.set_device_info(info);
    }
}

async fn read_with_retry(
    radio: &dyn Radio,
    peer: &PeerId,
    service: ServiceId,
    characteristic: CharacteristicId,
    config: &SessionConfig,
) -> Option<Vec<u8>> {
    let attempts = config.auxiliary_read_attempts.max(1);

    for attempt in 1..=attempts {
        match radio.read_characteristic(peer, service, characteristic).await {
            Ok(value) => return Some(value),
            Err(e) => {
                debug!(
                    "Read of {} failed (attempt {}/{}): {}",
                    characteristic, attempt, attempts, e
                );
                if attempt < attempts {
                    sleep(Duration::from_millis(config.auxiliary_retry_delay_ms)).await;
                }
            }
        }
    }
    None
}

async fn read_string(
    radio: &dyn Radio,
    peer: &PeerId,
    characteristic: CharacteristicId,
) -> Option<String> {
    let value = radio
        .read_characteristic(peer, DEVICE_INFORMATION_SERVICE, characteristic)
        .await
        .ok()?;
    let text = String::from_utf8_lossy(&value);
    let text = text.trim_end_matches('\0').trim();
    (!text.is_empty()).then(|| text.to_string())
}
