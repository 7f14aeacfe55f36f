use futures::StreamExt;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
    time::{timeout, timeout_at, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    adapter::AdapterRegistry,
    error::{Result, ScaleError},
    radio::{PeerStream, Radio},
    session::ScaleSession,
    types::{DiscoveredPeer, DiscoveryConfig, RadioState},
};

/// Finds a nearby supported scale and connects to it
///
/// At most one discovery runs at a time per manager. Dropping the future
/// returned by [`DiscoveryManager::connect_to_nearby_scale`] cancels it: the
/// scan is stopped, a half-open link is torn down and the in-progress flag is
/// cleared.
pub struct DiscoveryManager {
    radio: Arc<dyn Radio>,
    registry: AdapterRegistry,
    config: DiscoveryConfig,
    state: Arc<watch::Sender<RadioState>>,
    scanning: Arc<AtomicBool>,
    state_task: JoinHandle<()>,
}

impl DiscoveryManager {
    /// Create a manager over `radio`
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(radio: Arc<dyn Radio>, registry: AdapterRegistry, config: DiscoveryConfig) -> Self {
        let events = radio.state_events();
        let (state, _) = watch::channel(radio.current_state());
        let state = Arc::new(state);

        let state_task = tokio::spawn(mirror_radio_state(radio.clone(), events, state.clone()));

        Self {
            radio,
            registry,
            config,
            state,
            scanning: Arc::new(AtomicBool::new(false)),
            state_task,
        }
    }

    /// Create a manager with every known scale adapter and default settings
    #[must_use]
    pub fn with_defaults(radio: Arc<dyn Radio>) -> Self {
        Self::new(radio, AdapterRegistry::default(), DiscoveryConfig::default())
    }

    /// Latest radio state
    #[must_use]
    pub fn current_radio_state(&self) -> RadioState {
        *self.state.borrow()
    }

    /// Subscribe to radio state changes
    #[must_use]
    pub fn subscribe_radio_state(&self) -> watch::Receiver<RadioState> {
        self.state.subscribe()
    }

    /// Whether a discovery is in flight
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Registered adapters
    #[must_use]
    pub const fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Wait for the radio to be powered on
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::RadioUnavailable`] right away if the radio is
    /// unsupported or unauthorized, and [`ScaleError::Timeout`] if it does not
    /// power on within the configured ready timeout.
    pub async fn wait_until_ready(&self) -> Result<()> {
        let mut states = self.state.subscribe();
        let timeout_ms = self.config.ready_timeout_ms;

        let state = timeout(
            Duration::from_millis(timeout_ms),
            states.wait_for(|s| s.is_ready() || s.is_permanently_unavailable()),
        )
        .await
        .map_err(|_| {
            warn!(
                "Bluetooth not ready after {}ms (state: {})",
                timeout_ms,
                self.current_radio_state()
            );
            ScaleError::Timeout { timeout_ms }
        })?
        .map(|state| *state)
        .map_err(|_| ScaleError::Other("radio state channel closed".to_string()))?;

        if state.is_ready() {
            Ok(())
        } else {
            warn!("Bluetooth unavailable: {}", state);
            Err(ScaleError::RadioUnavailable { state })
        }
    }

    /// Scan for a supported scale and connect to the first one that accepts
    ///
    /// Peers are taken in discovery order; each is tried with every adapter
    /// claiming it, in registry order. Failed attempts are logged and skipped.
    ///
    /// # Errors
    ///
    /// - [`ScaleError::ScanAlreadyInProgress`] if another discovery is running
    /// - [`ScaleError::RadioUnavailable`] or [`ScaleError::Timeout`] if the radio
    ///   does not become ready
    /// - [`ScaleError::NoScaleFound`] if the scan ends, or times out, without a
    ///   successful connection
    pub async fn connect_to_nearby_scale(&self) -> Result<ScaleSession> {
        let mut guard = ScanGuard::acquire(&self.scanning)?;

        self.wait_until_ready().await?;

        let services = self.registry.scannable_services();
        if services.is_empty() {
            warn!("No scale adapters registered");
            return Err(ScaleError::NoScaleFound);
        }

        info!("Scanning for scales...");
        let peers = self.radio.scan(&services).await?;
        guard.scanning(self.radio.clone());

        let result = self.connect_first(peers).await;
        guard.finish().await;
        result
    }

    /// Like [`Self::connect_to_nearby_scale`], abandoned when `cancel` completes
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::Cancelled`] if `cancel` completes first, otherwise
    /// see [`Self::connect_to_nearby_scale`].
    pub async fn connect_to_nearby_scale_until<F>(&self, cancel: F) -> Result<ScaleSession>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            result = self.connect_to_nearby_scale() => result,
            () = cancel => {
                info!("Scale discovery cancelled");
                Err(ScaleError::Cancelled)
            }
        }
    }

    async fn connect_first(&self, mut peers: PeerStream) -> Result<ScaleSession> {
        let deadline = self
            .config
            .scan_timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        loop {
            let next = match deadline {
                Some(deadline) => timeout_at(deadline, peers.next()).await.unwrap_or_else(|_| {
                    info!("Scan timed out");
                    None
                }),
                None => peers.next().await,
            };

            let Some(peer) = next else {
                break;
            };

            if let Some(session) = self.try_adapters(&peer).await {
                return Ok(session);
            }
        }

        info!("No scale found");
        Err(ScaleError::NoScaleFound)
    }

    async fn try_adapters(&self, peer: &DiscoveredPeer) -> Option<ScaleSession> {
        for adapter in self.registry.candidates_for(peer) {
            debug!("Trying {} for {} ({:?})", adapter.name(), peer.id, peer.name);

            match adapter
                .connect(peer, self.radio.clone(), &self.config.session)
                .await
            {
                Ok(session) => {
                    info!("Connected to {} at {}", adapter.name(), peer.id);
                    return Some(session);
                }
                Err(e) => warn!(
                    "Failed to connect to {} with {}: {}",
                    peer.id,
                    adapter.name(),
                    e
                ),
            }
        }
        None
    }
}

impl Drop for DiscoveryManager {
    fn drop(&mut self) {
        self.state_task.abort();
    }
}

async fn mirror_radio_state(
    radio: Arc<dyn Radio>,
    mut events: tokio::sync::broadcast::Receiver<RadioState>,
    state: Arc<watch::Sender<RadioState>>,
) {
    loop {
        match events.recv().await {
            Ok(new_state) => {
                debug!("Radio state changed to {}", new_state);
                state.send_replace(new_state);
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!("Skipped {} radio state events, resyncing", skipped);
                state.send_replace(radio.current_state());
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Holds the in-progress flag and stops the scan on every exit path
struct ScanGuard {
    flag: Arc<AtomicBool>,
    radio: Option<Arc<dyn Radio>>,
}

impl ScanGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                debug!("Rejecting discovery request, one is already running");
                ScaleError::ScanAlreadyInProgress
            })?;

        Ok(Self {
            flag: flag.clone(),
            radio: None,
        })
    }

    fn scanning(&mut self, radio: Arc<dyn Radio>) {
        self.radio = Some(radio);
    }

    async fn finish(mut self) {
        if let Some(radio) = self.radio.take() {
            if let Err(e) = radio.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
        }
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        if let Some(radio) = self.radio.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = radio.stop_scan().await {
                        debug!("Failed to stop abandoned scan: {}", e);
                    }
                });
            }
        }
        self.flag.store(false, Ordering::Release);
    }
}
