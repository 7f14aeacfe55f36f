use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        watch,
    },
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};

use crate::{
    error::{Result, ScaleError},
    radio::Radio,
    types::{
        CharacteristicId, CharacteristicUpdate, ConnectionEvent, DeviceInfo, Measurement, PeerId,
        SessionConfig,
    },
};

/// Decoder turning one raw notification into a measurement, `None` if not applicable
pub type FrameDecoder = fn(&[u8]) -> Option<Measurement>;

/// Lifecycle of a scale session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Connected, weigh-in not finished yet
    Measuring,
    /// Connected, the final measurement has been produced
    Finalized,
    /// Teardown requested, waiting for the radio to confirm
    Disconnecting,
    /// Link is down
    Disconnected,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measuring => write!(f, "Measuring"),
            Self::Finalized => write!(f, "Finalized"),
            Self::Disconnecting => write!(f, "Disconnecting"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Observable state of a scale session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Link state as last reported by the radio
    pub is_connected: bool,
    /// Battery charge in percent, if it could be read
    pub battery_level: Option<u8>,
    /// Latest decoded measurement
    pub measurement: Option<Measurement>,
    /// The measurement that finalized this weigh-in
    pub final_measurement: Option<Measurement>,
    /// Lifecycle phase
    pub phase: SessionPhase,
    /// Device information strings, if they could be read
    pub device_info: Option<DeviceInfo>,
}

impl SessionSnapshot {
    /// State of a freshly connected session
    #[must_use]
    pub const fn connected() -> Self {
        Self {
            is_connected: true,
            battery_level: None,
            measurement: None,
            final_measurement: None,
            phase: SessionPhase::Measuring,
            device_info: None,
        }
    }

    /// Record a decoded measurement
    ///
    /// Returns `true` exactly once per session: for the first measurement with
    /// final status. Later frames still update [`Self::measurement`].
    pub fn apply_measurement(&mut self, measurement: Measurement) -> bool {
        self.measurement = Some(measurement);

        if !measurement.is_final() || self.final_measurement.is_some() {
            return false;
        }

        self.final_measurement = Some(measurement);
        if self.phase == SessionPhase::Measuring {
            self.phase = SessionPhase::Finalized;
        }
        true
    }

    /// Record a link state change, returns whether anything changed
    pub fn apply_connection(&mut self, connected: bool) -> bool {
        let previous = (self.is_connected, self.phase);
        self.is_connected = connected;
        if !connected {
            self.phase = SessionPhase::Disconnected;
        }
        previous != (self.is_connected, self.phase)
    }

    /// Enter [`SessionPhase::Disconnecting`], returns `false` if teardown already started
    pub fn begin_disconnect(&mut self) -> bool {
        match self.phase {
            SessionPhase::Disconnecting | SessionPhase::Disconnected => false,
            SessionPhase::Measuring | SessionPhase::Finalized => {
                self.phase = SessionPhase::Disconnecting;
                true
            }
        }
    }

    /// Leave [`SessionPhase::Disconnecting`] after a failed teardown request
    ///
    /// Returns `false` if teardown was not pending, e.g. the link already went down.
    pub fn abort_disconnect(&mut self) -> bool {
        if self.phase != SessionPhase::Disconnecting {
            return false;
        }
        self.phase = if self.final_measurement.is_some() {
            SessionPhase::Finalized
        } else {
            SessionPhase::Measuring
        };
        true
    }
}

/// Discrete notifications published by a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A frame was decoded
    Measurement(Measurement),
    /// The weigh-in finished; published at most once per session
    FinalMeasurement(Measurement),
    /// Battery level was read
    BatteryLevel(u8),
    /// Link state changed
    ConnectionChanged(bool),
}

/// Everything a session needs to know about the link it decodes
pub struct SessionLink {
    /// Radio the peer is connected through
    pub radio: Arc<dyn Radio>,
    /// Connected peer
    pub peer: PeerId,
    /// Characteristic carrying measurement frames
    pub measurement_characteristic: CharacteristicId,
    /// Frame decoder of the hardware family
    pub decoder: FrameDecoder,
    /// Name of the adapter that created the link
    pub adapter: &'static str,
}

/// Handle used by adapters to publish best-effort readings into a session
#[derive(Clone)]
pub struct SessionUpdater {
    state: Arc<watch::Sender<SessionSnapshot>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionUpdater {
    /// Publish the battery level
    pub fn set_battery_level(&self, level: u8) {
        self.state.send_modify(|s| s.battery_level = Some(level));
        let _ = self.events.send(SessionEvent::BatteryLevel(level));
    }

    /// Publish device information strings
    pub fn set_device_info(&self, info: DeviceInfo) {
        self.state.send_modify(|s| s.device_info = Some(info));
    }
}

/// Live connection to one physical scale
///
/// A single pump task drains the radio's notification and link channels in
/// delivery order and publishes the resulting [`SessionSnapshot`]. Readers
/// either poll the accessors or subscribe to changes with
/// [`ScaleSession::subscribe`] and [`ScaleSession::events`].
///
/// The session never reconnects. Dropping it stops the pump and requests
/// teardown of a link that is still up.
pub struct ScaleSession {
    radio: Arc<dyn Radio>,
    peer: PeerId,
    adapter: &'static str,
    state: Arc<watch::Sender<SessionSnapshot>>,
    events: broadcast::Sender<SessionEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl ScaleSession {
    /// Start decoding a connected link
    ///
    /// `updates` and `connections` must have been subscribed before the link
    /// was established so no early frame or link loss is missed. Must be called
    /// within a Tokio runtime.
    #[must_use]
    pub fn start(
        link: SessionLink,
        updates: broadcast::Receiver<CharacteristicUpdate>,
        connections: broadcast::Receiver<ConnectionEvent>,
        config: &SessionConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::connected());
        let state = Arc::new(state);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let radio = link.radio.clone();
        let peer = link.peer.clone();
        let adapter = link.adapter;

        let pump = tokio::spawn(pump(
            link,
            updates,
            connections,
            state.clone(),
            events.clone(),
            config.auto_disconnect_on_final,
        ));

        info!("{} session started for {}", adapter, peer);

        Self {
            radio,
            peer,
            adapter,
            state,
            events,
            tasks: vec![pump],
        }
    }

    /// Handle for publishing auxiliary readings
    #[must_use]
    pub fn updater(&self) -> SessionUpdater {
        SessionUpdater {
            state: self.state.clone(),
            events: self.events.clone(),
        }
    }

    /// Tie a background task to the lifetime of this session
    pub fn attach_task(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Connected peer
    #[must_use]
    pub const fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Name of the adapter driving this session
    #[must_use]
    pub const fn adapter(&self) -> &'static str {
        self.adapter
    }

    /// Current state
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Whether the radio reports the link as up
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected
    }

    /// Battery charge in percent
    #[must_use]
    pub fn battery_level(&self) -> Option<u8> {
        self.state.borrow().battery_level
    }

    /// Latest decoded measurement
    #[must_use]
    pub fn measurement(&self) -> Option<Measurement> {
        self.state.borrow().measurement
    }

    /// Lifecycle phase
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase
    }

    /// Device information strings
    #[must_use]
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.state.borrow().device_info.clone()
    }

    /// Subscribe to state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Subscribe to discrete session events
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Wait until the weigh-in finishes
    ///
    /// Returns immediately if the session already finalized.
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::Disconnected`] if the link goes down before a final
    /// measurement arrives.
    pub async fn wait_for_final_measurement(&self) -> Result<Measurement> {
        let mut states = self.state.subscribe();
        let final_measurement = states
            .wait_for(|s| s.final_measurement.is_some() || s.phase == SessionPhase::Disconnected)
            .await
            .map_err(|_| ScaleError::Disconnected)?
            .final_measurement;

        final_measurement.ok_or(ScaleError::Disconnected)
    }

    /// Request link teardown
    ///
    /// The session enters [`SessionPhase::Disconnecting`]; `is_connected` flips
    /// only once the radio reports the link down.
    ///
    /// # Errors
    ///
    /// Returns the radio's error if the teardown request fails.
    pub async fn disconnect(&self) -> Result<()> {
        request_disconnect(self.radio.as_ref(), &self.peer, &self.state).await
    }
}

impl fmt::Debug for ScaleSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScaleSession")
            .field("peer", &self.peer)
            .field("adapter", &self.adapter)
            .field("snapshot", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Drop for ScaleSession {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }

        if !self.state.send_if_modified(SessionSnapshot::begin_disconnect) {
            return;
        }

        let radio = self.radio.clone();
        let peer = self.peer.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = radio.disconnect(&peer).await {
                    debug!("Disconnect of dropped session {} failed: {}", peer, e);
                }
            });
        }
    }
}

async fn request_disconnect(
    radio: &dyn Radio,
    peer: &PeerId,
    state: &watch::Sender<SessionSnapshot>,
) -> Result<()> {
    if !state.send_if_modified(SessionSnapshot::begin_disconnect) {
        debug!("Disconnect of {} already requested", peer);
        return Ok(());
    }

    info!("Disconnecting from {}", peer);
    let result = radio.disconnect(peer).await;
    if result.is_err() && state.send_if_modified(SessionSnapshot::abort_disconnect) {
        debug!("Disconnect of {} failed, teardown can be retried", peer);
    }
    result
}

async fn pump(
    link: SessionLink,
    mut updates: broadcast::Receiver<CharacteristicUpdate>,
    mut connections: broadcast::Receiver<ConnectionEvent>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    events: broadcast::Sender<SessionEvent>,
    auto_disconnect: bool,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => {
                    if update.peer != link.peer
                        || update.characteristic != link.measurement_characteristic
                    {
                        continue;
                    }

                    let Some(measurement) = (link.decoder)(&update.value) else {
                        trace!("Ignoring frame from {}: {:02X?}", link.peer, update.value);
                        continue;
                    };

                    let mut finalized = false;
                    state.send_modify(|s| finalized = s.apply_measurement(measurement));
                    let _ = events.send(SessionEvent::Measurement(measurement));

                    if finalized {
                        info!(
                            "Final measurement from {}: {}, {:.1} ohm",
                            link.peer, measurement.weight, measurement.impedance
                        );
                        let _ = events.send(SessionEvent::FinalMeasurement(measurement));

                        if auto_disconnect {
                            if let Err(e) =
                                request_disconnect(link.radio.as_ref(), &link.peer, &state).await
                            {
                                warn!("Failed to disconnect from {}: {}", link.peer, e);
                            }
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Session for {} skipped {} notifications", link.peer, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            event = connections.recv() => match event {
                Ok(event) if event.peer == link.peer => {
                    if state.send_if_modified(|s| s.apply_connection(event.connected)) {
                        let _ = events.send(SessionEvent::ConnectionChanged(event.connected));
                    }
                    if !event.connected {
                        info!("{} disconnected", link.peer);
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Session for {} skipped {} link events", link.peer, skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    debug!("Session pump for {} stopped", link.peer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock::{MockRadio, RadioCall},
        protocol,
        types::{Mass, MeasurementStatus, RadioState},
    };
    use std::time::Duration;
    use tokio::time::timeout;
    use uuid::Uuid;

    const CHARACTERISTIC: Uuid = crate::types::bluetooth_uuid(0xFFF4);

    fn reading(weight: f64, status: MeasurementStatus) -> Measurement {
        Measurement::new(Mass::kilograms(weight), 500.0, status)
    }

    fn frame(weight: f64, status: MeasurementStatus) -> Vec<u8> {
        protocol::encode(&reading(weight, status)).to_vec()
    }

    fn start_session(radio: &Arc<MockRadio>, auto_disconnect: bool) -> ScaleSession {
        let config = SessionConfig {
            auto_disconnect_on_final: auto_disconnect,
            ..SessionConfig::default()
        };
        let link = SessionLink {
            radio: radio.clone(),
            peer: PeerId::from("scale"),
            measurement_characteristic: CHARACTERISTIC,
            decoder: protocol::decode,
            adapter: "Test",
        };
        ScaleSession::start(
            link,
            radio.characteristic_updates(),
            radio.connection_events(),
            &config,
        )
    }

    async fn wait_until(
        session: &ScaleSession,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        let mut states = session.subscribe();
        let snapshot = timeout(Duration::from_secs(2), states.wait_for(predicate))
            .await
            .expect("session state not reached")
            .expect("session state channel closed")
            .clone();
        snapshot
    }

    #[test]
    fn test_finalization_fires_at_most_once() {
        let mut snapshot = SessionSnapshot::connected();

        assert!(!snapshot.apply_measurement(reading(60.0, MeasurementStatus::Measuring)));
        assert_eq!(snapshot.phase, SessionPhase::Measuring);

        assert!(snapshot.apply_measurement(reading(64.7, MeasurementStatus::Final)));
        assert_eq!(snapshot.phase, SessionPhase::Finalized);

        assert!(!snapshot.apply_measurement(reading(64.8, MeasurementStatus::Final)));
        assert_eq!(snapshot.phase, SessionPhase::Finalized);
        assert_eq!(snapshot.measurement.unwrap().weight.value, 64.8);
        assert_eq!(snapshot.final_measurement.unwrap().weight.value, 64.7);
    }

    #[test]
    fn test_disconnect_transitions() {
        let mut snapshot = SessionSnapshot::connected();

        assert!(snapshot.begin_disconnect());
        assert_eq!(snapshot.phase, SessionPhase::Disconnecting);
        assert!(snapshot.is_connected);
        assert!(!snapshot.begin_disconnect());

        assert!(snapshot.apply_connection(false));
        assert_eq!(snapshot.phase, SessionPhase::Disconnected);
        assert!(!snapshot.is_connected);
        assert!(!snapshot.apply_connection(false));
        assert!(!snapshot.begin_disconnect());
    }

    #[test]
    fn test_aborted_disconnect_restores_phase() {
        let mut snapshot = SessionSnapshot::connected();
        snapshot.begin_disconnect();
        assert!(snapshot.abort_disconnect());
        assert_eq!(snapshot.phase, SessionPhase::Measuring);
        assert!(!snapshot.abort_disconnect());

        snapshot.apply_measurement(reading(64.7, MeasurementStatus::Final));
        snapshot.begin_disconnect();
        assert!(snapshot.abort_disconnect());
        assert_eq!(snapshot.phase, SessionPhase::Finalized);

        // A link that already went down stays down
        snapshot.begin_disconnect();
        snapshot.apply_connection(false);
        assert!(!snapshot.abort_disconnect());
        assert_eq!(snapshot.phase, SessionPhase::Disconnected);
    }

    #[test]
    fn test_final_frame_while_disconnecting_keeps_phase() {
        let mut snapshot = SessionSnapshot::connected();
        snapshot.begin_disconnect();

        assert!(snapshot.apply_measurement(reading(70.0, MeasurementStatus::Final)));
        assert_eq!(snapshot.phase, SessionPhase::Disconnecting);
    }

    #[tokio::test]
    async fn test_frames_update_measurement_in_order() {
        let radio = Arc::new(MockRadio::new(RadioState::PoweredOn));
        let session = start_session(&radio, false);
        let peer = PeerId::from("scale");

        radio.notify(&peer, CHARACTERISTIC, frame(20.0, MeasurementStatus::Measuring));
        radio.notify(&peer, CHARACTERISTIC, vec![0x00, 0x01, 0x02]);
        radio.notify(&PeerId::from("other"), CHARACTERISTIC, frame(99.0, MeasurementStatus::Measuring));
        radio.notify(&peer, Uuid::nil(), frame(98.0, MeasurementStatus::Measuring));
        radio.notify(&peer, CHARACTERISTIC, frame(42.5, MeasurementStatus::Measuring));

        let snapshot = wait_until(&session, |s| {
            s.measurement.is_some_and(|m| (m.weight.value - 42.5).abs() < 1e-9)
        })
        .await;

        assert_eq!(snapshot.phase, SessionPhase::Measuring);
        assert!(snapshot.is_connected);
        assert!(snapshot.final_measurement.is_none());
    }

    #[tokio::test]
    async fn test_final_measurement_event_published_once() {
        let radio = Arc::new(MockRadio::new(RadioState::PoweredOn));
        let session = start_session(&radio, false);
        let mut events = session.events();
        let peer = PeerId::from("scale");

        radio.notify(&peer, CHARACTERISTIC, frame(64.7, MeasurementStatus::Final));
        radio.notify(&peer, CHARACTERISTIC, frame(64.8, MeasurementStatus::Final));
        radio.notify(&peer, CHARACTERISTIC, frame(10.0, MeasurementStatus::Measuring));

        wait_until(&session, |s| {
            s.measurement.is_some_and(|m| (m.weight.value - 10.0).abs() < 1e-9)
        })
        .await;

        let mut finals = Vec::new();
        let mut measurements = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::FinalMeasurement(m) => finals.push(m),
                SessionEvent::Measurement(_) => measurements += 1,
                _ => {}
            }
        }

        assert_eq!(measurements, 3);
        assert_eq!(finals.len(), 1);
        assert!((finals[0].weight.value - 64.7).abs() < 1e-9);
        assert_eq!(session.phase(), SessionPhase::Finalized);
        assert_eq!(radio.count(|c| matches!(c, RadioCall::Disconnect(_))), 0);
    }

    #[tokio::test]
    async fn test_auto_disconnect_after_final() {
        let radio = Arc::new(MockRadio::new(RadioState::PoweredOn));
        let session = start_session(&radio, true);
        let peer = PeerId::from("scale");

        radio.notify(&peer, CHARACTERISTIC, frame(64.7, MeasurementStatus::Final));

        let measurement = timeout(Duration::from_secs(2), session.wait_for_final_measurement())
            .await
            .unwrap()
            .unwrap();
        assert!((measurement.weight.value - 64.7).abs() < 1e-9);

        let snapshot = wait_until(&session, |s| !s.is_connected).await;
        assert_eq!(snapshot.phase, SessionPhase::Disconnected);
        assert_eq!(radio.count(|c| matches!(c, RadioCall::Disconnect(_))), 1);

        // Still resolves after the link is gone
        assert!(session.wait_for_final_measurement().await.is_ok());
    }

    #[tokio::test]
    async fn test_link_loss_before_final() {
        let radio = Arc::new(MockRadio::new(RadioState::PoweredOn));
        let session = start_session(&radio, true);
        let peer = PeerId::from("scale");

        radio.notify(&peer, CHARACTERISTIC, frame(30.0, MeasurementStatus::Measuring));
        radio.emit_connection(&peer, false);

        let result = timeout(Duration::from_secs(2), session.wait_for_final_measurement())
            .await
            .unwrap();
        assert!(matches!(result, Err(ScaleError::Disconnected)));
        assert!(!session.is_connected());
        assert_eq!(session.phase(), SessionPhase::Disconnected);
        assert_eq!(radio.count(|c| matches!(c, RadioCall::Disconnect(_))), 0);
    }

    #[tokio::test]
    async fn test_disconnect_is_confirmed_asynchronously() {
        let radio = Arc::new(MockRadio::new(RadioState::PoweredOn));
        let session = start_session(&radio, false);

        session.disconnect().await.unwrap();
        assert_eq!(session.phase(), SessionPhase::Disconnecting);

        let snapshot = wait_until(&session, |s| s.phase == SessionPhase::Disconnected).await;
        assert!(!snapshot.is_connected);

        // A second request is a no-op
        session.disconnect().await.unwrap();
        assert_eq!(radio.count(|c| matches!(c, RadioCall::Disconnect(_))), 1);
    }

    #[tokio::test]
    async fn test_failed_disconnect_can_be_retried() {
        let radio = Arc::new(MockRadio::new(RadioState::PoweredOn));
        radio.fail_disconnects(1);
        let session = start_session(&radio, false);

        assert!(session.disconnect().await.is_err());
        assert_eq!(session.phase(), SessionPhase::Measuring);
        assert!(session.is_connected());

        session.disconnect().await.unwrap();
        let snapshot = wait_until(&session, |s| s.phase == SessionPhase::Disconnected).await;
        assert!(!snapshot.is_connected);
        assert_eq!(radio.count(|c| matches!(c, RadioCall::Disconnect(_))), 2);
    }

    #[tokio::test]
    async fn test_failed_auto_disconnect_leaves_session_finalized() {
        let radio = Arc::new(MockRadio::new(RadioState::PoweredOn));
        radio.fail_disconnects(1);
        let session = start_session(&radio, true);
        let peer = PeerId::from("scale");

        radio.notify(&peer, CHARACTERISTIC, frame(64.7, MeasurementStatus::Final));
        timeout(Duration::from_secs(2), async {
            while radio.count(|c| matches!(c, RadioCall::Disconnect(_))) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let snapshot = wait_until(&session, |s| s.phase == SessionPhase::Finalized).await;
        assert!(snapshot.is_connected);

        // Dropping the session retries the teardown
        drop(session);
        timeout(Duration::from_secs(2), async {
            while radio.count(|c| matches!(c, RadioCall::Disconnect(_))) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_debug_output_names_peer_and_phase() {
        let radio = Arc::new(MockRadio::new(RadioState::PoweredOn));
        let session = start_session(&radio, false);

        let output = format!("{session:?}");
        assert!(output.contains("scale"));
        assert!(output.contains("Test"));
        assert!(output.contains("Measuring"));
    }

    #[tokio::test]
    async fn test_updater_publishes_auxiliary_readings() {
        let radio = Arc::new(MockRadio::new(RadioState::PoweredOn));
        let session = start_session(&radio, false);
        let mut events = session.events();

        session.updater().set_battery_level(87);
        session.updater().set_device_info(DeviceInfo {
            model_number: Some("T9147".to_string()),
            ..DeviceInfo::default()
        });

        assert_eq!(session.battery_level(), Some(87));
        assert_eq!(
            session.device_info().and_then(|i| i.model_number),
            Some("T9147".to_string())
        );
        assert_eq!(events.try_recv().unwrap(), SessionEvent::BatteryLevel(87));
    }
}
