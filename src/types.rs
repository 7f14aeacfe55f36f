use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};
use uuid::Uuid;

/// GATT service identifier
pub type ServiceId = Uuid;

/// GATT characteristic identifier
pub type CharacteristicId = Uuid;

const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Expand a 16-bit assigned number into a full Bluetooth UUID
#[must_use]
pub const fn bluetooth_uuid(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Power and availability state of the Bluetooth radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadioState {
    /// Radio is switched off
    PoweredOff,
    /// Radio is on and usable
    PoweredOn,
    /// Radio stack is restarting
    Resetting,
    /// The process is not allowed to use the radio
    Unauthorized,
    /// State not reported yet
    Unknown,
    /// The host has no usable Bluetooth LE hardware
    Unsupported,
}

impl RadioState {
    /// Whether scans and connections can be issued
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::PoweredOn)
    }

    /// Whether the radio cannot become ready without external remediation
    #[must_use]
    pub const fn is_permanently_unavailable(self) -> bool {
        matches!(self, Self::Unauthorized | Self::Unsupported)
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoweredOff => write!(f, "powered off"),
            Self::PoweredOn => write!(f, "powered on"),
            Self::Resetting => write!(f, "resetting"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Unknown => write!(f, "unknown"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Identity of a peer as known to the radio
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A peer observed during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPeer {
    /// Peer identity
    pub id: PeerId,
    /// Advertised local name
    pub name: Option<String>,
    /// Advertised service identifiers
    pub services: Vec<ServiceId>,
    /// Raw manufacturer-specific advertisement payload
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    /// Signal strength
    pub rssi: Option<i16>,
}

impl DiscoveredPeer {
    /// Create a peer advertising the given services
    #[must_use]
    pub fn new(id: impl Into<PeerId>, services: Vec<ServiceId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            services,
            manufacturer_data: HashMap::new(),
            rssi: None,
        }
    }

    /// Whether any of `services` is advertised by this peer
    #[must_use]
    pub fn advertises_any(&self, services: &[ServiceId]) -> bool {
        self.services.iter().any(|s| services.contains(s))
    }
}

/// Raw value notification delivered by the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicUpdate {
    /// Peer that sent the value
    pub peer: PeerId,
    /// Characteristic the value belongs to
    pub characteristic: CharacteristicId,
    /// Notified bytes
    pub value: Vec<u8>,
}

/// Link state change reported by the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// Peer whose link changed
    pub peer: PeerId,
    /// New link state
    pub connected: bool,
}

/// Mass unit for weight display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MassUnit {
    /// Grams
    Grams,
    /// Kilograms
    Kilograms,
    /// Avoirdupois pounds
    Pounds,
    /// Avoirdupois ounces
    Ounces,
    /// Imperial stones
    Stones,
}

impl MassUnit {
    /// Kilograms per one of this unit
    #[must_use]
    pub const fn kilograms_per_unit(self) -> f64 {
        match self {
            Self::Grams => 0.001,
            Self::Kilograms => 1.0,
            Self::Pounds => 0.453_592_37,
            Self::Ounces => 0.028_349_523_125,
            Self::Stones => 6.350_293_18,
        }
    }

    /// Person-weight unit customary for a POSIX locale name such as `en_US.UTF-8`
    #[must_use]
    pub fn for_locale(locale: &str) -> Self {
        let tag = locale
            .split(['.', '@'])
            .next()
            .unwrap_or_default()
            .replace('-', "_");
        match tag.as_str() {
            "en_US" | "en_LR" | "my_MM" => Self::Pounds,
            "en_GB" => Self::Stones,
            _ => Self::Kilograms,
        }
    }

    /// Person-weight unit of the current process locale
    #[must_use]
    pub fn locale_default() -> Self {
        ["LC_ALL", "LC_MEASUREMENT", "LANG"]
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .find(|value| !value.is_empty())
            .map_or(Self::Kilograms, |locale| Self::for_locale(&locale))
    }
}

impl fmt::Display for MassUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grams => write!(f, "g"),
            Self::Kilograms => write!(f, "kg"),
            Self::Pounds => write!(f, "lb"),
            Self::Ounces => write!(f, "oz"),
            Self::Stones => write!(f, "st"),
        }
    }
}

/// A unit-tagged mass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mass {
    /// Magnitude
    pub value: f64,
    /// Unit of `value`
    pub unit: MassUnit,
}

impl Mass {
    /// Create a new mass
    #[must_use]
    pub const fn new(value: f64, unit: MassUnit) -> Self {
        Self { value, unit }
    }

    /// Create a mass in kilograms
    #[must_use]
    pub const fn kilograms(value: f64) -> Self {
        Self::new(value, MassUnit::Kilograms)
    }

    /// Magnitude in kilograms
    #[must_use]
    pub fn as_kilograms(&self) -> f64 {
        self.value * self.unit.kilograms_per_unit()
    }

    /// Convert to the specified unit
    #[must_use]
    pub fn convert_to(&self, unit: MassUnit) -> Self {
        if self.unit == unit {
            return *self;
        }
        Self::new(self.as_kilograms() / unit.kilograms_per_unit(), unit)
    }
}

impl fmt::Display for Mass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} {}", self.value, self.unit)
    }
}

/// Length unit for body height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LengthUnit {
    /// Meters
    Meters,
    /// Centimeters
    Centimeters,
    /// Inches
    Inches,
    /// Feet
    Feet,
}

impl LengthUnit {
    /// Meters per one of this unit
    #[must_use]
    pub const fn meters_per_unit(self) -> f64 {
        match self {
            Self::Meters => 1.0,
            Self::Centimeters => 0.01,
            Self::Inches => 0.0254,
            Self::Feet => 0.3048,
        }
    }
}

/// A unit-tagged length
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Length {
    /// Magnitude
    pub value: f64,
    /// Unit of `value`
    pub unit: LengthUnit,
}

impl Length {
    /// Create a new length
    #[must_use]
    pub const fn new(value: f64, unit: LengthUnit) -> Self {
        Self { value, unit }
    }

    /// Create a length in meters
    #[must_use]
    pub const fn meters(value: f64) -> Self {
        Self::new(value, LengthUnit::Meters)
    }

    /// Magnitude in meters
    #[must_use]
    pub fn as_meters(&self) -> f64 {
        self.value * self.unit.meters_per_unit()
    }
}

/// Measurement progress reported by the scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasurementStatus {
    /// Weigh-in complete, values are stable
    Final,
    /// Weigh-in still settling
    Measuring,
    /// Load exceeds the scale's capacity
    OverWeight,
    /// Unrecognized status code
    Unknown,
}

impl From<u8> for MeasurementStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Final,
            1 => Self::Measuring,
            2 => Self::OverWeight,
            _ => Self::Unknown,
        }
    }
}

impl From<MeasurementStatus> for u8 {
    fn from(value: MeasurementStatus) -> Self {
        match value {
            MeasurementStatus::Final => 0,
            MeasurementStatus::Measuring => 1,
            MeasurementStatus::OverWeight => 2,
            MeasurementStatus::Unknown => 0xFF,
        }
    }
}

impl fmt::Display for MeasurementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Final => write!(f, "Final"),
            Self::Measuring => write!(f, "Measuring"),
            Self::OverWeight => write!(f, "Over Weight"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A single decoded scale reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Weight on the platform
    pub weight: Mass,
    /// Bioelectrical impedance in ohms
    pub impedance: f64,
    /// Measurement progress
    pub status: MeasurementStatus,
}

impl Measurement {
    /// Create a new measurement
    #[must_use]
    pub const fn new(weight: Mass, impedance: f64, status: MeasurementStatus) -> Self {
        Self {
            weight,
            impedance,
            status,
        }
    }

    /// Whether this reading completes the weigh-in
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.status == MeasurementStatus::Final
    }
}

/// Biological sex as recorded in the health store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BiologicalSex {
    /// Male
    Male,
    /// Female
    Female,
    /// Not set or other
    #[default]
    Unknown,
}

/// User biometrics needed for body-composition estimation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyCharacteristics {
    /// Date of birth
    pub birth_date: Option<NaiveDate>,
    /// Body height
    pub height: Option<Length>,
    /// Biological sex
    pub biological_sex: BiologicalSex,
}

impl BodyCharacteristics {
    /// Create a new set of characteristics
    #[must_use]
    pub const fn new(
        birth_date: Option<NaiveDate>,
        height: Option<Length>,
        biological_sex: BiologicalSex,
    ) -> Self {
        Self {
            birth_date,
            height,
            biological_sex,
        }
    }

    /// Age in fractional years today
    #[must_use]
    pub fn age(&self) -> Option<f64> {
        self.age_at(Local::now().date_naive())
    }

    /// Age in fractional years at `date`: whole years plus days since the last birthday / 365
    #[must_use]
    pub fn age_at(&self, date: NaiveDate) -> Option<f64> {
        let birth = self.birth_date?;
        if date < birth {
            return Some(0.0);
        }

        let mut years = date.year() - birth.year();
        if (date.month(), date.day()) < (birth.month(), birth.day()) {
            years -= 1;
        }

        let anniversary_year = birth.year() + years;
        let last_birthday = birth
            .with_year(anniversary_year)
            .or_else(|| NaiveDate::from_ymd_opt(anniversary_year, 3, 1))?;
        #[allow(clippy::cast_precision_loss)]
        let days = (date - last_birthday).num_days() as f64;

        Some(f64::from(years) + days / 365.0)
    }
}

/// Display units preferred by the user for mass quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredUnits {
    /// Unit for body mass
    pub body_mass: MassUnit,
    /// Unit for lean body mass
    pub lean_body_mass: MassUnit,
}

impl PreferredUnits {
    /// Use the same unit for every mass quantity
    #[must_use]
    pub const fn uniform(unit: MassUnit) -> Self {
        Self {
            body_mass: unit,
            lean_body_mass: unit,
        }
    }
}

/// Device information strings read from a connected scale
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Model number string
    pub model_number: Option<String>,
    /// Serial number string
    pub serial_number: Option<String>,
    /// Firmware revision string
    pub firmware_revision: Option<String>,
    /// Hardware revision string
    pub hardware_revision: Option<String>,
    /// Software revision string
    pub software_revision: Option<String>,
    /// Manufacturer name string
    pub manufacturer_name: Option<String>,
}

/// Scale session parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Link establishment timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Request disconnect once the final measurement has been produced
    pub auto_disconnect_on_final: bool,
    /// Capacity of the session event channel
    pub event_capacity: usize,
    /// Attempts for best-effort reads (battery, device information)
    pub auxiliary_read_attempts: u32,
    /// Delay between best-effort read attempts in milliseconds
    pub auxiliary_retry_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 15_000,
            auto_disconnect_on_final: true,
            event_capacity: 64,
            auxiliary_read_attempts: 3,
            auxiliary_retry_delay_ms: 500,
        }
    }
}

/// Discovery and connection parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Maximum wait for the radio to power on, in milliseconds
    pub ready_timeout_ms: u64,
    /// Overall scan duration limit in milliseconds, unbounded when `None`
    pub scan_timeout_ms: Option<u64>,
    /// Parameters for sessions created by this manager
    pub session: SessionConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 10_000,
            scan_timeout_ms: None,
            session: SessionConfig::default(),
        }
    }
}
