#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Smartscale ⚖️
//!
//! A Rust library for reading Bluetooth Low Energy body-composition scales.
//!
//! The library discovers a nearby supported scale, connects to it, decodes the
//! live weight and bioelectrical impedance stream and derives body-composition
//! metrics (BMI, body fat percentage, lean body mass) from the final reading.
//!
//! ## Supported Hardware
//!
//! - **Eufy Smart Scale C1** (T9147): 11-byte measurement frames on
//!   characteristic `FFF4` of service `FFF0`, plus the standard battery and
//!   device information services
//!
//! More scales are added by implementing [`ScaleAdapter`] and registering it in
//! an [`AdapterRegistry`].
//!
//! ## Architecture
//!
//! - [`DiscoveryManager`] waits for the radio, scans for the union of the
//!   services every adapter advertises and hands each discovered peer to the
//!   adapters claiming it until one connects
//! - [`ScaleSession`] owns one live link and publishes the latest measurement,
//!   battery level and connection state
//! - [`Estimator`] turns a final measurement and the user's biometrics into
//!   [`Metrics`]
//! - [`Radio`] and [`HealthStore`] are the host capabilities; [`BtleplugRadio`]
//!   implements the radio on top of `btleplug`
//!
//! ## Quick Start
//!
//! ```no_run
//! use smartscale::{BtleplugRadio, DiscoveryManager, Estimator, BodyCharacteristics};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let radio = Arc::new(BtleplugRadio::new().await?);
//!     let manager = DiscoveryManager::with_defaults(radio);
//!
//!     // Scan and connect to the first scale that answers
//!     let session = manager.connect_to_nearby_scale().await?;
//!
//!     // Step on the scale and wait for the reading to settle
//!     let measurement = session.wait_for_final_measurement().await?;
//!     println!("Weight: {}", measurement.weight);
//!
//!     let metrics = Estimator::new().estimate(&measurement, &BodyCharacteristics::default(), None);
//!     println!("BMI: {:?}", metrics.body_mass_index);
//!
//!     Ok(())
//! }
//! ```

/// Scale hardware adapters and their registry
pub mod adapter;
/// `btleplug` backed radio
pub mod ble;
/// Error types and handling
pub mod error;
/// Health data store integration
pub mod health;
/// Scale discovery and connection
pub mod manager;
pub mod metrics;
/// Measurement frame codec
pub mod protocol;
/// Radio capability used by discovery and sessions
pub mod radio;
/// Live scale connections
pub mod session;
/// Type definitions and data structures
pub mod types;

#[cfg(test)]
mod mock;

// Re-export the main types for convenient usage
pub use adapter::{AdapterRegistry, EufyC1Adapter, ScaleAdapter};
pub use ble::BtleplugRadio;
pub use error::{Result, ScaleError};
pub use health::{record_measurement, HealthAuthorization, HealthSample, HealthStore, Recorded};
pub use manager::DiscoveryManager;
pub use metrics::{Estimator, Metrics};
pub use radio::Radio;
pub use session::{ScaleSession, SessionEvent, SessionPhase, SessionSnapshot};
pub use types::{
    BiologicalSex, BodyCharacteristics, DeviceInfo, DiscoveredPeer, DiscoveryConfig, Length,
    LengthUnit, Mass, MassUnit, Measurement, MeasurementStatus, PeerId, PreferredUnits,
    RadioState, SessionConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
