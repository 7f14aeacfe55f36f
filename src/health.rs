use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::{
    error::Result,
    metrics::{Estimator, Metrics},
    types::{BodyCharacteristics, Measurement, PreferredUnits},
};

/// Sharing permission granted by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthAuthorization {
    /// Permission was never asked for
    NotRequested,
    /// Permission was asked for only some of the quantities
    PartiallyRequested,
    /// Sharing was granted for at least one quantity
    ///
    /// The store drops quantities the user did not grant.
    Authorized,
    /// The user refused
    Denied,
}

impl fmt::Display for HealthAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRequested => write!(f, "not requested"),
            Self::PartiallyRequested => write!(f, "partially requested"),
            Self::Authorized => write!(f, "authorized"),
            Self::Denied => write!(f, "denied"),
        }
    }
}

/// Host health data store
///
/// Reads never fail hard: characteristics the store does not know are `None`.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Whether the host has a health store at all
    fn is_available(&self) -> bool;

    /// Current sharing permission
    fn authorization_status(&self) -> HealthAuthorization;

    /// Ask the user for read and share permission
    ///
    /// # Errors
    ///
    /// Returns [`crate::ScaleError::HealthStore`] if the request cannot be made.
    async fn request_authorization(&self) -> Result<()>;

    /// Birth date, height and biological sex as far as known
    async fn read_body_characteristics(&self) -> BodyCharacteristics;

    /// Units the user prefers for mass quantities
    ///
    /// # Errors
    ///
    /// Returns [`crate::ScaleError::HealthStore`] if the preference cannot be read.
    async fn read_preferred_units(&self) -> Result<PreferredUnits>;

    /// Persist one sample
    ///
    /// # Errors
    ///
    /// Returns [`crate::ScaleError::HealthStore`] if the store rejects the sample.
    async fn share(&self, sample: &HealthSample) -> Result<()>;
}

/// One quantity written to the health store, in store units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HealthQuantity {
    /// Body mass in grams
    BodyMass(f64),
    /// Lean body mass in grams
    LeanBodyMass(f64),
    /// Body mass index, unitless
    BodyMassIndex(f64),
    /// Body fat as a fraction
    BodyFatPercentage(f64),
}

/// Timestamped set of quantities from one weigh-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    /// When the weigh-in finished
    pub date: DateTime<Utc>,
    /// Quantities to write
    pub quantities: Vec<HealthQuantity>,
}

impl HealthSample {
    /// Sample of `metrics` taken now
    #[must_use]
    pub fn from_metrics(metrics: &Metrics) -> Self {
        Self::from_metrics_at(metrics, Utc::now())
    }

    /// Sample of `metrics` taken at `date`; absent metrics are skipped
    #[must_use]
    pub fn from_metrics_at(metrics: &Metrics, date: DateTime<Utc>) -> Self {
        let mut quantities = vec![HealthQuantity::BodyMass(
            metrics.body_mass.as_kilograms() * 1000.0,
        )];

        if let Some(lean) = metrics.lean_body_mass {
            quantities.push(HealthQuantity::LeanBodyMass(lean.as_kilograms() * 1000.0));
        }
        if let Some(bmi) = metrics.body_mass_index {
            quantities.push(HealthQuantity::BodyMassIndex(bmi));
        }
        if let Some(fat) = metrics.body_fat_percentage {
            quantities.push(HealthQuantity::BodyFatPercentage(fat));
        }

        Self { date, quantities }
    }
}

/// Outcome of [`record_measurement`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recorded {
    /// Estimated metrics
    pub metrics: Metrics,
    /// Whether the sample was written to the store
    pub shared: bool,
}

/// Estimate metrics for a final measurement and share them when permitted
///
/// Biometrics and preferred units come from the store. A missing unit
/// preference falls back to the estimator's default unit. The sample is only
/// written when the store is available and fully authorized.
///
/// # Errors
///
/// Returns the store's error if writing the sample fails.
pub async fn record_measurement(
    store: &dyn HealthStore,
    estimator: &Estimator,
    measurement: &Measurement,
) -> Result<Recorded> {
    let units = match store.read_preferred_units().await {
        Ok(units) => Some(units),
        Err(e) => {
            warn!("Preferred units unavailable, using {}: {}", estimator.default_mass_unit, e);
            None
        }
    };
    let characteristics = store.read_body_characteristics().await;
    debug!("Body characteristics: {:?}", characteristics);

    let metrics = estimator.estimate(measurement, &characteristics, units.as_ref());

    let authorization = store.authorization_status();
    if !store.is_available() || authorization != HealthAuthorization::Authorized {
        info!("Not sharing measurement, health store {}", authorization);
        return Ok(Recorded {
            metrics,
            shared: false,
        });
    }

    store.share(&HealthSample::from_metrics(&metrics)).await?;
    info!("Measurement of {} shared with the health store", metrics.body_mass);

    Ok(Recorded {
        metrics,
        shared: true,
    })
}
