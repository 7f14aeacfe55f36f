//! Body-composition estimation from a weight and impedance reading
//!
//! The fat percentage comes from an empirical bioelectrical impedance formula.
//! All inputs are normalized to kilograms, meters and ohms first; only the
//! returned masses are expressed in the caller's preferred units.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{
    BiologicalSex, BodyCharacteristics, Mass, MassUnit, Measurement, PreferredUnits,
};

/// Fat percentage reported when the formula leaves its valid range
pub const OUT_OF_RANGE_FAT_PERCENTAGE: f64 = 0.75;

/// Highest fat percentage the formula is trusted for
pub const MAX_PLAUSIBLE_FAT_PERCENTAGE: f64 = 0.63;

/// Derived body-composition figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Weight in the preferred body mass unit
    pub body_mass: Mass,
    /// Fat-free mass in the preferred lean body mass unit
    pub lean_body_mass: Option<Mass>,
    /// Body mass index in kg/m²
    pub body_mass_index: Option<f64>,
    /// Body fat as a fraction (0.25 is 25 %)
    pub body_fat_percentage: Option<f64>,
}

/// Estimator with its unit and clock defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimator {
    /// Unit used when the caller has no preference
    pub default_mass_unit: MassUnit,
    /// Date ages are computed at, today when `None`
    pub reference_date: Option<NaiveDate>,
}

impl Default for Estimator {
    fn default() -> Self {
        Self {
            default_mass_unit: MassUnit::locale_default(),
            reference_date: None,
        }
    }
}

impl Estimator {
    /// Estimator using the locale's mass unit and today's date
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `unit` when no preference is supplied
    #[must_use]
    pub const fn with_default_mass_unit(mut self, unit: MassUnit) -> Self {
        self.default_mass_unit = unit;
        self
    }

    /// Compute ages at `date` instead of today
    #[must_use]
    pub const fn at_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    /// Derive metrics for one measurement
    #[must_use]
    pub fn estimate(
        &self,
        measurement: &Measurement,
        characteristics: &BodyCharacteristics,
        units: Option<&PreferredUnits>,
    ) -> Metrics {
        let units = units
            .copied()
            .unwrap_or_else(|| PreferredUnits::uniform(self.default_mass_unit));
        let age = match self.reference_date {
            Some(date) => characteristics.age_at(date),
            None => characteristics.age(),
        };

        estimate(
            measurement,
            characteristics.height.map(|h| h.as_meters()),
            age,
            characteristics.biological_sex,
            &units,
        )
    }
}

/// Derive metrics from normalized inputs
///
/// BMI needs the height; lean mass and fat percentage need both height and age
/// and a positive weight.
#[must_use]
pub fn estimate(
    measurement: &Measurement,
    height_m: Option<f64>,
    age_years: Option<f64>,
    sex: BiologicalSex,
    units: &PreferredUnits,
) -> Metrics {
    let weight_kg = measurement.weight.as_kilograms();

    let body_fat_percentage = height_m
        .zip(age_years)
        .filter(|_| weight_kg > 0.0)
        .map(|(height_m, age_years)| {
            fat_percentage(sex, age_years, weight_kg, height_m, measurement.impedance)
        });

    Metrics {
        body_mass: measurement.weight.convert_to(units.body_mass),
        lean_body_mass: body_fat_percentage.map(|fat| {
            let lean = measurement.weight.convert_to(units.lean_body_mass);
            Mass::new(lean.value * (1.0 - fat), lean.unit)
        }),
        body_mass_index: height_m.map(|height_m| body_mass_index(weight_kg, height_m)),
        body_fat_percentage,
    }
}

/// Weight over height squared
#[must_use]
pub fn body_mass_index(weight_kg: f64, height_m: f64) -> f64 {
    weight_kg / (height_m * height_m)
}

/// Lean body mass coefficient before the sex and age correction
#[must_use]
pub fn lbm_coefficient(height_m: f64, weight_kg: f64, impedance_ohms: f64, age_years: f64) -> f64 {
    height_m * 9.058 * height_m + weight_kg * 0.32 + 12.226
        - impedance_ohms * 0.0068
        - age_years * 0.0542
}

/// Body fat as a fraction of body mass
///
/// Results above [`MAX_PLAUSIBLE_FAT_PERCENTAGE`] are replaced with
/// [`OUT_OF_RANGE_FAT_PERCENTAGE`].
#[must_use]
pub fn fat_percentage(
    sex: BiologicalSex,
    age_years: f64,
    weight_kg: f64,
    height_m: f64,
    impedance_ohms: f64,
) -> f64 {
    let constant = match sex {
        BiologicalSex::Female if age_years <= 49.0 => 9.25,
        BiologicalSex::Female => 7.25,
        BiologicalSex::Male | BiologicalSex::Unknown => 0.8,
    };

    let tall = if height_m > 1.6 { 1.03 } else { 1.0 };
    // Female 50-60 kg falls through to 1.0
    let coefficient = match sex {
        BiologicalSex::Male if weight_kg < 61.0 => 0.98,
        BiologicalSex::Female if weight_kg > 60.0 => 0.96 * tall,
        BiologicalSex::Female if weight_kg < 50.0 => 1.02 * tall,
        _ => 1.0,
    };

    let lbm = lbm_coefficient(height_m, weight_kg, impedance_ohms, age_years);
    let fat = 1.0 - ((lbm - constant) * coefficient) / weight_kg;

    if fat > MAX_PLAUSIBLE_FAT_PERCENTAGE {
        OUT_OF_RANGE_FAT_PERCENTAGE
    } else {
        fat
    }
}
