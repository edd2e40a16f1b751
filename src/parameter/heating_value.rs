//! Heating-value basis of energy quantities and conversion between LHV and HHV

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TechDataError};
use super::Parameter;

/// Lower or higher heating value basis
///
/// Deserialization accepts exactly the spellings `FromStr` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum HeatingValue {
    #[serde(rename = "LHV")]
    Lhv,
    #[serde(rename = "HHV")]
    Hhv,
}

impl fmt::Display for HeatingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeatingValue::Lhv => write!(f, "LHV"),
            HeatingValue::Hhv => write!(f, "HHV"),
        }
    }
}

impl FromStr for HeatingValue {
    type Err = TechDataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "LHV" | "lhv" | "lower_heating_value" | "NCV" | "net_calorific_value" => Ok(HeatingValue::Lhv),
            "HHV" | "hhv" | "higher_heating_value" | "GCV" | "gross_calorific_value" => Ok(HeatingValue::Hhv),
            other => Err(TechDataError::Schema(format!("unknown heating value '{}'", other))),
        }
    }
}

impl TryFrom<String> for HeatingValue {
    type Error = TechDataError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Energy density in GJ/t: (carrier, LHV, HHV)
const ENERGY_DENSITIES: &[(&str, f64, f64)] = &[
    ("H2", 119.6, 141.8),
    ("CH4", 50.0, 55.5),
];

/// Energy density of a canonical carrier on the given basis, in GJ/t
pub fn energy_density(carrier: &str, basis: HeatingValue) -> Option<f64> {
    ENERGY_DENSITIES
        .iter()
        .find(|(name, _, _)| *name == carrier)
        .map(|(_, lhv, hhv)| match basis {
            HeatingValue::Lhv => *lhv,
            HeatingValue::Hhv => *hhv,
        })
}

impl Parameter {
    /// Re-express an energy-related quantity on another heating-value basis
    ///
    /// LHV to HHV multiplies by the carrier's HHV/LHV ratio, HHV to LHV
    /// divides by it. Carriers without a known energy density keep their
    /// magnitude and only the tag changes.
    pub fn change_heating_value(&self, to: HeatingValue) -> Result<Parameter> {
        let carrier = self.carrier.as_deref().ok_or_else(|| {
            TechDataError::Schema("cannot change heating value of a parameter without a carrier".to_string())
        })?;
        let from = self.heating_value.ok_or_else(|| {
            TechDataError::Schema(format!("parameter with carrier '{}' has no heating value to change", carrier))
        })?;

        if from == to {
            return Ok(self.clone());
        }

        let ratio = match (
            energy_density(carrier, HeatingValue::Lhv),
            energy_density(carrier, HeatingValue::Hhv),
        ) {
            (Some(lhv), Some(hhv)) => hhv / lhv,
            _ => {
                log::error!("No energy density available for carrier '{}', keeping magnitude", carrier);
                1.0
            }
        };

        let multiplier = match to {
            HeatingValue::Hhv => ratio,
            HeatingValue::Lhv => 1.0 / ratio,
        };

        Ok(Parameter {
            magnitude: self.magnitude * multiplier,
            heating_value: Some(to),
            ..self.clone()
        })
    }
}
