//! Parameter value type: magnitude, unit, carrier/heating-value tags and provenance
//!
//! Parameters are values. Conversion, arithmetic and annotation all return a
//! new `Parameter`; nothing is modified in place.
//!
//! Arithmetic keeps only the left operand's carrier, heating value,
//! provenance, note and sources. The right operand's metadata is dropped.

mod currency;
mod heating_value;
mod sources;

pub use currency::{
    ConversionRequest, CountryLookup, CurrencyContext, DataSource, Deflator, StaticCountryLookup,
};
pub use heating_value::{energy_density, HeatingValue};
pub use sources::{Source, SourceCollection};

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TechDataError};
use crate::units::{self, Unit};

/// Carrier aliases mapped to their canonical symbol
const CARRIER_ALIASES: &[(&str, &str)] = &[
    ("hydrogen", "H2"),
    ("methane", "CH4"),
    ("carbon_dioxide", "CO2"),
    ("carbon_monoxide", "CO"),
    ("oxygen", "O2"),
    ("nitrogen", "N2"),
    ("water", "H2O"),
    ("carbon", "C"),
];

/// Canonical name of an energy carrier; unknown carriers are kept as given
pub fn canonical_carrier(carrier: &str) -> String {
    let trimmed = carrier.trim();
    CARRIER_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(trimmed))
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// A techno-economic quantity with its unit, tags and provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParameterRecord")]
pub struct Parameter {
    magnitude: f64,
    units: Unit,
    #[serde(skip_serializing_if = "Option::is_none")]
    carrier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    heating_value: Option<HeatingValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provenance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    #[serde(skip_serializing_if = "SourceCollection::is_empty")]
    sources: SourceCollection,
}

/// Serialized form of [`Parameter`], validated on the way in
#[derive(Deserialize)]
struct ParameterRecord {
    magnitude: f64,
    #[serde(default)]
    units: Unit,
    #[serde(default)]
    carrier: Option<String>,
    #[serde(default)]
    heating_value: Option<HeatingValue>,
    #[serde(default)]
    provenance: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    sources: SourceCollection,
}

impl TryFrom<ParameterRecord> for Parameter {
    type Error = TechDataError;

    fn try_from(record: ParameterRecord) -> Result<Self> {
        Parameter {
            magnitude: record.magnitude,
            units: record.units,
            carrier: record.carrier,
            heating_value: record.heating_value,
            provenance: record.provenance,
            note: record.note,
            sources: record.sources,
        }
        .normalized()
    }
}

/// Builder for [`Parameter`]; `build` validates the tags
#[derive(Debug, Clone)]
pub struct ParameterBuilder {
    magnitude: f64,
    units: Option<String>,
    carrier: Option<String>,
    heating_value: Option<HeatingValue>,
    provenance: Option<String>,
    note: Option<String>,
    sources: SourceCollection,
}

impl ParameterBuilder {
    pub fn units(mut self, units: &str) -> Self {
        self.units = Some(units.to_string());
        self
    }

    pub fn carrier(mut self, carrier: &str) -> Self {
        self.carrier = Some(carrier.to_string());
        self
    }

    pub fn heating_value(mut self, heating_value: HeatingValue) -> Self {
        self.heating_value = Some(heating_value);
        self
    }

    pub fn provenance(mut self, provenance: &str) -> Self {
        self.provenance = Some(provenance.to_string());
        self
    }

    pub fn note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    pub fn sources(mut self, sources: SourceCollection) -> Self {
        self.sources = sources;
        self
    }

    pub fn build(self) -> Result<Parameter> {
        let units = match self.units {
            Some(text) => text.parse::<Unit>()?,
            None => Unit::dimensionless(),
        };
        Parameter {
            magnitude: self.magnitude,
            units,
            carrier: self.carrier,
            heating_value: self.heating_value,
            provenance: self.provenance,
            note: self.note,
            sources: self.sources,
        }
        .normalized()
    }
}

impl Parameter {
    pub fn builder(magnitude: f64) -> ParameterBuilder {
        ParameterBuilder {
            magnitude,
            units: None,
            carrier: None,
            heating_value: None,
            provenance: None,
            note: None,
            sources: SourceCollection::default(),
        }
    }

    /// Shorthand for a parameter with only a magnitude and a unit string
    pub fn new(magnitude: f64, units: &str) -> Result<Self> {
        Self::builder(magnitude).units(units).build()
    }

    pub fn from_unit(magnitude: f64, units: Unit) -> Self {
        Self {
            magnitude,
            units,
            carrier: None,
            heating_value: None,
            provenance: None,
            note: None,
            sources: SourceCollection::default(),
        }
    }

    /// Validate tags and canonicalise the carrier name
    ///
    /// A heating value only makes sense relative to a carrier.
    pub fn normalized(mut self) -> Result<Self> {
        self.carrier = self.carrier.as_deref().map(canonical_carrier).filter(|c| !c.is_empty());
        if self.heating_value.is_some() && self.carrier.is_none() {
            return Err(TechDataError::Schema(
                "heating value cannot be set without a carrier".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn units(&self) -> &Unit {
        &self.units
    }

    pub fn carrier(&self) -> Option<&str> {
        self.carrier.as_deref()
    }

    pub fn heating_value(&self) -> Option<HeatingValue> {
        self.heating_value
    }

    pub fn provenance(&self) -> Option<&str> {
        self.provenance.as_deref()
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn sources(&self) -> &SourceCollection {
        &self.sources
    }

    /// Copy with a different magnitude, everything else unchanged
    pub fn with_magnitude(&self, magnitude: f64) -> Parameter {
        Parameter { magnitude, ..self.clone() }
    }

    pub fn with_provenance(&self, provenance: impl Into<String>) -> Parameter {
        Parameter { provenance: Some(provenance.into()), ..self.clone() }
    }

    pub fn with_note(&self, note: Option<String>) -> Parameter {
        Parameter { note, ..self.clone() }
    }

    pub fn with_sources(&self, sources: SourceCollection) -> Parameter {
        Parameter { sources, ..self.clone() }
    }

    /// Convert to another unit without touching currencies
    pub fn to(&self, target: &str) -> Result<Parameter> {
        let target: Unit = target.parse()?;
        self.to_unit(&target)
    }

    pub fn to_unit(&self, target: &Unit) -> Result<Parameter> {
        let magnitude = units::convert(self.magnitude, &self.units, target)?;
        Ok(Parameter { magnitude, units: target.clone(), ..self.clone() })
    }

    /// Carrier and heating value must match for additive operations
    pub fn check_compatibility(&self, other: &Parameter) -> Result<()> {
        if self.carrier != other.carrier {
            return Err(TechDataError::Incompatible {
                attribute: "carrier",
                left: self.carrier.clone().unwrap_or_default(),
                right: other.carrier.clone().unwrap_or_default(),
            });
        }
        if self.heating_value != other.heating_value {
            return Err(TechDataError::Incompatible {
                attribute: "heating value",
                left: self.heating_value.map(|hv| hv.to_string()).unwrap_or_default(),
                right: other.heating_value.map(|hv| hv.to_string()).unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Right operand's magnitude expressed in this parameter's unit
    fn aligned_magnitude(&self, other: &Parameter) -> Result<f64> {
        self.check_compatibility(other)?;
        units::convert(other.magnitude, &other.units, &self.units).map_err(|_| {
            TechDataError::Incompatible {
                attribute: "units",
                left: self.units.to_string(),
                right: other.units.to_string(),
            }
        })
    }

    pub fn try_add(&self, other: &Parameter) -> Result<Parameter> {
        let rhs = self.aligned_magnitude(other)?;
        Ok(self.with_magnitude(self.magnitude + rhs))
    }

    pub fn try_sub(&self, other: &Parameter) -> Result<Parameter> {
        let rhs = self.aligned_magnitude(other)?;
        Ok(self.with_magnitude(self.magnitude - rhs))
    }

    /// Multiply by a dimensionless factor
    pub fn scale(&self, factor: f64) -> Parameter {
        self.with_magnitude(self.magnitude * factor)
    }

    pub fn powi(&self, exponent: i32) -> Parameter {
        Parameter {
            magnitude: self.magnitude.powi(exponent),
            units: self.units.powi(exponent),
            ..self.clone()
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.magnitude, self.units)?;
        if let Some(carrier) = &self.carrier {
            write!(f, " [{}", carrier)?;
            if let Some(hv) = self.heating_value {
                write!(f, ", {}", hv)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl Add for &Parameter {
    type Output = Result<Parameter>;

    fn add(self, rhs: &Parameter) -> Result<Parameter> {
        self.try_add(rhs)
    }
}

impl Sub for &Parameter {
    type Output = Result<Parameter>;

    fn sub(self, rhs: &Parameter) -> Result<Parameter> {
        self.try_sub(rhs)
    }
}

impl Mul for &Parameter {
    type Output = Parameter;

    fn mul(self, rhs: &Parameter) -> Parameter {
        Parameter {
            magnitude: self.magnitude * rhs.magnitude,
            units: &self.units * &rhs.units,
            ..self.clone()
        }
    }
}

impl Div for &Parameter {
    type Output = Parameter;

    fn div(self, rhs: &Parameter) -> Parameter {
        Parameter {
            magnitude: self.magnitude / rhs.magnitude,
            units: &self.units / &rhs.units,
            ..self.clone()
        }
    }
}

impl Mul<f64> for &Parameter {
    type Output = Parameter;

    fn mul(self, rhs: f64) -> Parameter {
        self.scale(rhs)
    }
}

impl Div<f64> for &Parameter {
    type Output = Parameter;

    fn div(self, rhs: f64) -> Parameter {
        self.with_magnitude(self.magnitude / rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn h2(magnitude: f64, units: &str, hv: HeatingValue) -> Parameter {
        Parameter::builder(magnitude)
            .units(units)
            .carrier("H2")
            .heating_value(hv)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_canonicalises_carrier() {
        let p = Parameter::builder(1.0).units("MWh").carrier("hydrogen").build().unwrap();
        assert_eq!(p.carrier(), Some("H2"));
        let q = Parameter::builder(1.0).units("MWh").carrier("el").build().unwrap();
        assert_eq!(q.carrier(), Some("el"));
    }

    #[test]
    fn test_heating_value_requires_carrier() {
        let result = Parameter::builder(1.0).units("MWh").heating_value(HeatingValue::Lhv).build();
        assert!(matches!(result, Err(TechDataError::Schema(_))));
    }

    #[test]
    fn test_to_round_trip() {
        let p = Parameter::new(1234.5, "EUR_2020/kW").unwrap();
        let there = p.to("EUR_2020/MW").unwrap();
        assert_relative_eq!(there.magnitude(), 1_234_500.0, max_relative = 1e-12);
        let back = there.to("EUR_2020/kW").unwrap();
        assert_relative_eq!(back.magnitude(), p.magnitude(), max_relative = 1e-12);
        assert_eq!(back.units(), p.units());
    }

    #[test]
    fn test_to_rejects_currency_conversion() {
        let p = Parameter::new(1.0, "EUR_2020/kW").unwrap();
        let err = p.to("USD_2020/kW").unwrap_err();
        assert!(matches!(err, TechDataError::Unit(crate::error::UnitError::CurrencyMismatch { .. })));
        let err = p.to("EUR_2020").unwrap_err();
        assert!(matches!(err, TechDataError::Unit(crate::error::UnitError::Incompatible { .. })));
    }

    #[test]
    fn test_add_then_sub_recovers_left() {
        let a = h2(3.5, "MWh", HeatingValue::Lhv);
        let b = h2(1200.0, "kWh", HeatingValue::Lhv);
        let sum = (&a + &b).unwrap();
        assert_relative_eq!(sum.magnitude(), 4.7, max_relative = 1e-12);
        let back = (&sum - &b).unwrap();
        assert_relative_eq!(back.magnitude(), a.magnitude(), max_relative = 1e-12);
        assert_eq!(back.units(), a.units());
    }

    #[test]
    fn test_add_rejects_different_heating_values() {
        let a = h2(1.0, "USD_2020/kW", HeatingValue::Lhv);
        let b = h2(1.0, "USD_2020/kW", HeatingValue::Hhv);
        match &a + &b {
            Err(TechDataError::Incompatible { attribute, .. }) => assert_eq!(attribute, "heating value"),
            other => panic!("expected incompatibility, got {:?}", other),
        }
    }

    #[test]
    fn test_add_rejects_different_carriers_and_units() {
        let a = Parameter::builder(1.0).units("MWh").carrier("H2").build().unwrap();
        let b = Parameter::builder(1.0).units("MWh").carrier("CH4").build().unwrap();
        assert!(matches!(a.try_add(&b), Err(TechDataError::Incompatible { attribute: "carrier", .. })));

        let c = Parameter::new(1.0, "EUR_2020").unwrap();
        let d = Parameter::new(1.0, "USD_2020").unwrap();
        assert!(matches!(c.try_sub(&d), Err(TechDataError::Incompatible { attribute: "units", .. })));
    }

    #[test]
    fn test_mul_div_combine_units_and_keep_left_metadata() {
        let invest = Parameter::builder(1000.0)
            .units("EUR_2020")
            .carrier("H2")
            .provenance("left")
            .build()
            .unwrap();
        let capacity = Parameter::builder(10.0)
            .units("kW")
            .carrier("el")
            .heating_value(HeatingValue::Hhv)
            .provenance("right")
            .build()
            .unwrap();

        let specific = &invest / &capacity;
        assert_relative_eq!(specific.magnitude(), 100.0);
        assert_eq!(specific.units().to_string(), "EUR_2020/kW");
        assert_eq!(specific.carrier(), Some("H2"));
        assert_eq!(specific.heating_value(), None);
        assert_eq!(specific.provenance(), Some("left"));

        let back = &specific * &capacity;
        assert_relative_eq!(back.magnitude(), 1000.0);
        assert_eq!(back.units(), invest.units());
    }

    #[test]
    fn test_scalar_ops_and_powers() {
        let p = Parameter::new(4.0, "m").unwrap();
        assert_relative_eq!((&p * 2.5).magnitude(), 10.0);
        assert_relative_eq!((&p / 2.0).magnitude(), 2.0);
        let area = p.powi(2);
        assert_relative_eq!(area.magnitude(), 16.0);
        assert_eq!(area.units().to_string(), "m^2");
    }

    #[test]
    fn test_serde_round_trip() {
        let p = h2(42.0, "EUR_2020/kW", HeatingValue::Hhv).with_provenance("test");
        let json = serde_json::to_string(&p).unwrap();
        let back: Parameter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_deserialize_validates_tags() {
        let orphan = serde_json::from_str::<Parameter>(r#"{"magnitude": 1.0, "units": "MWh", "heating_value": "LHV"}"#);
        assert!(orphan.is_err());

        let p: Parameter = serde_json::from_str(
            r#"{"magnitude": 33.3, "units": "kWh/kg", "carrier": " hydrogen ", "heating_value": "LHV"}"#,
        )
        .unwrap();
        assert_eq!(p.carrier(), Some("H2"));
        assert_eq!(p.units().to_string(), "kWh/kg");

        let bare: Parameter = serde_json::from_str(r#"{"magnitude": 2.0}"#).unwrap();
        assert!(bare.units().is_dimensionless());
        assert_eq!(bare.carrier(), None);
    }
}
