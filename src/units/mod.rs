//! Unit algebra: SI-like physical units plus synthetic currency-year units
//!
//! A [`Unit`] is an ordered product of atoms raised to integer exponents.
//! Physical atoms (`kW`, `MWh`, `a`, ...) carry a scale and a dimension;
//! currency atoms (`USD_2020`) form their own family that plain dimensional
//! conversion never crosses. Converting between currencies or years needs
//! deflation data and goes through `Parameter::change_currency`.

mod currency;
mod dimension;
mod parse;

pub use currency::{
    extract_currency_units, extract_currency_year, is_currency_year_unit, update_currency_year,
    CurrencyYear,
};
pub use dimension::Dimension;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Div, Mul};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::UnitError;

/// A physical unit symbol resolved against the unit table
#[derive(Debug, Clone)]
pub struct PhysicalAtom {
    pub symbol: String,
    pub scale: f64,
    pub dimension: Dimension,
}

// Identity of a physical atom is its symbol; scale and dimension follow from it.
impl PartialEq for PhysicalAtom {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
    }
}

impl Eq for PhysicalAtom {}

impl PartialOrd for PhysicalAtom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PhysicalAtom {
    fn cmp(&self, other: &Self) -> Ordering {
        self.symbol.cmp(&other.symbol)
    }
}

/// One factor of a unit expression
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Atom {
    Physical(PhysicalAtom),
    Currency(CurrencyYear),
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Physical(p) => write!(f, "{}", p.symbol),
            Atom::Currency(c) => write!(f, "{}", c),
        }
    }
}

/// A unit: atoms with non-zero integer exponents, kept in first-appearance order
#[derive(Debug, Clone, Default)]
pub struct Unit {
    terms: Vec<(Atom, i32)>,
}

impl Unit {
    pub fn dimensionless() -> Self {
        Self { terms: Vec::new() }
    }

    /// Build from raw terms, merging repeated atoms and dropping zero exponents
    pub fn from_terms(terms: Vec<(Atom, i32)>) -> Self {
        let mut merged: Vec<(Atom, i32)> = Vec::with_capacity(terms.len());
        for (atom, exponent) in terms {
            match merged.iter_mut().find(|(a, _)| *a == atom) {
                Some((_, e)) => *e = e.saturating_add(exponent),
                None => merged.push((atom, exponent)),
            }
        }
        merged.retain(|(_, e)| *e != 0);
        Self { terms: merged }
    }

    pub fn terms(&self) -> &[(Atom, i32)] {
        &self.terms
    }

    pub fn is_dimensionless(&self) -> bool {
        self.terms.is_empty()
    }

    /// Raise every exponent to an integer power
    pub fn powi(&self, exponent: i32) -> Unit {
        Unit::from_terms(self.terms.iter().map(|(a, e)| (a.clone(), e.saturating_mul(exponent))).collect())
    }

    /// Scale to SI base units and dimension of the physical part
    pub fn physical_basis(&self) -> (f64, Dimension) {
        self.terms.iter().fold((1.0, Dimension::NONE), |(scale, dim), (atom, e)| match atom {
            Atom::Physical(p) => (scale * p.scale.powi(*e), dim.mul(&p.dimension.powi(*e))),
            Atom::Currency(_) => (scale, dim),
        })
    }

    pub fn dimension(&self) -> Dimension {
        self.physical_basis().1
    }

    /// Net exponent of the currency family (`EUR_2020/USD_2015` has 0)
    pub fn currency_exponent(&self) -> i32 {
        self.terms
            .iter()
            .filter(|(a, _)| matches!(a, Atom::Currency(_)))
            .fold(0i32, |sum, (_, e)| sum.saturating_add(*e))
    }

    /// Currency atoms with their exponents, order-insensitive
    pub fn currency_terms(&self) -> BTreeMap<CurrencyYear, i32> {
        let mut out = BTreeMap::new();
        for (atom, e) in &self.terms {
            if let Atom::Currency(cy) = atom {
                *out.entry(cy.clone()).or_insert(0) += e;
            }
        }
        out.retain(|_, e| *e != 0);
        out
    }

    /// The physical part of the unit with all currency atoms removed
    pub fn without_currency(&self) -> Unit {
        Unit::from_terms(
            self.terms
                .iter()
                .filter(|(a, _)| matches!(a, Atom::Physical(_)))
                .cloned()
                .collect(),
        )
    }

    fn canonical(&self) -> BTreeMap<&Atom, i32> {
        let mut out = BTreeMap::new();
        for (atom, e) in &self.terms {
            *out.entry(atom).or_insert(0) += e;
        }
        out.retain(|_, e| *e != 0);
        out
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Unit {}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "dimensionless");
        }

        let numerator: Vec<String> = self
            .terms
            .iter()
            .filter(|(_, e)| *e > 0)
            .map(|(a, e)| if *e == 1 { a.to_string() } else { format!("{}^{}", a, e) })
            .collect();

        if numerator.is_empty() {
            write!(f, "1")?;
        } else {
            write!(f, "{}", numerator.join("*"))?;
        }

        for (atom, e) in self.terms.iter().filter(|(_, e)| *e < 0) {
            if *e == -1 {
                write!(f, "/{}", atom)?;
            } else {
                write!(f, "/{}^{}", atom, e.unsigned_abs())?;
            }
        }
        Ok(())
    }
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse::parse_unit(s)
    }
}

impl Mul for &Unit {
    type Output = Unit;

    fn mul(self, rhs: &Unit) -> Unit {
        let mut terms = self.terms.clone();
        terms.extend(rhs.terms.iter().cloned());
        Unit::from_terms(terms)
    }
}

impl Div for &Unit {
    type Output = Unit;

    fn div(self, rhs: &Unit) -> Unit {
        let mut terms = self.terms.clone();
        terms.extend(rhs.terms.iter().map(|(a, e)| (a.clone(), e.saturating_neg())));
        Unit::from_terms(terms)
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(Unit::dimensionless()),
            Some(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Same physical dimension and same net currency exponent
///
/// `USD_2020/kW` and `EUR_2015/MW` are compatible; converting between them
/// still needs `change_currency` for the currency part.
pub fn compatible(from: &Unit, to: &Unit) -> bool {
    from.dimension() == to.dimension() && from.currency_exponent() == to.currency_exponent()
}

/// Dimensional conversion of a magnitude between units with identical currency atoms
pub fn convert(magnitude: f64, from: &Unit, to: &Unit) -> Result<f64, UnitError> {
    if from.currency_terms() != to.currency_terms() {
        return Err(UnitError::CurrencyMismatch {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let (from_scale, from_dim) = from.physical_basis();
    let (to_scale, to_dim) = to.physical_basis();
    if from_dim != to_dim {
        return Err(UnitError::Incompatible {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    if from == to {
        return Ok(magnitude);
    }
    Ok(magnitude * from_scale / to_scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit(s: &str) -> Unit {
        s.parse().unwrap()
    }

    #[test]
    fn test_structural_equality_ignores_order() {
        assert_eq!(unit("kW*h"), unit("h*kW"));
        assert_eq!(unit("EUR_2020/kW"), unit("1/kW*EUR_2020"));
        assert_ne!(unit("kW"), unit("W"));
    }

    #[test]
    fn test_round_trip_printing() {
        for text in ["EUR_2020/kW", "USD_2020/MWh", "kW*h", "m^2", "1/a", "EUR_2015/USD_2020", "t/a"] {
            let parsed = unit(text);
            assert_eq!(parsed.to_string(), text);
            assert_eq!(unit(&parsed.to_string()), parsed);
        }
        assert_eq!(Unit::dimensionless().to_string(), "dimensionless");
    }

    #[test]
    fn test_convert_energy_and_power() {
        assert_relative_eq!(convert(1.0, &unit("MWh"), &unit("GJ")).unwrap(), 3.6, max_relative = 1e-12);
        assert_relative_eq!(convert(1500.0, &unit("kW"), &unit("MW")).unwrap(), 1.5, max_relative = 1e-12);
        assert_relative_eq!(
            convert(1000.0, &unit("EUR_2020/kW"), &unit("EUR_2020/MW")).unwrap(),
            1.0e6,
            max_relative = 1e-12
        );
        assert_relative_eq!(convert(5.0, &unit("percent"), &unit("dimensionless")).unwrap(), 0.05, max_relative = 1e-12);
    }

    #[test]
    fn test_convert_rejects_currency_change() {
        let err = convert(1.0, &unit("EUR_2020/kW"), &unit("USD_2020/kW")).unwrap_err();
        assert!(matches!(err, UnitError::CurrencyMismatch { .. }));
        let err = convert(1.0, &unit("EUR_2020/kW"), &unit("EUR_2021/kW")).unwrap_err();
        assert!(matches!(err, UnitError::CurrencyMismatch { .. }));
    }

    #[test]
    fn test_convert_rejects_incompatible_dimensions() {
        let err = convert(1.0, &unit("kW"), &unit("kWh")).unwrap_err();
        assert!(matches!(err, UnitError::Incompatible { .. }));
    }

    #[test]
    fn test_compatible() {
        assert!(compatible(&unit("USD_2020/kW"), &unit("EUR_2015/MW")));
        assert!(compatible(&unit("MWh"), &unit("GJ")));
        assert!(!compatible(&unit("USD_2020/kW"), &unit("kW")));
        assert!(!compatible(&unit("kW"), &unit("kWh")));
    }

    #[test]
    fn test_multiplication_cancels_atoms() {
        let product = &unit("EUR_2020/kW") * &unit("kW");
        assert_eq!(product, unit("EUR_2020"));
        let ratio = &unit("EUR_2020") / &unit("EUR_2020");
        assert!(ratio.is_dimensionless());
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&unit("EUR_2020/kW")).unwrap();
        assert_eq!(json, "\"EUR_2020/kW\"");
        let back: Unit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, unit("EUR_2020/kW"));
        let null: Unit = serde_json::from_str("null").unwrap();
        assert!(null.is_dimensionless());
    }
}
