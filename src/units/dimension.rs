//! Physical dimensions and the table of known unit symbols

use std::fmt;

/// Number of base dimensions tracked: length, mass, time, temperature, amount
const BASE_DIMENSIONS: usize = 5;
const BASE_NAMES: [&str; BASE_DIMENSIONS] = ["[length]", "[mass]", "[time]", "[temperature]", "[substance]"];

/// Exponent vector over the SI base dimensions (currency is tracked separately)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Dimension([i32; BASE_DIMENSIONS]);

impl Dimension {
    pub const NONE: Dimension = Dimension([0, 0, 0, 0, 0]);
    pub const LENGTH: Dimension = Dimension([1, 0, 0, 0, 0]);
    pub const MASS: Dimension = Dimension([0, 1, 0, 0, 0]);
    pub const TIME: Dimension = Dimension([0, 0, 1, 0, 0]);
    pub const TEMPERATURE: Dimension = Dimension([0, 0, 0, 1, 0]);
    pub const SUBSTANCE: Dimension = Dimension([0, 0, 0, 0, 1]);
    pub const AREA: Dimension = Dimension([2, 0, 0, 0, 0]);
    pub const VOLUME: Dimension = Dimension([3, 0, 0, 0, 0]);
    pub const ENERGY: Dimension = Dimension([2, 1, -2, 0, 0]);
    pub const POWER: Dimension = Dimension([2, 1, -3, 0, 0]);

    pub fn is_dimensionless(&self) -> bool {
        *self == Dimension::NONE
    }

    /// Dimension raised to an integer power
    pub fn powi(&self, exponent: i32) -> Dimension {
        let mut out = self.0;
        for e in out.iter_mut() {
            *e = e.saturating_mul(exponent);
        }
        Dimension(out)
    }

    pub fn mul(&self, other: &Dimension) -> Dimension {
        let mut out = self.0;
        for (e, o) in out.iter_mut().zip(other.0.iter()) {
            *e = e.saturating_add(*o);
        }
        Dimension(out)
    }

    pub fn div(&self, other: &Dimension) -> Dimension {
        self.mul(&other.powi(-1))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "dimensionless");
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .zip(BASE_NAMES.iter())
            .filter(|(e, _)| **e != 0)
            .map(|(e, name)| if *e == 1 { name.to_string() } else { format!("{}^{}", name, e) })
            .collect();
        write!(f, "{}", parts.join("*"))
    }
}

/// A known unit symbol: scale to the SI base units and its dimension
struct UnitDef {
    symbol: &'static str,
    scale: f64,
    dimension: Dimension,
    prefixable: bool,
}

const JULIAN_YEAR_SECONDS: f64 = 365.25 * 86_400.0;

const UNIT_TABLE: &[UnitDef] = &[
    UnitDef { symbol: "percent", scale: 0.01, dimension: Dimension::NONE, prefixable: false },
    UnitDef { symbol: "m", scale: 1.0, dimension: Dimension::LENGTH, prefixable: true },
    UnitDef { symbol: "ha", scale: 1.0e4, dimension: Dimension::AREA, prefixable: false },
    UnitDef { symbol: "l", scale: 1.0e-3, dimension: Dimension::VOLUME, prefixable: true },
    UnitDef { symbol: "L", scale: 1.0e-3, dimension: Dimension::VOLUME, prefixable: true },
    UnitDef { symbol: "g", scale: 1.0e-3, dimension: Dimension::MASS, prefixable: true },
    UnitDef { symbol: "t", scale: 1.0e3, dimension: Dimension::MASS, prefixable: true },
    UnitDef { symbol: "tonne", scale: 1.0e3, dimension: Dimension::MASS, prefixable: false },
    UnitDef { symbol: "s", scale: 1.0, dimension: Dimension::TIME, prefixable: true },
    UnitDef { symbol: "min", scale: 60.0, dimension: Dimension::TIME, prefixable: false },
    UnitDef { symbol: "h", scale: 3_600.0, dimension: Dimension::TIME, prefixable: false },
    UnitDef { symbol: "d", scale: 86_400.0, dimension: Dimension::TIME, prefixable: false },
    UnitDef { symbol: "day", scale: 86_400.0, dimension: Dimension::TIME, prefixable: false },
    UnitDef { symbol: "a", scale: JULIAN_YEAR_SECONDS, dimension: Dimension::TIME, prefixable: false },
    UnitDef { symbol: "yr", scale: JULIAN_YEAR_SECONDS, dimension: Dimension::TIME, prefixable: false },
    UnitDef { symbol: "year", scale: JULIAN_YEAR_SECONDS, dimension: Dimension::TIME, prefixable: false },
    UnitDef { symbol: "J", scale: 1.0, dimension: Dimension::ENERGY, prefixable: true },
    UnitDef { symbol: "Wh", scale: 3_600.0, dimension: Dimension::ENERGY, prefixable: true },
    UnitDef { symbol: "W", scale: 1.0, dimension: Dimension::POWER, prefixable: true },
    UnitDef { symbol: "K", scale: 1.0, dimension: Dimension::TEMPERATURE, prefixable: false },
    UnitDef { symbol: "mol", scale: 1.0, dimension: Dimension::SUBSTANCE, prefixable: true },
];

const PREFIXES: &[(&str, f64)] = &[
    ("k", 1.0e3),
    ("M", 1.0e6),
    ("G", 1.0e9),
    ("T", 1.0e12),
    ("P", 1.0e15),
    ("m", 1.0e-3),
];

/// Resolve a unit symbol (optionally prefixed) to its SI scale and dimension
///
/// Exact symbols win over prefix splits, so `min` is minutes and not milli-inch.
pub fn resolve_symbol(symbol: &str) -> Option<(f64, Dimension)> {
    if let Some(def) = UNIT_TABLE.iter().find(|d| d.symbol == symbol) {
        return Some((def.scale, def.dimension));
    }

    PREFIXES.iter().find_map(|(prefix, factor)| {
        let rest = symbol.strip_prefix(prefix)?;
        UNIT_TABLE
            .iter()
            .find(|d| d.prefixable && d.symbol == rest)
            .map(|d| (factor * d.scale, d.dimension))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_symbols() {
        let (scale, dim) = resolve_symbol("kW").unwrap();
        assert_eq!(scale, 1.0e3);
        assert_eq!(dim, Dimension::POWER);

        let (scale, dim) = resolve_symbol("MWh").unwrap();
        assert_eq!(scale, 3.6e9);
        assert_eq!(dim, Dimension::ENERGY);

        let (scale, dim) = resolve_symbol("kt").unwrap();
        assert_eq!(scale, 1.0e6);
        assert_eq!(dim, Dimension::MASS);
    }

    #[test]
    fn test_exact_symbol_beats_prefix() {
        let (scale, dim) = resolve_symbol("min").unwrap();
        assert_eq!(scale, 60.0);
        assert_eq!(dim, Dimension::TIME);
        assert!(resolve_symbol("mol").is_some());
    }

    #[test]
    fn test_unknown_symbols() {
        assert!(resolve_symbol("Pa").is_none());
        assert!(resolve_symbol("kmin").is_none());
        assert!(resolve_symbol("").is_none());
    }

    #[test]
    fn test_dimension_algebra() {
        assert_eq!(Dimension::ENERGY.div(&Dimension::TIME), Dimension::POWER);
        assert!(Dimension::POWER.div(&Dimension::POWER).is_dimensionless());
        assert_eq!(Dimension::LENGTH.powi(2), Dimension::AREA);
    }
}
