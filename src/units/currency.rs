//! Currency-year units such as `USD_2020` or `EUR_2015`
//!
//! A currency-year atom is three uppercase letters, an underscore and a
//! four-digit year. Anything else is not a currency unit; lookups quietly
//! return nothing instead of failing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnitError;
use super::{Atom, Unit};

/// A currency code paired with the year its value refers to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CurrencyYear {
    pub code: String,
    pub year: i32,
}

impl CurrencyYear {
    /// Create from a code and year, rejecting anything outside `[A-Z]{3}` / `0..=9999`
    pub fn new(code: &str, year: i32) -> Option<Self> {
        if is_currency_code(code) && (0..=9999).contains(&year) {
            Some(Self { code: code.to_string(), year })
        } else {
            None
        }
    }

    /// Match a whole token such as `USD_2020`
    pub fn from_atom(token: &str) -> Option<Self> {
        let bytes = token.as_bytes();
        if bytes.len() == 8 && matches_at(bytes, 0) {
            let year = token[4..].parse().ok()?;
            Some(Self { code: token[..3].to_string(), year })
        } else {
            None
        }
    }
}

impl fmt::Display for CurrencyYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:04}", self.code, self.year)
    }
}

impl FromStr for CurrencyYear {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CurrencyYear::from_atom(s.trim()).ok_or_else(|| UnitError::NoCurrency(s.to_string()))
    }
}

fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// `CCC_YYYY` starting at `i` (boundaries are checked by the caller)
fn matches_at(bytes: &[u8], i: usize) -> bool {
    bytes.len() >= i + 8
        && bytes[i..i + 3].iter().all(|b| b.is_ascii_uppercase())
        && bytes[i + 3] == b'_'
        && bytes[i + 4..i + 8].iter().all(|b| b.is_ascii_digit())
}

/// All currency-year atoms found in a unit string, in order of appearance
///
/// Matches must sit on word boundaries, so `XUSD_2020` or `USD_20201` are ignored.
pub fn extract_currency_units(text: &str) -> Vec<CurrencyYear> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i + 8 <= bytes.len() {
        let start_ok = i == 0 || !is_word_byte(bytes[i - 1]);
        let end_ok = i + 8 == bytes.len() || !is_word_byte(bytes[i + 8]);
        if start_ok && end_ok && matches_at(bytes, i) {
            if let Some(cy) = CurrencyYear::from_atom(&text[i..i + 8]) {
                found.push(cy);
            }
            i += 8;
        } else {
            i += 1;
        }
    }

    found
}

/// First currency-year atom in a unit string, `None` if there is none
pub fn extract_currency_year(text: &str) -> Option<CurrencyYear> {
    extract_currency_units(text).into_iter().next()
}

/// Whether the unit contains at least one currency-year atom
pub fn is_currency_year_unit(unit: &Unit) -> bool {
    unit.terms().iter().any(|(atom, _)| matches!(atom, Atom::Currency(_)))
}

/// Rewrite the code and/or year of every currency atom in `unit`
///
/// The physical part of the unit is left untouched. A malformed replacement
/// code or year leaves the unit unchanged.
pub fn update_currency_year(unit: &Unit, new_code: Option<&str>, new_year: Option<i32>) -> Unit {
    if new_code.is_some_and(|c| !is_currency_code(c)) || new_year.is_some_and(|y| !(0..=9999).contains(&y)) {
        log::debug!(
            "Ignoring malformed currency replacement code={:?} year={:?} for unit '{}'",
            new_code,
            new_year,
            unit
        );
        return unit.clone();
    }

    let terms = unit
        .terms()
        .iter()
        .map(|(atom, exponent)| match atom {
            Atom::Currency(cy) => {
                let replaced = CurrencyYear {
                    code: new_code.map(str::to_string).unwrap_or_else(|| cy.code.clone()),
                    year: new_year.unwrap_or(cy.year),
                };
                (Atom::Currency(replaced), *exponent)
            }
            other => (other.clone(), *exponent),
        })
        .collect();

    Unit::from_terms(terms)
}
