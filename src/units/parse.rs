//! Recursive-descent parser for unit expressions
//!
//! Grammar:
//! ```text
//! expr   := term (('*' | '/') term)*
//! term   := factor (('^' | '**') integer)?
//! factor := atom | '(' expr ')' | '1'
//! ```
//! `%` is read as the atom `percent`; `dimensionless` and `1` are the identity.
//! Exponents, written or accumulated, are limited to `±MAX_EXPONENT`.

use crate::error::UnitError;
use super::currency::CurrencyYear;
use super::dimension::resolve_symbol;
use super::{Atom, PhysicalAtom, Unit};

const MAX_EXPONENT: i32 = 99;

pub(super) fn parse_unit(input: &str) -> Result<Unit, UnitError> {
    let mut parser = Parser { input, bytes: input.as_bytes(), pos: 0 };

    parser.skip_ws();
    if parser.at_end() {
        return Ok(Unit::dimensionless());
    }

    let unit = parser.expr()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(unit)
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> UnitError {
        UnitError::Parse {
            input: self.input.to_string(),
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn expr(&mut self) -> Result<Unit, UnitError> {
        let mut unit = self.term()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    unit = self.bounded(&unit * &rhs)?;
                }
                Some(b'/') => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    unit = self.bounded(&unit / &rhs)?;
                }
                _ => return Ok(unit),
            }
        }
    }

    fn term(&mut self) -> Result<Unit, UnitError> {
        let base = self.factor()?;
        self.skip_ws();
        let has_power = match (self.peek(), self.peek_at(1)) {
            (Some(b'^'), _) => {
                self.pos += 1;
                true
            }
            (Some(b'*'), Some(b'*')) => {
                self.pos += 2;
                true
            }
            _ => false,
        };
        if !has_power {
            return Ok(base);
        }
        let exponent = self.integer()?;
        if exponent.unsigned_abs() > MAX_EXPONENT.unsigned_abs() {
            return Err(self.error("exponent out of range"));
        }
        self.bounded(base.powi(exponent))
    }

    fn bounded(&self, unit: Unit) -> Result<Unit, UnitError> {
        if unit.terms().iter().any(|(_, e)| e.unsigned_abs() > MAX_EXPONENT.unsigned_abs()) {
            return Err(self.error("exponent out of range"));
        }
        Ok(unit)
    }

    fn factor(&mut self) -> Result<Unit, UnitError> {
        self.skip_ws();
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let inner = self.expr()?;
                self.skip_ws();
                if self.peek() != Some(b')') {
                    return Err(self.error("expected ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(b'%') => {
                self.pos += 1;
                self.atom("percent")
            }
            Some(b'1') => {
                self.pos += 1;
                if self.peek().is_some_and(|b| b.is_ascii_digit() || b == b'.') {
                    return Err(self.error("numeric factors other than 1 are not units"));
                }
                Ok(Unit::dimensionless())
            }
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => {
                let start = self.pos;
                while self.peek().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
                    self.pos += 1;
                }
                let token = &self.input[start..self.pos];
                self.atom(token)
            }
            Some(_) => Err(self.error("expected a unit symbol")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn integer(&mut self) -> Result<i32, UnitError> {
        self.skip_ws();
        let start = self.pos;
        if matches!(self.peek(), Some(b'-') | Some(b'+')) {
            self.pos += 1;
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| self.error("expected an integer exponent"))
    }

    fn atom(&self, token: &str) -> Result<Unit, UnitError> {
        if token == "dimensionless" {
            return Ok(Unit::dimensionless());
        }
        if let Some(cy) = CurrencyYear::from_atom(token) {
            return Ok(Unit::from_terms(vec![(Atom::Currency(cy), 1)]));
        }
        let (scale, dimension) =
            resolve_symbol(token).ok_or_else(|| UnitError::UnknownUnit(token.to_string()))?;
        let atom = PhysicalAtom { symbol: token.to_string(), scale, dimension };
        Ok(Unit::from_terms(vec![(Atom::Physical(atom), 1)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_and_compound() {
        assert_eq!(parse_unit("kW").unwrap().to_string(), "kW");
        assert_eq!(parse_unit("EUR_2020/kW").unwrap().to_string(), "EUR_2020/kW");
        assert_eq!(parse_unit("EUR_2020 / kW / a").unwrap().to_string(), "EUR_2020/kW/a");
        assert_eq!(parse_unit("kW*h").unwrap().to_string(), "kW*h");
    }

    #[test]
    fn test_parse_powers_and_parentheses() {
        assert_eq!(parse_unit("m^2").unwrap().to_string(), "m^2");
        assert_eq!(parse_unit("m**3").unwrap().to_string(), "m^3");
        assert_eq!(parse_unit("EUR_2020/(kW*a)").unwrap().to_string(), "EUR_2020/kW/a");
        assert_eq!(parse_unit("1/a").unwrap().to_string(), "1/a");
    }

    #[test]
    fn test_parse_identity_forms() {
        assert!(parse_unit("").unwrap().is_dimensionless());
        assert!(parse_unit("dimensionless").unwrap().is_dimensionless());
        assert!(parse_unit(" 1 ").unwrap().is_dimensionless());
        assert_eq!(parse_unit("%").unwrap().to_string(), "percent");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_unit("furlong"), Err(UnitError::UnknownUnit("furlong".to_string())));
        assert!(matches!(parse_unit("kW/"), Err(UnitError::Parse { .. })));
        assert!(matches!(parse_unit("(kW"), Err(UnitError::Parse { .. })));
        assert!(matches!(parse_unit("2 kW"), Err(UnitError::Parse { .. })));
        assert!(matches!(parse_unit("kW^x"), Err(UnitError::Parse { .. })));
    }

    #[test]
    fn test_parse_rejects_huge_exponents() {
        for input in ["m^2147483647*m", "m^-2147483648/m", "m^99999999999", "(m^99)^99", "m^99*m"] {
            assert!(
                matches!(parse_unit(input), Err(UnitError::Parse { .. })),
                "{} should be rejected",
                input
            );
        }
        assert_eq!(parse_unit("m^99/m").unwrap().to_string(), "m^98");
    }

    #[test]
    fn test_unit_algebra_saturates() {
        let unit = parse_unit("m^99").unwrap().powi(i32::MAX);
        assert_eq!(unit.terms()[0].1, i32::MAX);
        let product = &unit * &unit;
        assert_eq!(product.terms()[0].1, i32::MAX);
    }
}
