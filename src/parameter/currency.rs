//! Currency and inflation adjustment of parameters
//!
//! Deflation data lives outside this crate. Callers supply a [`Deflator`]
//! and a [`CountryLookup`] through a [`CurrencyContext`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Result, TechDataError, UnitError};
use crate::units::{update_currency_year, CurrencyYear};
use super::Parameter;

/// Source of deflator and exchange-rate series; names are case-insensitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum DataSource {
    #[default]
    #[serde(rename = "worldbank")]
    WorldBank,
    #[serde(rename = "imf")]
    Imf,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::WorldBank => write!(f, "worldbank"),
            DataSource::Imf => write!(f, "imf"),
        }
    }
}

impl FromStr for DataSource {
    type Err = TechDataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "worldbank" | "wb" => Ok(DataSource::WorldBank),
            "imf" | "international_monetary_fund" => Ok(DataSource::Imf),
            other => Err(TechDataError::InvalidArgument(format!(
                "unknown data source '{}', expected 'worldbank' or 'imf'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for DataSource {
    type Error = TechDataError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// One conversion asked of the deflation provider
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub magnitude: f64,
    pub source_currency: String,
    pub source_year: i32,
    pub target_currency: String,
    pub target_year: i32,
    pub region: String,
    pub data_source: DataSource,
}

/// Converts an amount between currency-years (exchange rate plus inflation)
pub trait Deflator: Send + Sync {
    fn convert_currency(&self, request: &ConversionRequest) -> Result<f64>;
}

impl<F> Deflator for F
where
    F: Fn(&ConversionRequest) -> Result<f64> + Send + Sync,
{
    fn convert_currency(&self, request: &ConversionRequest) -> Result<f64> {
        self(request)
    }
}

/// Maps a currency code to the ISO3 countries using it, most representative first
pub trait CountryLookup: Send + Sync {
    fn countries_for_currency(&self, code: &str) -> Vec<String>;
}

impl CountryLookup for BTreeMap<String, Vec<String>> {
    fn countries_for_currency(&self, code: &str) -> Vec<String> {
        self.get(code).cloned().unwrap_or_default()
    }
}

// Approximate reference table, not an authoritative registry.
const CURRENCY_COUNTRIES: &[(&str, &[&str])] = &[
    ("USD", &["USA", "ECU", "SLV", "PAN"]),
    ("EUR", &["DEU", "FRA", "ITA", "ESP", "NLD", "BEL", "AUT", "FIN", "IRL", "PRT", "GRC"]),
    ("GBP", &["GBR"]),
    ("CHF", &["CHE", "LIE"]),
    ("DKK", &["DNK"]),
    ("SEK", &["SWE"]),
    ("NOK", &["NOR"]),
    ("PLN", &["POL"]),
    ("CZK", &["CZE"]),
    ("JPY", &["JPN"]),
    ("CNY", &["CHN"]),
    ("INR", &["IND"]),
    ("KRW", &["KOR"]),
    ("AUD", &["AUS"]),
    ("CAD", &["CAN"]),
    ("BRL", &["BRA"]),
    ("MXN", &["MEX"]),
    ("ZAR", &["ZAF"]),
    ("TRY", &["TUR"]),
    ("CLP", &["CHL"]),
];

/// Built-in currency to country table
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticCountryLookup;

impl CountryLookup for StaticCountryLookup {
    fn countries_for_currency(&self, code: &str) -> Vec<String> {
        CURRENCY_COUNTRIES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, countries)| countries.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default()
    }
}

static DEFAULT_COUNTRIES: StaticCountryLookup = StaticCountryLookup;

/// Collaborators needed by [`Parameter::change_currency`]
#[derive(Clone, Copy)]
pub struct CurrencyContext<'a> {
    pub deflator: &'a dyn Deflator,
    pub countries: &'a dyn CountryLookup,
    pub data_source: DataSource,
}

impl<'a> CurrencyContext<'a> {
    /// Context using the built-in country table and the World Bank source
    pub fn new(deflator: &'a dyn Deflator) -> Self {
        Self { deflator, countries: &DEFAULT_COUNTRIES, data_source: DataSource::default() }
    }

    /// Context using the built-in country table and the configured source
    pub fn from_config(deflator: &'a dyn Deflator, config: &EngineConfig) -> Self {
        Self::new(deflator).with_data_source(config.data_source)
    }

    pub fn with_countries(mut self, countries: &'a dyn CountryLookup) -> Self {
        self.countries = countries;
        self
    }

    pub fn with_data_source(mut self, data_source: DataSource) -> Self {
        self.data_source = data_source;
        self
    }
}

impl fmt::Debug for CurrencyContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrencyContext").field("data_source", &self.data_source).finish_non_exhaustive()
    }
}

impl Parameter {
    /// Convert every currency-year atom of the unit to `to_currency` (e.g. `"USD_2020"`)
    ///
    /// Each atom `(code, year)^e` contributes a factor `rate^e`, with `rate`
    /// the provider's value of one unit of the source currency-year in the
    /// target. `region` selects the deflation series; when absent the first
    /// country using the target currency is taken.
    pub fn change_currency(
        &self,
        to_currency: &str,
        region: Option<&str>,
        ctx: &CurrencyContext<'_>,
    ) -> Result<Parameter> {
        let target: CurrencyYear = to_currency.parse()?;

        let currencies = self.units.currency_terms();
        if currencies.is_empty() {
            return Err(UnitError::NoCurrency(self.units.to_string()).into());
        }

        let region = match region {
            Some(r) => r.to_string(),
            None => ctx
                .countries
                .countries_for_currency(&target.code)
                .into_iter()
                .next()
                .ok_or_else(|| {
                    TechDataError::Lookup(format!("no country found for currency '{}'", target.code))
                })?,
        };

        let mut magnitude = self.magnitude;
        for (source, exponent) in &currencies {
            if *source == target {
                continue;
            }
            let request = ConversionRequest {
                magnitude: 1.0,
                source_currency: source.code.clone(),
                source_year: source.year,
                target_currency: target.code.clone(),
                target_year: target.year,
                region: region.clone(),
                data_source: ctx.data_source,
            };
            let rate = ctx.deflator.convert_currency(&request)?;
            if !rate.is_finite() {
                return Err(TechDataError::Provider(format!(
                    "non-finite rate {} from {} to {} in {}",
                    rate, source, target, region
                )));
            }
            log::debug!("Currency rate {} -> {} ({}): {}", source, target, region, rate);
            magnitude *= rate.powi(*exponent);
        }

        let units = update_currency_year(&self.units, Some(&target.code), Some(target.year));
        Ok(Parameter { magnitude, units, ..self.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Mutex;

    /// Fixed rates per (source code, source year), recording every request
    struct MockDeflator {
        rates: Vec<(&'static str, i32, f64)>,
        seen: Mutex<Vec<ConversionRequest>>,
    }

    impl MockDeflator {
        fn new(rates: Vec<(&'static str, i32, f64)>) -> Self {
            Self { rates, seen: Mutex::new(Vec::new()) }
        }
    }

    impl Deflator for MockDeflator {
        fn convert_currency(&self, request: &ConversionRequest) -> Result<f64> {
            self.seen.lock().unwrap().push(request.clone());
            self.rates
                .iter()
                .find(|(c, y, _)| *c == request.source_currency && *y == request.source_year)
                .map(|(_, _, r)| request.magnitude * r)
                .ok_or_else(|| TechDataError::Provider("missing rate".to_string()))
        }
    }

    #[test]
    fn test_change_currency_numerator() {
        let deflator = MockDeflator::new(vec![("EUR", 2015, 1.25)]);
        let ctx = CurrencyContext::new(&deflator);
        let p = Parameter::new(800.0, "EUR_2015/kW").unwrap();

        let q = p.change_currency("USD_2020", None, &ctx).unwrap();
        assert_relative_eq!(q.magnitude(), 1000.0, max_relative = 1e-12);
        assert_eq!(q.units().to_string(), "USD_2020/kW");

        let seen = deflator.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].region, "USA");
        assert_eq!(seen[0].target_year, 2020);
        assert_eq!(seen[0].data_source, DataSource::WorldBank);
    }

    #[test]
    fn test_change_currency_denominator_uses_inverse_rate() {
        let deflator = MockDeflator::new(vec![("EUR", 2015, 1.25)]);
        let ctx = CurrencyContext::new(&deflator).with_data_source(DataSource::Imf);
        let p = Parameter::new(10.0, "kWh/EUR_2015").unwrap();

        let q = p.change_currency("USD_2020", Some("DEU"), &ctx).unwrap();
        assert_relative_eq!(q.magnitude(), 8.0, max_relative = 1e-12);
        assert_eq!(q.units().to_string(), "kWh/USD_2020");
        assert_eq!(deflator.seen.lock().unwrap()[0].region, "DEU");
    }

    #[test]
    fn test_change_currency_with_closure_deflator() {
        let deflator = |req: &ConversionRequest| -> Result<f64> {
            Ok(req.magnitude * (1.02f64).powi(req.target_year - req.source_year))
        };
        let ctx = CurrencyContext::new(&deflator);
        let p = Parameter::new(100.0, "EUR_2018").unwrap();
        let q = p.change_currency("EUR_2020", None, &ctx).unwrap();
        assert_relative_eq!(q.magnitude(), 104.04, max_relative = 1e-12);
    }

    #[test]
    fn test_change_currency_errors() {
        let deflator = MockDeflator::new(vec![]);
        let ctx = CurrencyContext::new(&deflator);

        let physical = Parameter::new(1.0, "kW").unwrap();
        assert!(matches!(
            physical.change_currency("USD_2020", None, &ctx),
            Err(TechDataError::Unit(UnitError::NoCurrency(_)))
        ));

        let cost = Parameter::new(1.0, "EUR_2015").unwrap();
        assert!(matches!(
            cost.change_currency("dollars", None, &ctx),
            Err(TechDataError::Unit(UnitError::NoCurrency(_)))
        ));
        assert!(matches!(cost.change_currency("XYZ_2020", None, &ctx), Err(TechDataError::Lookup(_))));
        assert!(matches!(cost.change_currency("USD_2020", None, &ctx), Err(TechDataError::Provider(_))));
    }

    #[test]
    fn test_custom_country_lookup() {
        let deflator = MockDeflator::new(vec![("USD", 2020, 0.9)]);
        let mut table = BTreeMap::new();
        table.insert("EUR".to_string(), vec!["FRA".to_string()]);
        let ctx = CurrencyContext::new(&deflator).with_countries(&table);

        let p = Parameter::new(10.0, "USD_2020").unwrap();
        let q = p.change_currency("EUR_2020", None, &ctx).unwrap();
        assert_relative_eq!(q.magnitude(), 9.0, max_relative = 1e-12);
        assert_eq!(deflator.seen.lock().unwrap()[0].region, "FRA");
    }

    #[test]
    fn test_data_source_parsing() {
        assert_eq!("wb".parse::<DataSource>().unwrap(), DataSource::WorldBank);
        assert_eq!("International_Monetary_Fund".parse::<DataSource>().unwrap(), DataSource::Imf);
        assert!("oecd".parse::<DataSource>().is_err());
    }

    #[test]
    fn test_data_source_serde_matches_from_str() {
        for text in ["worldbank", "WB", "IMF", "International_Monetary_Fund", "oecd"] {
            let parsed = text.parse::<DataSource>().ok();
            let deserialized = serde_json::from_str::<DataSource>(&format!("\"{}\"", text)).ok();
            assert_eq!(parsed, deserialized, "spelling '{}'", text);
        }
        assert_eq!(serde_json::to_string(&DataSource::Imf).unwrap(), "\"imf\"");
    }

    #[test]
    fn test_context_from_config_uses_configured_source() {
        let config: EngineConfig = serde_json::from_str(r#"{"data_source": "imf"}"#).unwrap();
        let deflator = MockDeflator::new(vec![("EUR", 2015, 1.25)]);
        let ctx = CurrencyContext::from_config(&deflator, &config);

        let p = Parameter::new(800.0, "EUR_2015/kW").unwrap();
        p.change_currency("USD_2020", None, &ctx).unwrap();
        assert_eq!(deflator.seen.lock().unwrap()[0].data_source, DataSource::Imf);
    }
}
