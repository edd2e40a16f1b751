//! Consistency checks over a technology's parameters
//!
//! Checks never fail and never modify the technology; every finding is a
//! [`ConsistencyWarning`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::parameter::HeatingValue;
use crate::units::{Dimension, Unit};
use super::derivation::DerivationRegistry;
use super::Technology;

/// A single finding of a consistency rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyWarning {
    pub rule: String,
    pub parameters: Vec<String>,
    pub message: String,
}

impl ConsistencyWarning {
    fn new(rule: &str, parameters: Vec<String>, message: String) -> Self {
        Self { rule: rule.to_string(), parameters, message }
    }
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

pub type CheckFn = dyn Fn(&Technology) -> Vec<ConsistencyWarning> + Send + Sync;

/// A named check
pub struct ConsistencyRule {
    pub name: String,
    check: Box<CheckFn>,
}

impl ConsistencyRule {
    pub fn new<F>(name: &str, check: F) -> Self
    where
        F: Fn(&Technology) -> Vec<ConsistencyWarning> + Send + Sync + 'static,
    {
        Self { name: name.to_string(), check: Box::new(check) }
    }
}

impl fmt::Debug for ConsistencyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsistencyRule").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Ordered set of consistency rules
#[derive(Debug)]
pub struct ConsistencyRules {
    rules: Vec<ConsistencyRule>,
}

impl ConsistencyRules {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn register(&mut self, rule: ConsistencyRule) {
        self.rules.push(rule);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    pub fn check(&self, technology: &Technology) -> Vec<ConsistencyWarning> {
        self.rules.iter().flat_map(|rule| (rule.check)(technology)).collect()
    }
}

impl Default for ConsistencyRules {
    fn default() -> Self {
        let mut rules = Self::empty();
        rules.register(ConsistencyRule::new("expected-dimension", check_expected_dimensions));
        rules.register(ConsistencyRule::new("heating-value-alignment", check_heating_values));
        rules.register(ConsistencyRule::new("currency-alignment", check_currencies));
        rules.register(ConsistencyRule::new("prerequisites", check_prerequisites));
        let derivations = DerivationRegistry::default();
        rules.register(ConsistencyRule::new("derived-value-agreement", move |tech| {
            check_derived_values(tech, &derivations)
        }));
        rules
    }
}

/// Shape a catalog parameter's unit is expected to have
#[derive(Debug, Clone, Copy)]
enum Expected {
    Currency,
    Power,
    CurrencyPerPower,
    TimeOrDimensionless,
    Dimensionless,
    PerTimeOrDimensionless,
    PerTime,
    CurrencyPerTime,
}

impl Expected {
    fn matches(self, unit: &Unit) -> bool {
        let dim = unit.dimension();
        let per_time = Dimension::TIME.powi(-1);
        match (self, unit.currency_exponent()) {
            (Expected::Currency, 1) => dim.is_dimensionless(),
            (Expected::Power, 0) => dim == Dimension::POWER,
            (Expected::CurrencyPerPower, 1) => dim == Dimension::POWER.powi(-1),
            (Expected::TimeOrDimensionless, 0) => dim == Dimension::TIME || dim.is_dimensionless(),
            (Expected::Dimensionless, 0) => dim.is_dimensionless(),
            (Expected::PerTimeOrDimensionless, 0) => dim == per_time || dim.is_dimensionless(),
            (Expected::PerTime, 0) => dim == per_time,
            (Expected::CurrencyPerTime, 1) => dim == per_time,
            _ => false,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Expected::Currency => "a currency amount",
            Expected::Power => "a power",
            Expected::CurrencyPerPower => "currency per power",
            Expected::TimeOrDimensionless => "a time or a plain number",
            Expected::Dimensionless => "dimensionless",
            Expected::PerTimeOrDimensionless => "a rate per time or a plain number",
            Expected::PerTime => "a rate per time",
            Expected::CurrencyPerTime => "currency per time",
        }
    }
}

const EXPECTED_DIMENSIONS: &[(&str, Expected)] = &[
    ("investment", Expected::Currency),
    ("capacity", Expected::Power),
    ("specific-investment", Expected::CurrencyPerPower),
    ("lifetime", Expected::TimeOrDimensionless),
    ("discount-rate", Expected::Dimensionless),
    ("fixed-om", Expected::PerTimeOrDimensionless),
    ("annuity-factor", Expected::PerTime),
    ("equivalent-annual-cost", Expected::CurrencyPerTime),
    ("fixed-om-cost", Expected::CurrencyPerTime),
    ("total-annual-cost", Expected::CurrencyPerTime),
];

const PREREQUISITES: &[(&str, &[&str])] = &[
    ("specific-investment", &["capacity"]),
    ("equivalent-annual-cost", &["lifetime", "discount-rate"]),
    ("fixed-om", &["investment"]),
];

const RELATIVE_TOLERANCE: f64 = 1e-6;

fn check_expected_dimensions(tech: &Technology) -> Vec<ConsistencyWarning> {
    EXPECTED_DIMENSIONS
        .iter()
        .filter_map(|(name, expected)| {
            let parameter = tech.get(name)?;
            if expected.matches(parameter.units()) {
                return None;
            }
            Some(ConsistencyWarning::new(
                "expected-dimension",
                vec![name.to_string()],
                format!(
                    "'{}' has unit '{}', expected {}",
                    name,
                    parameter.units(),
                    expected.describe()
                ),
            ))
        })
        .collect()
}

fn check_heating_values(tech: &Technology) -> Vec<ConsistencyWarning> {
    let mut by_carrier: BTreeMap<&str, Vec<(&str, Option<HeatingValue>)>> = BTreeMap::new();
    for (name, parameter) in tech.parameters() {
        if let Some(carrier) = parameter.carrier() {
            by_carrier.entry(carrier).or_default().push((name.as_str(), parameter.heating_value()));
        }
    }

    by_carrier
        .into_iter()
        .filter_map(|(carrier, entries)| {
            let bases: BTreeSet<String> = entries
                .iter()
                .map(|(_, hv)| hv.map(|h| h.to_string()).unwrap_or_else(|| "none".to_string()))
                .collect();
            if bases.len() <= 1 {
                return None;
            }
            Some(ConsistencyWarning::new(
                "heating-value-alignment",
                entries.iter().map(|(n, _)| n.to_string()).collect(),
                format!(
                    "parameters with carrier '{}' use different heating values: {}",
                    carrier,
                    bases.into_iter().collect::<Vec<_>>().join(", ")
                ),
            ))
        })
        .collect()
}

fn check_currencies(tech: &Technology) -> Vec<ConsistencyWarning> {
    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, parameter) in tech.parameters() {
        for currency in parameter.units().currency_terms().keys() {
            seen.entry(currency.to_string()).or_default().push(name.clone());
        }
    }

    if seen.len() <= 1 {
        return Vec::new();
    }
    let currencies: Vec<String> = seen.keys().cloned().collect();
    let mut parameters: Vec<String> = seen.into_values().flatten().collect();
    parameters.sort();
    parameters.dedup();
    vec![ConsistencyWarning::new(
        "currency-alignment",
        parameters,
        format!("parameters use different currency units: {}", currencies.join(", ")),
    )]
}

fn check_prerequisites(tech: &Technology) -> Vec<ConsistencyWarning> {
    PREREQUISITES
        .iter()
        .filter(|(name, _)| tech.contains(name))
        .filter_map(|(name, required)| {
            let missing: Vec<&str> = required.iter().copied().filter(|r| !tech.contains(r)).collect();
            if missing.is_empty() {
                return None;
            }
            Some(ConsistencyWarning::new(
                "prerequisites",
                vec![name.to_string()],
                format!("'{}' is present without {}", name, missing.join(", ")),
            ))
        })
        .collect()
}

fn check_derived_values(tech: &Technology, registry: &DerivationRegistry) -> Vec<ConsistencyWarning> {
    let mut warnings = Vec::new();
    for rule in registry.rules() {
        let Some(stated) = tech.get(&rule.target) else { continue };
        let recomputed = match rule.apply(tech.parameters()) {
            Some(Ok(p)) => p,
            Some(Err(e)) => {
                log::debug!("Skipping agreement check for '{}': {}", rule.target, e);
                continue;
            }
            None => continue,
        };
        let recomputed = match recomputed.to_unit(stated.units()) {
            Ok(p) => p.magnitude(),
            Err(e) => {
                log::debug!("Skipping agreement check for '{}': {}", rule.target, e);
                continue;
            }
        };

        let scale = stated.magnitude().abs().max(recomputed.abs());
        if scale > 0.0 && (stated.magnitude() - recomputed).abs() / scale > RELATIVE_TOLERANCE {
            let mut parameters = vec![rule.target.clone()];
            parameters.extend(rule.inputs.iter().cloned());
            warnings.push(ConsistencyWarning::new(
                "derived-value-agreement",
                parameters,
                format!(
                    "'{}' is {} {} but {} gives {}",
                    rule.target,
                    stated.magnitude(),
                    stated.units(),
                    rule.inputs.join(", "),
                    recomputed
                ),
            ));
        }
    }
    warnings
}
