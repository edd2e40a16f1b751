//! Rule-based derivation of missing technology parameters
//!
//! Each [`DerivationRule`] computes one target from a fixed list of inputs.
//! A target may have several rules; the first one whose inputs are all
//! present is used. Targets that cannot be derived are reported, never raised.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::DerivationConfig;
use crate::error::{Result, TechDataError};
use crate::parameter::Parameter;
use super::Technology;

/// Computes a target from its inputs, given in rule order
pub type DeriveFn = dyn Fn(&[&Parameter]) -> Result<Parameter> + Send + Sync;

/// One way of computing `target` from `inputs`
pub struct DerivationRule {
    pub target: String,
    pub inputs: Vec<String>,
    compute: Box<DeriveFn>,
}

impl DerivationRule {
    pub fn new<F>(target: &str, inputs: &[&str], compute: F) -> Self
    where
        F: Fn(&[&Parameter]) -> Result<Parameter> + Send + Sync + 'static,
    {
        Self {
            target: target.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            compute: Box::new(compute),
        }
    }

    /// Inputs absent from `parameters`
    pub fn missing_inputs(&self, parameters: &BTreeMap<String, Parameter>) -> Vec<String> {
        self.inputs.iter().filter(|i| !parameters.contains_key(*i)).cloned().collect()
    }

    /// Apply the rule; `None` when an input is missing
    pub fn apply(&self, parameters: &BTreeMap<String, Parameter>) -> Option<Result<Parameter>> {
        let inputs: Option<Vec<&Parameter>> = self.inputs.iter().map(|i| parameters.get(i)).collect();
        inputs.map(|values| (self.compute)(&values))
    }
}

impl fmt::Debug for DerivationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivationRule")
            .field("target", &self.target)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// Ordered table of derivation rules
#[derive(Debug)]
pub struct DerivationRegistry {
    rules: Vec<DerivationRule>,
}

impl DerivationRegistry {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn register(&mut self, rule: DerivationRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[DerivationRule] {
        &self.rules
    }

    pub fn rules_for<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a DerivationRule> + 'a {
        self.rules.iter().filter(move |r| r.target == target)
    }

    /// Distinct targets in registration order
    pub fn targets(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for rule in &self.rules {
            if !out.contains(&rule.target) {
                out.push(rule.target.clone());
            }
        }
        out
    }
}

impl Default for DerivationRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(DerivationRule::new(
            "specific-investment",
            &["investment", "capacity"],
            |p| Ok(p[0] / p[1]),
        ));
        registry.register(DerivationRule::new(
            "investment",
            &["specific-investment", "capacity"],
            |p| Ok(p[0] * p[1]),
        ));
        registry.register(DerivationRule::new(
            "capacity",
            &["investment", "specific-investment"],
            |p| Ok(p[0] / p[1]),
        ));
        registry.register(DerivationRule::new(
            "annuity-factor",
            &["discount-rate", "lifetime"],
            |p| annuity_factor(p[0], p[1]),
        ));
        registry.register(DerivationRule::new(
            "equivalent-annual-cost",
            &["investment", "annuity-factor"],
            |p| Ok(p[0] * p[1]),
        ));
        registry.register(DerivationRule::new(
            "fixed-om-cost",
            &["investment", "fixed-om"],
            |p| Ok(p[0] * p[1]),
        ));
        registry.register(DerivationRule::new(
            "total-annual-cost",
            &["equivalent-annual-cost", "fixed-om-cost"],
            |p| p[0].try_add(p[1]),
        ));
        registry
    }
}

/// Capital recovery factor `r / (1 - (1 + r)^-n)`, `1/n` for a zero rate
fn annuity_factor(discount_rate: &Parameter, lifetime: &Parameter) -> Result<Parameter> {
    let r = discount_rate.to("dimensionless")?.magnitude();
    let n = if lifetime.units().is_dimensionless() {
        lifetime.magnitude()
    } else {
        lifetime.to("a")?.magnitude()
    };

    if n <= 0.0 {
        return Err(TechDataError::InvalidArgument(format!("lifetime must be positive, got {} a", n)));
    }

    let factor = if r.abs() < 1e-12 { 1.0 / n } else { r / (1.0 - (1.0 + r).powf(-n)) };
    Parameter::new(factor, "1/a")
}

/// Evaluation strategy for chained rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationMode {
    /// Every rule reads only the parameters present before derivation
    SinglePass,
    /// Repeat passes, feeding derived values back, until nothing changes
    #[default]
    FixedPoint,
}

/// Which parameters to derive
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterRequest {
    /// Every registered target not yet present
    Missing,
    /// Exactly these targets, recomputing any that are present
    Named(Vec<String>),
}

impl ParameterRequest {
    pub fn named<S: AsRef<str>>(names: &[S]) -> Self {
        ParameterRequest::Named(names.iter().map(|s| s.as_ref().to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoRule,
    MissingInputs(Vec<String>),
    Failed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoRule => write!(f, "no derivation rule"),
            SkipReason::MissingInputs(inputs) => write!(f, "missing inputs: {}", inputs.join(", ")),
            SkipReason::Failed(msg) => write!(f, "computation failed: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDerivation {
    pub target: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DerivationReport {
    /// Targets derived, in order of derivation
    pub derived: Vec<String>,
    pub skipped: Vec<SkippedDerivation>,
    pub passes: usize,
}

/// Result of [`Technology::calculate_parameters`]
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub technology: Technology,
    pub report: DerivationReport,
}

fn try_derive(
    target: &str,
    parameters: &BTreeMap<String, Parameter>,
    registry: &DerivationRegistry,
) -> std::result::Result<Parameter, SkipReason> {
    let mut reason = SkipReason::NoRule;
    let mut fewest_missing = usize::MAX;

    for rule in registry.rules_for(target) {
        match rule.apply(parameters) {
            Some(Ok(p)) if p.magnitude().is_finite() => {
                let provenance = format!("Calculated as {} from {}", target, rule.inputs.join(", "));
                return Ok(p.with_provenance(provenance));
            }
            Some(Ok(p)) => {
                reason = SkipReason::Failed(format!("non-finite result {}", p.magnitude()));
                fewest_missing = 0;
            }
            Some(Err(e)) => {
                reason = SkipReason::Failed(e.to_string());
                fewest_missing = 0;
            }
            None => {
                let missing = rule.missing_inputs(parameters);
                if missing.len() < fewest_missing {
                    fewest_missing = missing.len();
                    reason = SkipReason::MissingInputs(missing);
                }
            }
        }
    }

    Err(reason)
}

pub(super) fn derive(
    technology: &Technology,
    request: &ParameterRequest,
    config: &DerivationConfig,
    registry: &DerivationRegistry,
) -> Derivation {
    let original = technology.parameters();
    let mut pending: Vec<String> = match request {
        ParameterRequest::Missing => registry
            .targets()
            .into_iter()
            .filter(|t| !original.contains_key(t))
            .collect(),
        ParameterRequest::Named(names) => {
            let mut unique: Vec<String> = Vec::new();
            for name in names {
                if !unique.contains(name) {
                    unique.push(name.clone());
                }
            }
            unique
        }
    };

    let mut current = original.clone();
    let mut report = DerivationReport::default();
    let mut reasons: BTreeMap<String, SkipReason> = BTreeMap::new();
    let max_passes = config.max_passes.max(1);

    while !pending.is_empty() && report.passes < max_passes {
        report.passes += 1;
        let mut progressed = false;
        let mut still_pending = Vec::new();
        // Rules in one pass only see values derived in earlier passes
        let snapshot = current.clone();
        let source = match config.mode {
            DerivationMode::SinglePass => original,
            DerivationMode::FixedPoint => &snapshot,
        };

        for target in pending {
            match try_derive(&target, source, registry) {
                Ok(parameter) => {
                    current.insert(target.clone(), parameter);
                    reasons.remove(&target);
                    report.derived.push(target);
                    progressed = true;
                }
                Err(reason) => {
                    reasons.insert(target.clone(), reason);
                    still_pending.push(target);
                }
            }
        }

        pending = still_pending;
        log::debug!(
            "Derivation pass {} for {}: {} derived so far, {} pending",
            report.passes,
            technology,
            report.derived.len(),
            pending.len()
        );

        if config.mode == DerivationMode::SinglePass || !progressed {
            break;
        }
    }

    report.skipped = pending
        .into_iter()
        .map(|target| {
            let reason = reasons.remove(&target).unwrap_or(SkipReason::NoRule);
            SkippedDerivation { target, reason }
        })
        .collect();

    Derivation { technology: technology.with_parameters(current), report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::technology::tests::electrolyser;
    use approx::assert_relative_eq;

    fn with_finance(tech: &Technology) -> Technology {
        tech.with_parameter("discount-rate", Parameter::new(5.0, "percent").unwrap())
            .with_parameter("fixed-om", Parameter::new(2.0, "percent/a").unwrap())
    }

    #[test]
    fn test_specific_investment_from_investment_and_capacity() {
        let tech = electrolyser();
        let result = tech.calculate_parameters(&ParameterRequest::named(&["specific-investment"]));

        let si = &result.technology["specific-investment"];
        assert_relative_eq!(si.magnitude(), 100.0);
        assert_eq!(si.units().to_string(), "EUR_2020/kW");
        assert_eq!(si.provenance(), Some("Calculated as specific-investment from investment, capacity"));
        assert_eq!(result.report.derived, vec!["specific-investment".to_string()]);
        assert!(result.report.skipped.is_empty());

        // receiver untouched
        assert!(!tech.contains("specific-investment"));
    }

    #[test]
    fn test_missing_request_is_idempotent() {
        let tech = with_finance(&electrolyser());
        let first = tech.calculate_parameters(&ParameterRequest::Missing);
        let second = first.technology.calculate_parameters(&ParameterRequest::Missing);

        assert!(second.report.derived.is_empty());
        assert_eq!(second.technology, first.technology);
    }

    #[test]
    fn test_fixed_point_resolves_chains() {
        let tech = with_finance(&electrolyser());
        let result = tech.calculate_parameters(&ParameterRequest::Missing);
        let t = &result.technology;

        let r: f64 = 0.05;
        let crf = r / (1.0 - (1.0 + r).powf(-20.0));
        assert_relative_eq!(t["annuity-factor"].magnitude(), crf, max_relative = 1e-12);
        assert_relative_eq!(t["equivalent-annual-cost"].magnitude(), 1000.0 * crf, max_relative = 1e-12);

        let total = t["total-annual-cost"].to("EUR_2020/a").unwrap();
        assert_relative_eq!(total.magnitude(), 1000.0 * crf + 20.0, max_relative = 1e-12);
        assert!(result.report.passes >= 2);
        assert!(result.report.skipped.is_empty());
    }

    #[test]
    fn test_single_pass_does_not_chain() {
        let tech = with_finance(&electrolyser());
        let config = DerivationConfig { mode: DerivationMode::SinglePass, ..Default::default() };
        let result = tech.calculate_parameters_with(
            &ParameterRequest::Missing,
            &config,
            &DerivationRegistry::default(),
        );

        assert!(result.technology.contains("annuity-factor"));
        assert!(!result.technology.contains("equivalent-annual-cost"));
        assert_eq!(result.report.passes, 1);
        let skipped: Vec<&str> = result.report.skipped.iter().map(|s| s.target.as_str()).collect();
        assert!(skipped.contains(&"equivalent-annual-cost"));
        assert!(skipped.contains(&"total-annual-cost"));
    }

    #[test]
    fn test_skips_are_reported_with_reasons() {
        let tech = electrolyser().without_parameter("capacity");
        let result = tech.calculate_parameters(&ParameterRequest::named(&["specific-investment", "efficiency"]));

        assert!(result.report.derived.is_empty());
        assert_eq!(
            result.report.skipped,
            vec![
                SkippedDerivation {
                    target: "specific-investment".to_string(),
                    reason: SkipReason::MissingInputs(vec!["capacity".to_string()]),
                },
                SkippedDerivation { target: "efficiency".to_string(), reason: SkipReason::NoRule },
            ]
        );
        assert_eq!(result.technology, tech);
    }

    #[test]
    fn test_named_present_parameter_is_recomputed() {
        let tech = electrolyser().with_parameter("specific-investment", Parameter::new(1.0, "EUR_2020/kW").unwrap());
        let result = tech.calculate_parameters(&ParameterRequest::named(&["specific-investment"]));
        assert_relative_eq!(result.technology["specific-investment"].magnitude(), 100.0);

        let missing_only = tech.calculate_parameters(&ParameterRequest::Missing);
        assert_relative_eq!(missing_only.technology["specific-investment"].magnitude(), 1.0);
    }

    #[test]
    fn test_failed_computation_is_reported() {
        let tech = electrolyser()
            .with_parameter("lifetime", Parameter::new(0.0, "a").unwrap())
            .with_parameter("discount-rate", Parameter::new(0.05, "dimensionless").unwrap());
        let result = tech.calculate_parameters(&ParameterRequest::named(&["annuity-factor"]));
        assert!(matches!(result.report.skipped[0].reason, SkipReason::Failed(_)));
    }

    #[test]
    fn test_zero_discount_rate_annuity() {
        let tech = electrolyser().with_parameter("discount-rate", Parameter::new(0.0, "percent").unwrap());
        let result = tech.calculate_parameters(&ParameterRequest::named(&["annuity-factor"]));
        assert_relative_eq!(result.technology["annuity-factor"].magnitude(), 1.0 / 20.0);
    }

    #[test]
    fn test_custom_rule_registration() {
        let mut registry = DerivationRegistry::default();
        registry.register(DerivationRule::new("output", &["capacity"], |p| {
            Ok(p[0] * &Parameter::new(8760.0, "h/a")?)
        }));
        let result = electrolyser().calculate_parameters_with(
            &ParameterRequest::named(&["output"]),
            &DerivationConfig::default(),
            &registry,
        );
        let output = result.technology["output"].to("MWh/a").unwrap();
        assert_relative_eq!(output.magnitude(), 87.6, max_relative = 1e-12);
    }
}
