//! Parametric growth curves for projecting parameters over time
//!
//! Every model is a closed-form curve `f(x; params)`. Parameters can be set
//! up front, fitted to `(year, value)` data, or mixed: fitting only estimates
//! the parameters that are still unset.

mod fit;
mod models;
mod project;

pub use models::{
    ExponentialGrowth, GeneralizedLogisticGrowth, GompertzGrowth, LinearGrowth, LogisticGrowth,
};
pub use project::{project_with_model, project_with_registry};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::FitConfig;
use crate::error::{Result, TechDataError};

/// Parameter values (by position in `parameter_names`) and collected data
///
/// A value is either fixed (supplied by the caller or anchored) or estimated
/// by the last fit. Only fixed values survive a refit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelState {
    values: Vec<Option<f64>>,
    fixed: Vec<bool>,
    data_points: Vec<(f64, f64)>,
}

impl ModelState {
    pub fn new(parameter_count: usize) -> Self {
        Self {
            values: vec![None; parameter_count],
            fixed: vec![false; parameter_count],
            data_points: Vec::new(),
        }
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn data_points(&self) -> &[(f64, f64)] {
        &self.data_points
    }

    fn fix(&mut self, index: usize, value: f64) {
        self.values[index] = Some(value);
        self.fixed[index] = true;
    }

    fn estimate(&mut self, index: usize, value: f64) {
        self.values[index] = Some(value);
        self.fixed[index] = false;
    }
}

/// A growth curve with its parameter state
pub trait GrowthModel: fmt::Debug + Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Parameter names in evaluation order
    fn parameter_names(&self) -> &'static [&'static str];

    /// Parameters redundant with a scale parameter, pinned rather than fitted
    fn reference_parameters(&self) -> &'static [&'static str] {
        &[]
    }

    /// Curve value at `x` for a full parameter vector
    fn evaluate(&self, x: f64, params: &[f64]) -> f64;

    /// Starting point for the optimizer, one value per parameter
    fn initial_guess(&self, data: &[(f64, f64)]) -> Vec<f64>;

    fn state(&self) -> &ModelState;

    fn state_mut(&mut self) -> &mut ModelState;

    fn box_clone(&self) -> Box<dyn GrowthModel>;

    /// Append `(x, y)` observations
    fn add_data(&mut self, points: &[(f64, f64)]) {
        self.state_mut().data_points.extend_from_slice(points);
    }

    fn data_points(&self) -> &[(f64, f64)] {
        self.state().data_points()
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        let index = self.parameter_names().iter().position(|n| *n == name)?;
        self.state().values[index]
    }

    /// Value held fixed across fits, `None` for unset or fitted parameters
    fn fixed_parameter(&self, name: &str) -> Option<f64> {
        let index = self.parameter_names().iter().position(|n| *n == name)?;
        if self.state().fixed[index] {
            self.state().values[index]
        } else {
            None
        }
    }

    /// Set and fix a parameter; fits never change it afterwards
    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        let index = self.parameter_names().iter().position(|n| *n == name).ok_or_else(|| {
            TechDataError::InvalidArgument(format!(
                "{} has no parameter '{}' (expected one of {})",
                self.kind(),
                name,
                self.parameter_names().join(", ")
            ))
        })?;
        self.state_mut().fix(index, value);
        Ok(())
    }

    /// Builder-style `set_parameter`
    fn with_parameter(mut self, name: &str, value: f64) -> Result<Self>
    where
        Self: Sized,
    {
        self.set_parameter(name, value)?;
        Ok(self)
    }

    /// Names of parameters a fit estimates (everything not fixed)
    fn free_parameters(&self) -> Vec<&'static str> {
        self.parameter_names()
            .iter()
            .zip(self.state().fixed.iter())
            .filter(|(_, fixed)| !**fixed)
            .map(|(n, _)| *n)
            .collect()
    }

    fn is_specified(&self) -> bool {
        self.state().values.iter().all(Option::is_some)
    }

    /// Fit unset parameters to the collected data with default settings
    fn fit(&mut self, p0: &BTreeMap<String, f64>) -> Result<()> {
        self.fit_with(p0, &FitConfig::default())
    }

    fn fit_with(&mut self, p0: &BTreeMap<String, f64>, config: &FitConfig) -> Result<()> {
        fit::fit_model(self, p0, config)
    }

    /// Evaluate at `x`; every parameter must be set or fitted
    fn project(&self, x: f64) -> Result<f64> {
        let unset: Vec<&str> = self
            .parameter_names()
            .iter()
            .zip(self.state().values.iter())
            .filter(|(_, v)| v.is_none())
            .map(|(n, _)| *n)
            .collect();
        if !unset.is_empty() {
            return Err(TechDataError::State(format!(
                "{} cannot project with unset parameters: {}",
                self.kind(),
                unset.join(", ")
            )));
        }
        let params: Vec<f64> = self.state().values.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        Ok(self.evaluate(x, &params))
    }

    /// Fix reference parameters the caller has not fixed at `reference`
    fn anchor(&mut self, reference: f64) {
        for name in self.reference_parameters() {
            let index = self.parameter_names().iter().position(|n| n == name);
            if let Some(index) = index {
                if !self.state().fixed[index] {
                    self.state_mut().fix(index, reference);
                }
            }
        }
    }
}

impl Clone for Box<dyn GrowthModel> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelKind {
    Linear,
    Exponential,
    Logistic,
    GeneralizedLogistic,
    Gompertz,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Linear => "LinearGrowth",
            ModelKind::Exponential => "ExponentialGrowth",
            ModelKind::Logistic => "LogisticGrowth",
            ModelKind::GeneralizedLogistic => "GeneralizedLogisticGrowth",
            ModelKind::Gompertz => "GompertzGrowth",
        }
    }

    /// Fresh model of this kind with every parameter unset
    pub fn create(&self) -> Box<dyn GrowthModel> {
        match self {
            ModelKind::Linear => Box::new(LinearGrowth::new()),
            ModelKind::Exponential => Box::new(ExponentialGrowth::new()),
            ModelKind::Logistic => Box::new(LogisticGrowth::new()),
            ModelKind::GeneralizedLogistic => Box::new(GeneralizedLogisticGrowth::new()),
            ModelKind::Gompertz => Box::new(GompertzGrowth::new()),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Keyword understood by `LinearGrowth` in addition to its parameter names
pub const ANNUAL_GROWTH_RATE: &str = "annual_growth_rate";

/// Case-sensitive model name lookup, plus the optimizer settings used when
/// a projection has to fit its model
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    aliases: BTreeMap<String, ModelKind>,
    fit: FitConfig,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        let table = [
            ("LinearGrowth", ModelKind::Linear),
            ("linear", ModelKind::Linear),
            ("ExponentialGrowth", ModelKind::Exponential),
            ("exponential", ModelKind::Exponential),
            ("LogisticGrowth", ModelKind::Logistic),
            ("logistic", ModelKind::Logistic),
            ("GeneralizedLogisticGrowth", ModelKind::GeneralizedLogistic),
            ("GeneralLogisticGrowth", ModelKind::GeneralizedLogistic),
            ("generalized_logistic", ModelKind::GeneralizedLogistic),
            ("GompertzGrowth", ModelKind::Gompertz),
            ("gompertz", ModelKind::Gompertz),
        ];
        Self {
            aliases: table.into_iter().map(|(n, k)| (n.to_string(), k)).collect(),
            fit: FitConfig::default(),
        }
    }
}

impl ModelRegistry {
    pub fn with_fit_config(mut self, fit: FitConfig) -> Self {
        self.fit = fit;
        self
    }

    pub fn fit_config(&self) -> &FitConfig {
        &self.fit
    }

    pub fn register_alias(&mut self, alias: &str, kind: ModelKind) {
        self.aliases.insert(alias.to_string(), kind);
    }

    pub fn resolve(&self, name: &str) -> Result<ModelKind> {
        self.aliases.get(name).copied().ok_or_else(|| {
            TechDataError::Lookup(format!(
                "unknown growth model '{}', known: {}",
                name,
                self.aliases.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Build a model from its name and parameter keywords
    pub fn instantiate(&self, name: &str, kwargs: &BTreeMap<String, f64>) -> Result<Box<dyn GrowthModel>> {
        let kind = self.resolve(name)?;
        let mut model = kind.create();
        for (key, value) in kwargs {
            if key == ANNUAL_GROWTH_RATE && kind == ModelKind::Linear {
                model.set_parameter("m", *value)?;
                model.set_parameter("c", 1.0)?;
            } else {
                model.set_parameter(key, *value)?;
            }
        }
        Ok(model)
    }
}

/// How `project_with_model` gets its model
#[derive(Debug)]
pub enum ModelSpec {
    Named { name: String, kwargs: BTreeMap<String, f64> },
    Instance(Box<dyn GrowthModel>),
}

impl ModelSpec {
    pub fn named(name: &str) -> Self {
        ModelSpec::Named { name: name.to_string(), kwargs: BTreeMap::new() }
    }

    /// Add a keyword to a named spec; no effect on an instance
    pub fn kwarg(mut self, key: &str, value: f64) -> Self {
        if let ModelSpec::Named { kwargs, .. } = &mut self {
            kwargs.insert(key.to_string(), value);
        }
        self
    }

    pub fn instance<M: GrowthModel + 'static>(model: M) -> Self {
        ModelSpec::Instance(Box::new(model))
    }
}

/// A projection target year, numeric or textual
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Year {
    Number(i32),
    Text(String),
}

impl Year {
    /// Integer year; text must hold an integer or an integral float
    pub fn resolve(&self) -> Result<i32> {
        match self {
            Year::Number(y) => Ok(*y),
            Year::Text(text) => {
                let trimmed = text.trim();
                if let Ok(y) = trimmed.parse::<i32>() {
                    return Ok(y);
                }
                match trimmed.parse::<f64>() {
                    Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() <= i32::MAX as f64 => Ok(f as i32),
                    _ => Err(TechDataError::InvalidArgument(format!("'{}' is not a year", text))),
                }
            }
        }
    }
}

impl From<i32> for Year {
    fn from(year: i32) -> Self {
        Year::Number(year)
    }
}

impl From<&str> for Year {
    fn from(text: &str) -> Self {
        Year::Text(text.to_string())
    }
}
