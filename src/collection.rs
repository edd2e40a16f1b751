//! Ordered collections of technologies with bulk operations
//!
//! Bulk consistency checks and derivations run element-wise on the rayon
//! pool. Each element is handled in isolation and reported at its index.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Index;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::DerivationConfig;
use crate::error::{Result, TechDataError};
use crate::growth::{GrowthModel, LinearGrowth, Year};
use crate::parameter::{Parameter, SourceCollection};
use crate::technology::{
    ConsistencyRules, ConsistencyWarning, DerivationRegistry, DerivationReport, ParameterRequest,
    Technology,
};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TechnologyCollection {
    technologies: Vec<Technology>,
}

/// Case-insensitive substring filter on identity fields; `None` matches anything
#[derive(Debug, Clone, Default)]
pub struct TechnologyFilter {
    pub name: Option<String>,
    pub detailed_technology: Option<String>,
    pub region: Option<String>,
    pub case: Option<String>,
    pub year: Option<i32>,
}

impl TechnologyFilter {
    pub fn matches(&self, tech: &Technology) -> bool {
        fn contains(haystack: Option<&str>, needle: &Option<String>) -> bool {
            match needle {
                None => true,
                Some(n) => haystack.is_some_and(|h| h.to_lowercase().contains(&n.to_lowercase())),
            }
        }

        contains(Some(tech.name()), &self.name)
            && contains(tech.detailed_technology(), &self.detailed_technology)
            && contains(Some(tech.region()), &self.region)
            && contains(Some(tech.case()), &self.case)
            && self.year.map_or(true, |y| y == tech.year())
    }
}

/// How `project` fills parameters without a growth model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepRemaining {
    /// Leave them out
    Drop,
    /// Dimensionless NaN placeholder
    #[serde(rename = "nan")]
    NaN,
    /// Mean over the collection
    Mean,
    /// Value from the element with the nearest year, earlier year on ties
    #[default]
    Closest,
}

const NAN_PLACEHOLDER_NOTE: &str = "Placeholder parameters with NaN value.";

/// Growth model for one parameter of a collection projection, with an
/// optional starting point for its fit
#[derive(Clone)]
pub struct ParameterModel {
    model: Box<dyn GrowthModel>,
    initial_guess: BTreeMap<String, f64>,
}

impl ParameterModel {
    pub fn new(model: Box<dyn GrowthModel>) -> Self {
        Self { model, initial_guess: BTreeMap::new() }
    }

    pub fn with_initial_guess(mut self, p0: BTreeMap<String, f64>) -> Self {
        self.initial_guess = p0;
        self
    }

    pub fn model(&self) -> &dyn GrowthModel {
        self.model.as_ref()
    }

    pub fn initial_guess(&self) -> &BTreeMap<String, f64> {
        &self.initial_guess
    }
}

impl<M: GrowthModel + 'static> From<M> for ParameterModel {
    fn from(model: M) -> Self {
        Self::new(Box::new(model))
    }
}

/// Per-index consistency findings
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectionConsistency {
    pub warnings: Vec<Vec<ConsistencyWarning>>,
}

impl CollectionConsistency {
    pub fn is_consistent(&self) -> bool {
        self.warnings.iter().all(Vec::is_empty)
    }

    pub fn total(&self) -> usize {
        self.warnings.iter().map(Vec::len).sum()
    }
}

/// Derived collection with one report per element
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionDerivation {
    pub technologies: TechnologyCollection,
    pub reports: Vec<DerivationReport>,
}

impl TechnologyCollection {
    pub fn new(technologies: Vec<Technology>) -> Self {
        Self { technologies }
    }

    pub fn len(&self) -> usize {
        self.technologies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.technologies.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Technology> {
        self.technologies.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Technology> {
        self.technologies.get(index)
    }

    pub fn technologies(&self) -> &[Technology] {
        &self.technologies
    }

    pub fn into_vec(self) -> Vec<Technology> {
        self.technologies
    }

    pub fn filter<F>(&self, predicate: F) -> TechnologyCollection
    where
        F: Fn(&Technology) -> bool,
    {
        self.technologies.iter().filter(|t| predicate(t)).cloned().collect()
    }

    pub fn select(&self, filter: &TechnologyFilter) -> TechnologyCollection {
        self.filter(|t| filter.matches(t))
    }

    pub fn check_consistency(&self) -> CollectionConsistency {
        self.check_consistency_with(&ConsistencyRules::default())
    }

    pub fn check_consistency_with(&self, rules: &ConsistencyRules) -> CollectionConsistency {
        let warnings: Vec<Vec<ConsistencyWarning>> =
            self.technologies.par_iter().map(|t| t.check_consistency_with(rules)).collect();

        for (index, found) in warnings.iter().enumerate().filter(|(_, w)| !w.is_empty()) {
            log::warn!("{} consistency warning(s) for element {} ({})", found.len(), index, self.technologies[index]);
        }
        CollectionConsistency { warnings }
    }

    pub fn calculate_parameters(&self, request: &ParameterRequest) -> CollectionDerivation {
        self.calculate_parameters_with(request, &DerivationConfig::default(), &DerivationRegistry::default())
    }

    pub fn calculate_parameters_with(
        &self,
        request: &ParameterRequest,
        config: &DerivationConfig,
        registry: &DerivationRegistry,
    ) -> CollectionDerivation {
        let derivations: Vec<_> = self
            .technologies
            .par_iter()
            .map(|t| t.calculate_parameters_with(request, config, registry))
            .collect();

        let mut technologies = Vec::with_capacity(derivations.len());
        let mut reports = Vec::with_capacity(derivations.len());
        for (index, derivation) in derivations.into_iter().enumerate() {
            for skipped in &derivation.report.skipped {
                log::warn!(
                    "Element {} ({}): could not derive '{}': {}",
                    index,
                    derivation.technology,
                    skipped.target,
                    skipped.reason
                );
            }
            technologies.push(derivation.technology);
            reports.push(derivation.report);
        }

        CollectionDerivation { technologies: TechnologyCollection::new(technologies), reports }
    }

    /// Feed `(year, value)` of `parameter` from every element into `model` and fit it
    ///
    /// Values are converted to the unit of the first element holding the
    /// parameter. Elements without it are ignored. `p0` seeds the optimizer
    /// for parameters the model has not fixed.
    pub fn fit(&self, parameter: &str, model: &mut dyn GrowthModel, p0: &BTreeMap<String, f64>) -> Result<()> {
        let reference = self.reference_parameter(parameter)?;
        let points = self
            .technologies
            .iter()
            .filter_map(|t| t.get(parameter).map(|p| (t.year(), p)))
            .map(|(year, p)| aligned_magnitude(reference, p).map(|m| (year as f64, m)))
            .collect::<Result<Vec<_>>>()?;

        model.add_data(&points);
        model.fit(p0)
    }

    fn reference_parameter(&self, parameter: &str) -> Result<&Parameter> {
        self.technologies
            .iter()
            .find_map(|t| t.get(parameter))
            .ok_or_else(|| TechDataError::Lookup(format!("no technology in the collection has parameter '{}'", parameter)))
    }

    /// One technology per target year, modelled parameters from fitted curves
    ///
    /// Modelled parameters keep the unit and tags of the first element holding
    /// them; note and sources are cleared since the value is new.
    pub fn project(
        &self,
        to_years: &[Year],
        models: &BTreeMap<String, ParameterModel>,
        keep_remaining: KeepRemaining,
    ) -> Result<TechnologyCollection> {
        let first = self
            .technologies
            .first()
            .ok_or_else(|| TechDataError::InvalidArgument("cannot project an empty collection".to_string()))?;
        let years: Vec<i32> = to_years.iter().map(Year::resolve).collect::<Result<_>>()?;

        let mut fitted: Vec<(&str, Box<dyn GrowthModel>, &Parameter)> = Vec::new();
        for (name, entry) in models {
            let mut model = entry.model.clone();
            self.fit(name, model.as_mut(), &entry.initial_guess)?;
            fitted.push((name.as_str(), model, self.reference_parameter(name)?));
        }

        let remaining: BTreeSet<&str> = self
            .technologies
            .iter()
            .flat_map(|t| t.parameter_names())
            .filter(|n| !models.contains_key(*n))
            .collect();

        let mut means: BTreeMap<&str, Box<dyn GrowthModel>> = BTreeMap::new();
        if keep_remaining == KeepRemaining::Mean {
            for name in &remaining {
                let mut flat: Box<dyn GrowthModel> = Box::new(LinearGrowth::new().with_parameter("m", 0.0)?);
                self.fit(name, flat.as_mut(), &BTreeMap::new())?;
                means.insert(*name, flat);
            }
        }

        let mut projected = Vec::with_capacity(years.len());
        for year in years {
            let mut parameters = BTreeMap::new();

            for (name, model, reference) in &fitted {
                let value = model.project(year as f64)?;
                let provenance = format!("Projected to {} using {}.", year, model.kind());
                parameters.insert(name.to_string(), projected_parameter(reference, value, provenance));
            }

            for name in &remaining {
                let parameter = match keep_remaining {
                    KeepRemaining::Drop => continue,
                    KeepRemaining::NaN => {
                        Parameter::from_unit(f64::NAN, Default::default()).with_note(Some(NAN_PLACEHOLDER_NOTE.to_string()))
                    }
                    KeepRemaining::Mean => {
                        let reference = self.reference_parameter(name)?;
                        let mean = match means.get(name) {
                            Some(model) => model.project(year as f64)?,
                            None => f64::NAN,
                        };
                        let provenance = format!("Projected to {} using the mean over the collection.", year);
                        projected_parameter(reference, mean, provenance)
                    }
                    KeepRemaining::Closest => match self.closest(name, year) {
                        Some(p) => p.clone(),
                        None => continue,
                    },
                };
                parameters.insert(name.to_string(), parameter);
            }

            projected.push(first.at_year(year).with_parameters(parameters));
        }

        log::info!(
            "Projected collection of {} to {} year(s) with {} model(s)",
            self.len(),
            projected.len(),
            fitted.len()
        );
        Ok(TechnologyCollection::new(projected))
    }

    /// `parameter` from the element nearest to `year`, earlier year on ties
    fn closest(&self, parameter: &str, year: i32) -> Option<&Parameter> {
        self.technologies
            .iter()
            .filter_map(|t| t.get(parameter).map(|p| (t.year(), p)))
            .min_by_key(|(y, _)| ((i64::from(*y) - i64::from(year)).abs(), *y))
            .map(|(_, p)| p)
    }
}

/// New value in `reference`'s unit and tags, without its note or sources
fn projected_parameter(reference: &Parameter, value: f64, provenance: String) -> Parameter {
    reference
        .with_magnitude(value)
        .with_provenance(provenance)
        .with_note(None)
        .with_sources(SourceCollection::default())
}

/// `other` expressed in `reference`'s unit, with matching carrier and heating value
fn aligned_magnitude(reference: &Parameter, other: &Parameter) -> Result<f64> {
    reference.check_compatibility(other)?;
    other
        .to_unit(reference.units())
        .map(|p| p.magnitude())
        .map_err(|_| TechDataError::Incompatible {
            attribute: "units",
            left: reference.units().to_string(),
            right: other.units().to_string(),
        })
}

impl Index<usize> for TechnologyCollection {
    type Output = Technology;

    fn index(&self, index: usize) -> &Technology {
        &self.technologies[index]
    }
}

impl FromIterator<Technology> for TechnologyCollection {
    fn from_iter<I: IntoIterator<Item = Technology>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for TechnologyCollection {
    type Item = Technology;
    type IntoIter = std::vec::IntoIter<Technology>;

    fn into_iter(self) -> Self::IntoIter {
        self.technologies.into_iter()
    }
}

impl<'a> IntoIterator for &'a TechnologyCollection {
    type Item = &'a Technology;
    type IntoIter = std::slice::Iter<'a, Technology>;

    fn into_iter(self) -> Self::IntoIter {
        self.technologies.iter()
    }
}
