//! Technology aggregate: the parameters describing one technology in one
//! region, case and year
//!
//! A `Technology` is immutable once built. Adding, removing or deriving
//! parameters returns a new value with the same identity fields.

mod consistency;
mod derivation;

pub use consistency::{ConsistencyRule, ConsistencyRules, ConsistencyWarning};
pub use derivation::{
    Derivation, DerivationMode, DerivationRegistry, DerivationReport, DerivationRule,
    ParameterRequest, SkipReason, SkippedDerivation,
};

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::config::DerivationConfig;
use crate::error::{Result, TechDataError};
use crate::parameter::Parameter;

/// A named set of parameters for one technology/region/case/year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TechnologyRecord", into = "TechnologyRecord")]
pub struct Technology {
    name: String,
    detailed_technology: Option<String>,
    region: String,
    case: String,
    year: i32,
    parameters: BTreeMap<String, Parameter>,
}

/// Wire form; every field optional so validation can name what is missing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TechnologyRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detailed_technology: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    case: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    parameters: BTreeMap<String, Parameter>,
}

impl TryFrom<TechnologyRecord> for Technology {
    type Error = TechDataError;

    fn try_from(record: TechnologyRecord) -> Result<Self> {
        TechnologyBuilder { inner: record }.build()
    }
}

impl From<Technology> for TechnologyRecord {
    fn from(tech: Technology) -> Self {
        TechnologyRecord {
            name: Some(tech.name),
            detailed_technology: tech.detailed_technology,
            region: Some(tech.region),
            case: Some(tech.case),
            year: Some(tech.year),
            parameters: tech.parameters,
        }
    }
}

/// Builder for [`Technology`]
#[derive(Debug, Clone, Default)]
pub struct TechnologyBuilder {
    inner: TechnologyRecord,
}

impl TechnologyBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.inner.name = Some(name.to_string());
        self
    }

    pub fn detailed_technology(mut self, detailed: &str) -> Self {
        self.inner.detailed_technology = Some(detailed.to_string());
        self
    }

    pub fn region(mut self, region: &str) -> Self {
        self.inner.region = Some(region.to_string());
        self
    }

    pub fn case(mut self, case: &str) -> Self {
        self.inner.case = Some(case.to_string());
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.inner.year = Some(year);
        self
    }

    pub fn parameter(mut self, name: &str, parameter: Parameter) -> Self {
        self.inner.parameters.insert(name.to_string(), parameter);
        self
    }

    pub fn parameters(mut self, parameters: BTreeMap<String, Parameter>) -> Self {
        self.inner.parameters.extend(parameters);
        self
    }

    pub fn build(self) -> Result<Technology> {
        let record = self.inner;
        let name = required_text("name", record.name)?;
        let region = required_text("region", record.region)?;
        let case = required_text("case", record.case)?;
        let year = record
            .year
            .ok_or_else(|| TechDataError::Schema("technology is missing 'year'".to_string()))?;

        let mut parameters = BTreeMap::new();
        for (key, parameter) in record.parameters {
            if key.trim().is_empty() {
                return Err(TechDataError::Schema(format!(
                    "technology '{}' has a parameter with an empty name",
                    name
                )));
            }
            let parameter = parameter.normalized().map_err(|e| {
                TechDataError::Schema(format!("parameter '{}' of technology '{}': {}", key, name, e))
            })?;
            parameters.insert(key, parameter);
        }

        Ok(Technology {
            name,
            detailed_technology: record.detailed_technology.filter(|d| !d.trim().is_empty()),
            region,
            case,
            year,
            parameters,
        })
    }
}

fn required_text(field: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(TechDataError::Schema(format!("technology is missing '{}'", field))),
    }
}

impl Technology {
    pub fn builder() -> TechnologyBuilder {
        TechnologyBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn detailed_technology(&self) -> Option<&str> {
        self.detailed_technology.as_deref()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn case(&self) -> &str {
        &self.case
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    /// Same identity with `name` set to `parameter` (inserted or replaced)
    pub fn with_parameter(&self, name: &str, parameter: Parameter) -> Technology {
        let mut parameters = self.parameters.clone();
        parameters.insert(name.to_string(), parameter);
        self.with_parameters(parameters)
    }

    pub fn without_parameter(&self, name: &str) -> Technology {
        let mut parameters = self.parameters.clone();
        parameters.remove(name);
        self.with_parameters(parameters)
    }

    /// Same identity and parameters, different year
    pub fn at_year(&self, year: i32) -> Technology {
        Technology { year, ..self.clone() }
    }

    pub(crate) fn with_parameters(&self, parameters: BTreeMap<String, Parameter>) -> Technology {
        Technology {
            name: self.name.clone(),
            detailed_technology: self.detailed_technology.clone(),
            region: self.region.clone(),
            case: self.case.clone(),
            year: self.year,
            parameters,
        }
    }

    /// Run the built-in consistency rules
    pub fn check_consistency(&self) -> Vec<ConsistencyWarning> {
        ConsistencyRules::default().check(self)
    }

    pub fn check_consistency_with(&self, rules: &ConsistencyRules) -> Vec<ConsistencyWarning> {
        rules.check(self)
    }

    /// Derive parameters with the default rule table and configuration
    pub fn calculate_parameters(&self, request: &ParameterRequest) -> Derivation {
        self.calculate_parameters_with(request, &DerivationConfig::default(), &DerivationRegistry::default())
    }

    pub fn calculate_parameters_with(
        &self,
        request: &ParameterRequest,
        config: &DerivationConfig,
        registry: &DerivationRegistry,
    ) -> Derivation {
        derivation::derive(self, request, config, registry)
    }
}

impl Index<&str> for Technology {
    type Output = Parameter;

    fn index(&self, name: &str) -> &Parameter {
        match self.parameters.get(name) {
            Some(p) => p,
            None => panic!("technology '{}' has no parameter '{}'", self.name, name),
        }
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(detailed) = &self.detailed_technology {
            write!(f, " ({})", detailed)?;
        }
        write!(f, " [{}, {}, {}]", self.region, self.case, self.year)
    }
}
