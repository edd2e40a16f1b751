//! Technology Data - techno-economic parameters of energy technologies
//!
//! This library provides:
//! - Unit algebra with currency-year units (`EUR_2020/kW`)
//! - Parameters with carrier/heating-value tags, currency and inflation adjustment
//! - Technologies with consistency checks and rule-based derivation of missing values
//! - Collections with parallel bulk operations
//! - Growth models (linear, exponential, logistic, generalized logistic, Gompertz)
//!   fitted by Levenberg-Marquardt and used to project parameters over time

pub mod units;
pub mod parameter;
pub mod technology;
pub mod collection;
pub mod growth;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use units::{CurrencyYear, Unit};
pub use parameter::{CurrencyContext, DataSource, Deflator, HeatingValue, Parameter};
pub use technology::{Derivation, ParameterRequest, Technology};
pub use collection::{KeepRemaining, ParameterModel, TechnologyCollection, TechnologyFilter};
pub use growth::{project_with_model, GrowthModel, ModelRegistry, ModelSpec, Year};
pub use config::EngineConfig;
pub use error::{Result, TechDataError};
