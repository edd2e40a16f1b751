//! Error types shared by every module of the crate

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, TechDataError>;

/// Top-level error for parameter, technology and growth-model operations
#[derive(Debug, Error)]
pub enum TechDataError {
    /// Malformed or incomplete Technology / Parameter construction
    #[error("schema error: {0}")]
    Schema(String),

    /// Arithmetic between parameters with mismatched attributes
    #[error("operation not permitted on parameters with different {attribute}: '{left}' and '{right}'")]
    Incompatible {
        attribute: &'static str,
        left: String,
        right: String,
    },

    #[error(transparent)]
    Unit(#[from] UnitError),

    /// Unknown currency code, unmapped country or unknown model name
    #[error("lookup error: {0}")]
    Lookup(String),

    #[error(transparent)]
    Fit(#[from] FitError),

    /// A growth model was evaluated with unset parameters
    #[error("state error: {0}")]
    State(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure reported by the external deflation / currency provider
    #[error("currency provider error: {0}")]
    Provider(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised by the unit algebra
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitError {
    #[error("cannot parse unit '{input}' at byte {position}: {message}")]
    Parse {
        input: String,
        position: usize,
        message: String,
    },

    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("cannot convert from '{from}' to '{to}': incompatible dimensions")]
    Incompatible { from: String, to: String },

    /// Currency conversion needs exchange/deflation data, use `change_currency`
    #[error("cannot convert from '{from}' to '{to}': currency conversion is not supported here, use `change_currency`")]
    CurrencyMismatch { from: String, to: String },

    #[error("unit '{0}' does not contain a currency-year unit")]
    NoCurrency(String),
}

/// Errors raised while fitting a growth model
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("need at least {required} data points to fit {required} free parameters, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("optimizer did not converge after {iterations} iterations (residual sum of squares {cost:e})")]
    NonConvergence { iterations: usize, cost: f64 },

    #[error("model produced non-finite values for the supplied data/initial guess")]
    NonFinite,

    #[error("unknown model parameter '{0}' in initial guess")]
    UnknownParameter(String),
}

impl From<serde_json::Error> for TechDataError {
    fn from(err: serde_json::Error) -> Self {
        TechDataError::Config(err.to_string())
    }
}

impl From<std::io::Error> for TechDataError {
    fn from(err: std::io::Error) -> Self {
        TechDataError::Config(err.to_string())
    }
}
