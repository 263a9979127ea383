use thiserror::Error;

use crate::params::Variable;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("cohort '{cohort}' is missing required parameter '{variable}'")]
    MissingParameter { cohort: String, variable: Variable },
    #[error("invalid parameter for '{variable}': {reason}")]
    InvalidParameter { variable: String, reason: String },
    #[error("degenerate time in bed for participant {participant}, day {day}: {tib_min:.3} min")]
    DegenerateInterval {
        participant: u32,
        day: u32,
        tib_min: f64,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    Date(String),
}

impl SynthError {
    pub(crate) fn invalid(variable: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            variable: variable.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = SynthError> = std::result::Result<T, E>;
