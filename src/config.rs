use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::assemble::{OutOfBedDelay, DEFAULT_DAYS, DEFAULT_PARTICIPANTS, DEFAULT_SEED};
use crate::augment::AugmentConfig;
use crate::derive::DegeneratePolicy;
use crate::error::{Result, SynthError};
use crate::output::OUTPUT_SCHEMA_VERSION;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortConfig {
    pub name: String,
    /// Parameter CSV, relative paths resolve against the config file.
    pub parameters: PathBuf,
    /// Overrides the run seed for this cohort only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub schema_version: String,
    pub participants: u32,
    pub days: u32,
    pub seed: u64,
    pub degenerate_policy: DegeneratePolicy,
    pub out_of_bed_delay: OutOfBedDelay,
    pub cohorts: Vec<CohortConfig>,
    pub augment: AugmentConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            schema_version: OUTPUT_SCHEMA_VERSION.to_string(),
            participants: DEFAULT_PARTICIPANTS,
            days: DEFAULT_DAYS,
            seed: DEFAULT_SEED,
            degenerate_policy: DegeneratePolicy::Clamp,
            out_of_bed_delay: OutOfBedDelay::default(),
            cohorts: vec![
                CohortConfig {
                    name: "control".to_string(),
                    parameters: PathBuf::from(
                        "data/natale2009_control_group_sleep_main_parameters.csv",
                    ),
                    seed: None,
                },
                CohortConfig {
                    name: "insomnia".to_string(),
                    parameters: PathBuf::from(
                        "data/natale2009_insomnia_group_sleep_main_parameters.csv",
                    ),
                    seed: None,
                },
            ],
            augment: AugmentConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut cfg = Self::from_toml_str(&raw)?;
        if let Some(base) = path.parent() {
            cfg.resolve_relative_to(base);
        }
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: RunConfig = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn resolve_relative_to(&mut self, base: &Path) {
        for cohort in &mut self.cohorts {
            if cohort.parameters.is_relative() {
                cohort.parameters = base.join(&cohort.parameters);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != OUTPUT_SCHEMA_VERSION {
            return Err(SynthError::InvalidConfig(format!(
                "schema_version {} does not match output schema {}",
                self.schema_version, OUTPUT_SCHEMA_VERSION
            )));
        }
        if self.participants == 0 {
            return Err(SynthError::InvalidConfig(
                "participants must be greater than zero".to_string(),
            ));
        }
        if self.days == 0 {
            return Err(SynthError::InvalidConfig(
                "days must be greater than zero".to_string(),
            ));
        }
        if self.cohorts.is_empty() {
            return Err(SynthError::InvalidConfig(
                "at least one cohort must be configured".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for cohort in &self.cohorts {
            validate_cohort_name(&cohort.name)?;
            if !seen.insert(cohort.name.as_str()) {
                return Err(SynthError::InvalidConfig(format!(
                    "duplicate cohort name '{}'",
                    cohort.name
                )));
            }
        }

        self.out_of_bed_delay.validate()?;
        if self.augment.enabled {
            self.augment.parsed_start_date()?;
        }
        Ok(())
    }

    pub fn cohort_seed(&self, cohort: &CohortConfig) -> u64 {
        cohort.seed.unwrap_or(self.seed)
    }
}

/// Cohort names end up in file names.
pub fn validate_cohort_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(SynthError::InvalidConfig(format!(
            "cohort name '{name}' must be non-empty and use only [A-Za-z0-9_-]"
        )))
    }
}
