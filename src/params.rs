//! Group-level distribution parameters for one cohort.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::parse_clock;
use crate::error::{Result, SynthError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Variable {
    LightsOff,
    SleepEnd,
    OutOfBed,
    Midpoint,
    Sol,
    Waso,
    Tib,
    Tst,
    Se,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Clock,
    Minutes,
    Percent,
}

impl Variable {
    pub const ALL: [Variable; 9] = [
        Variable::LightsOff,
        Variable::SleepEnd,
        Variable::OutOfBed,
        Variable::Midpoint,
        Variable::Sol,
        Variable::Waso,
        Variable::Tib,
        Variable::Tst,
        Variable::Se,
    ];

    /// Variables drawn from their own distribution. Everything else is derived.
    pub const SAMPLED: [Variable; 4] = [
        Variable::LightsOff,
        Variable::SleepEnd,
        Variable::Sol,
        Variable::Waso,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Variable::LightsOff => "Lights Off",
            Variable::SleepEnd => "Sleep End",
            Variable::OutOfBed => "Out of Bed",
            Variable::Midpoint => "Midpoint",
            Variable::Sol => "SOL",
            Variable::Waso => "WASO",
            Variable::Tib => "TIB",
            Variable::Tst => "TST",
            Variable::Se => "SE",
        }
    }

    pub fn unit(self) -> Unit {
        match self {
            Variable::LightsOff | Variable::SleepEnd | Variable::OutOfBed | Variable::Midpoint => {
                Unit::Clock
            }
            Variable::Sol | Variable::Waso | Variable::Tib | Variable::Tst => Unit::Minutes,
            Variable::Se => Unit::Percent,
        }
    }

    pub fn is_sampled(self) -> bool {
        Self::SAMPLED.contains(&self)
    }

    pub fn default_family(self) -> DistributionFamily {
        match self {
            Variable::Sol | Variable::Waso => DistributionFamily::Gamma,
            _ => DistributionFamily::Normal,
        }
    }

    /// Case-insensitive label lookup; `_` and runs of whitespace count as one space.
    pub fn from_label(raw: &str) -> Option<Self> {
        let key = raw
            .replace('_', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        let v = match key.as_str() {
            "lights off" | "light off" | "lightsoff" => Variable::LightsOff,
            "sleep end" | "final wake" => Variable::SleepEnd,
            "out of bed" => Variable::OutOfBed,
            "midpoint" | "sleep midpoint" => Variable::Midpoint,
            "sol" | "sleep onset latency" => Variable::Sol,
            "waso" | "wake after sleep onset" => Variable::Waso,
            "tib" | "time in bed" => Variable::Tib,
            "tst" | "total sleep time" => Variable::Tst,
            "se" | "sleep efficiency" => Variable::Se,
            _ => return None,
        };
        Some(v)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionFamily {
    Gamma,
    Normal,
}

impl DistributionFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            DistributionFamily::Gamma => "gamma",
            DistributionFamily::Normal => "normal",
        }
    }
}

impl FromStr for DistributionFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gamma" => Ok(DistributionFamily::Gamma),
            "normal" | "gaussian" => Ok(DistributionFamily::Normal),
            other => Err(format!("unknown distribution family '{other}'")),
        }
    }
}

/// Mean and spread in minutes (percent for SE). Clock means are night-axis minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VariableParams {
    pub mean: f64,
    pub std: f64,
    pub family: DistributionFamily,
}

impl VariableParams {
    pub fn new(mean: f64, std: f64, family: DistributionFamily) -> Self {
        Self { mean, std, family }
    }

    pub fn validate(&self, variable: &str) -> Result<()> {
        if !self.mean.is_finite() || !self.std.is_finite() {
            return Err(SynthError::invalid(variable, "mean and SD must be finite"));
        }
        if self.std < 0.0 {
            return Err(SynthError::invalid(
                variable,
                format!("SD must be >= 0, got {}", self.std),
            ));
        }
        if self.family == DistributionFamily::Gamma && self.mean <= 0.0 {
            return Err(SynthError::invalid(
                variable,
                format!("gamma mean must be > 0, got {}", self.mean),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawParameterRow {
    #[serde(rename = "Variable", alias = "variable")]
    variable: String,
    #[serde(rename = "Mean", alias = "mean")]
    mean: String,
    #[serde(rename = "SD", alias = "sd", alias = "Sd", alias = "std")]
    sd: String,
    #[serde(rename = "Family", alias = "family", default)]
    family: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupParameters {
    cohort: String,
    entries: BTreeMap<Variable, VariableParams>,
}

impl GroupParameters {
    pub fn load(path: &Path, cohort: &str) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, cohort)
    }

    /// Reads a `Variable,Mean,SD[,Family]` table. Clock means may be `HH:MM`;
    /// clock SDs are in hours.
    pub fn from_reader<R: Read>(reader: R, cohort: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut entries = BTreeMap::new();
        for row in rdr.deserialize::<RawParameterRow>() {
            let row = row?;
            let Some(variable) = Variable::from_label(&row.variable) else {
                debug!(cohort, label = %row.variable, "ignoring unknown parameter label");
                continue;
            };
            let params = convert_row(variable, &row)?;
            if entries.insert(variable, params).is_some() {
                return Err(SynthError::invalid(
                    variable.label(),
                    "duplicate entry in parameter source",
                ));
            }
        }

        Self::from_entries(cohort, entries)
    }

    pub fn from_entries(
        cohort: &str,
        entries: impl IntoIterator<Item = (Variable, VariableParams)>,
    ) -> Result<Self> {
        let entries: BTreeMap<_, _> = entries.into_iter().collect();

        for variable in Variable::SAMPLED {
            if !entries.contains_key(&variable) {
                return Err(SynthError::MissingParameter {
                    cohort: cohort.to_string(),
                    variable,
                });
            }
        }

        for (variable, params) in &entries {
            params.validate(variable.label())?;
            if !variable.is_sampled() {
                warn!(
                    cohort,
                    variable = variable.label(),
                    mean = params.mean,
                    "published statistics exist for a derived variable; the derived value is used"
                );
            }
        }

        Ok(Self {
            cohort: cohort.to_string(),
            entries,
        })
    }

    pub fn cohort(&self) -> &str {
        &self.cohort
    }

    pub fn get(&self, variable: Variable) -> Option<&VariableParams> {
        self.entries.get(&variable)
    }

    /// Lookup for a variable the store guarantees to hold.
    pub fn require(&self, variable: Variable) -> Result<&VariableParams> {
        self.entries
            .get(&variable)
            .ok_or_else(|| SynthError::MissingParameter {
                cohort: self.cohort.clone(),
                variable,
            })
    }

    /// Entries for derived variables that the generator will not sample.
    pub fn reference_only(&self) -> impl Iterator<Item = (Variable, &VariableParams)> {
        self.entries
            .iter()
            .filter(|(v, _)| !v.is_sampled())
            .map(|(v, p)| (*v, p))
    }

    /// Family used for the skewed duration variables, for output naming.
    pub fn duration_family(&self) -> DistributionFamily {
        self.get(Variable::Sol)
            .map(|p| p.family)
            .unwrap_or(DistributionFamily::Gamma)
    }
}

fn convert_row(variable: Variable, row: &RawParameterRow) -> Result<VariableParams> {
    let family = match row.family.as_deref().map(str::trim) {
        None | Some("") => variable.default_family(),
        Some(raw) => raw
            .parse::<DistributionFamily>()
            .map_err(|e| SynthError::invalid(variable.label(), e))?,
    };

    let sd = parse_number(variable, "SD", &row.sd)?;

    let (mean, std) = match variable.unit() {
        Unit::Clock => {
            let mean = match parse_clock(&row.mean) {
                Some(t) => t.to_night_minutes(),
                None => parse_number(variable, "Mean", &row.mean)?,
            };
            (mean, sd * 60.0)
        }
        Unit::Minutes | Unit::Percent => (parse_number(variable, "Mean", &row.mean)?, sd),
    };

    Ok(VariableParams::new(mean, std, family))
}

fn parse_number(variable: Variable, column: &str, raw: &str) -> Result<f64> {
    raw.trim().parse::<f64>().map_err(|_| {
        SynthError::invalid(
            variable.label(),
            format!("{column} '{raw}' is not a number"),
        )
    })
}
