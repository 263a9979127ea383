//! Synthetic sleep-diary generation from group-level summary statistics.
//!
//! Each cohort (for example control and insomnia) is described by published
//! means and standard deviations. Primary diary variables are drawn per
//! participant and day, dependent variables are derived with fixed clock
//! arithmetic, and the resulting table is written in numeric and `HH:MM`
//! form.

pub mod assemble;
pub mod augment;
pub mod clock;
pub mod config;
pub mod derive;
pub mod error;
pub mod output;
pub mod params;
pub mod run;
pub mod sampler;

pub use assemble::{
    generate, AssemblyOptions, CohortSummary, OutOfBedDelay, ParticipantDay, ParticipantId,
    TimeSeriesAssembler, TimeSeriesTable,
};
pub use clock::ClockTime;
pub use config::{CohortConfig, RunConfig};
pub use derive::{DegeneratePolicy, DerivationEngine, DerivedValues, PrimaryDraws};
pub use error::{Result, SynthError};
pub use output::{OutputFormatter, OUTPUT_SCHEMA_VERSION};
pub use params::{DistributionFamily, GroupParameters, Variable, VariableParams};
pub use sampler::{PreparedDistribution, VariableSampler};
