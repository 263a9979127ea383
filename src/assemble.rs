//! Per-cohort generation of the participant-day table.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::derive::{
    DegenerateInterval, DegeneratePolicy, DerivationEngine, DerivedValues, PrimaryDraws,
};
use crate::error::{Result, SynthError};
use crate::params::{DistributionFamily, GroupParameters, Variable};
use crate::sampler::{PreparedDistribution, VariableSampler};

pub const DEFAULT_PARTICIPANTS: u32 = 100;
pub const DEFAULT_DAYS: u32 = 21;
pub const DEFAULT_SEED: u64 = 42;

/// 1-based participant number, rendered as `Mock_001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ParticipantId(pub u32);

impl ParticipantId {
    pub fn code(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mock_{:03}", self.0)
    }
}

/// Minutes between final awakening and getting out of bed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutOfBedDelay {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for OutOfBedDelay {
    fn default() -> Self {
        Self {
            mean: 15.0,
            std: 10.0,
            min: 5.0,
            max: 30.0,
        }
    }
}

impl OutOfBedDelay {
    pub fn validate(&self) -> Result<()> {
        let values = [self.mean, self.std, self.min, self.max];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SynthError::InvalidConfig(
                "out_of_bed_delay values must be finite".to_string(),
            ));
        }
        if self.std < 0.0 {
            return Err(SynthError::InvalidConfig(
                "out_of_bed_delay.std must be >= 0".to_string(),
            ));
        }
        if self.min < 0.0 || self.max < self.min {
            return Err(SynthError::InvalidConfig(
                "out_of_bed_delay bounds must satisfy 0 <= min <= max".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblyOptions {
    pub seed: u64,
    pub policy: DegeneratePolicy,
    pub out_of_bed_delay: OutOfBedDelay,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            policy: DegeneratePolicy::Clamp,
            out_of_bed_delay: OutOfBedDelay::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParticipantDay {
    pub participant: ParticipantId,
    pub day: u32,
    pub primary: PrimaryDraws,
    pub derived: DerivedValues,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortSummary {
    pub cohort: String,
    pub rows: usize,
    pub participants: u32,
    pub days: u32,
    pub clamped_rows: usize,
    pub mean_tst_min: f64,
    pub mean_se_pct: f64,
    pub mean_sol_min: f64,
    pub mean_waso_min: f64,
}

/// Rows for one cohort, ordered by `(participant, day)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesTable {
    cohort: String,
    participants: u32,
    days: u32,
    rows: Vec<ParticipantDay>,
    degenerate: Vec<DegenerateInterval>,
}

impl TimeSeriesTable {
    pub fn cohort(&self) -> &str {
        &self.cohort
    }

    pub fn participant_count(&self) -> u32 {
        self.participants
    }

    pub fn day_count(&self) -> u32 {
        self.days
    }

    pub fn rows(&self) -> &[ParticipantDay] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn degenerate_events(&self) -> &[DegenerateInterval] {
        &self.degenerate
    }

    /// Row for a 1-based participant and day.
    pub fn row(&self, participant: u32, day: u32) -> Option<&ParticipantDay> {
        if participant == 0 || day == 0 || participant > self.participants || day > self.days {
            return None;
        }
        let idx = (participant as usize - 1) * self.days as usize + (day as usize - 1);
        self.rows.get(idx)
    }

    pub fn summary(&self) -> CohortSummary {
        let n = self.rows.len();
        let mean = |f: fn(&ParticipantDay) -> f64| {
            if n == 0 {
                0.0
            } else {
                self.rows.iter().map(f).sum::<f64>() / n as f64
            }
        };

        CohortSummary {
            cohort: self.cohort.clone(),
            rows: n,
            participants: self.participants,
            days: self.days,
            clamped_rows: self.degenerate.len(),
            mean_tst_min: mean(|r| r.derived.tst),
            mean_se_pct: mean(|r| r.derived.se),
            mean_sol_min: mean(|r| r.primary.sol),
            mean_waso_min: mean(|r| r.primary.waso),
        }
    }
}

#[derive(Debug, Clone)]
struct PreparedPrimaries {
    lights_off: PreparedDistribution,
    final_wake: PreparedDistribution,
    sol: PreparedDistribution,
    waso: PreparedDistribution,
    delay: PreparedDistribution,
}

pub struct TimeSeriesAssembler {
    cohort: String,
    primaries: PreparedPrimaries,
    delay_bounds: (f64, f64),
    engine: DerivationEngine,
    sampler: VariableSampler,
}

impl TimeSeriesAssembler {
    /// Validates and prepares every distribution before any row is drawn.
    pub fn new(group: &GroupParameters, options: AssemblyOptions) -> Result<Self> {
        options.out_of_bed_delay.validate()?;

        let prepare = |v: Variable| -> Result<PreparedDistribution> {
            PreparedDistribution::from_params(v.label(), group.require(v)?)
        };

        let delay = options.out_of_bed_delay;
        let primaries = PreparedPrimaries {
            lights_off: prepare(Variable::LightsOff)?,
            final_wake: prepare(Variable::SleepEnd)?,
            sol: prepare(Variable::Sol)?,
            waso: prepare(Variable::Waso)?,
            delay: PreparedDistribution::prepare(
                "out_of_bed_delay",
                DistributionFamily::Normal,
                delay.mean,
                delay.std,
            )?,
        };

        Ok(Self {
            cohort: group.cohort().to_string(),
            primaries,
            delay_bounds: (delay.min, delay.max),
            engine: DerivationEngine::new(options.policy),
            sampler: VariableSampler::new(options.seed),
        })
    }

    fn draw_primaries(&mut self) -> PrimaryDraws {
        let p = &self.primaries;
        let lights_off = self.sampler.draw(&p.lights_off);
        let final_wake = self.sampler.draw(&p.final_wake);
        let sol = self.sampler.draw(&p.sol);
        let waso = self.sampler.draw(&p.waso);
        let (lo, hi) = self.delay_bounds;
        let out_of_bed_delay = self.sampler.draw_clipped(&p.delay, lo, hi);

        PrimaryDraws {
            lights_off,
            final_wake,
            sol,
            waso,
            out_of_bed_delay,
        }
    }

    pub fn generate(&mut self, participant_count: u32, day_count: u32) -> Result<TimeSeriesTable> {
        if participant_count == 0 || day_count == 0 {
            return Err(SynthError::InvalidConfig(
                "participant and day counts must be > 0".to_string(),
            ));
        }

        info!(
            cohort = %self.cohort,
            participants = participant_count,
            days = day_count,
            "generating cohort"
        );

        let capacity = participant_count as usize * day_count as usize;
        let mut rows = Vec::with_capacity(capacity);
        let mut degenerate = Vec::new();

        for pid in 1..=participant_count {
            for day in 1..=day_count {
                let primary = self.draw_primaries();
                let (derived, event) = self.engine.derive(pid, day, &primary)?;
                degenerate.extend(event);
                rows.push(ParticipantDay {
                    participant: ParticipantId(pid),
                    day,
                    primary,
                    derived,
                });
            }
        }

        info!(
            cohort = %self.cohort,
            rows = rows.len(),
            clamped = degenerate.len(),
            "cohort generated"
        );

        Ok(TimeSeriesTable {
            cohort: self.cohort.clone(),
            participants: participant_count,
            days: day_count,
            rows,
            degenerate,
        })
    }
}

/// One-shot generation with the default delay and clamping policy.
pub fn generate(
    group: &GroupParameters,
    participant_count: u32,
    day_count: u32,
    seed: u64,
) -> Result<TimeSeriesTable> {
    let options = AssemblyOptions {
        seed,
        ..AssemblyOptions::default()
    };
    TimeSeriesAssembler::new(group, options)?.generate(participant_count, day_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::VariableParams;
    use approx::assert_relative_eq;

    fn params(cohort: &str, sol: (f64, f64), lights_off: (f64, f64)) -> GroupParameters {
        GroupParameters::from_entries(
            cohort,
            [
                (
                    Variable::LightsOff,
                    VariableParams::new(lights_off.0, lights_off.1, DistributionFamily::Normal),
                ),
                (
                    Variable::SleepEnd,
                    VariableParams::new(435.0, 45.0, DistributionFamily::Normal),
                ),
                (
                    Variable::Sol,
                    VariableParams::new(sol.0, sol.1, DistributionFamily::Gamma),
                ),
                (
                    Variable::Waso,
                    VariableParams::new(15.0, 12.0, DistributionFamily::Gamma),
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn two_participants_one_day() {
        let group = params("control", (20.0, 10.0), (-60.0, 30.0));
        let table = generate(&group, 2, 1, DEFAULT_SEED).unwrap();
        assert_eq!(table.len(), 2);
        for row in table.rows() {
            assert_eq!(row.day, 1);
            assert!(row.primary.sol > 0.0);
            let clock = crate::clock::ClockTime::from_night_minutes(row.primary.lights_off);
            assert!(clock.minute_of_day() < 1440);
            assert_relative_eq!(
                row.derived.sleep_end,
                row.primary.lights_off + row.primary.sol + row.derived.tst
            );
        }
        assert_eq!(table.rows()[0].participant, ParticipantId(1));
        assert_eq!(table.rows()[1].participant, ParticipantId(2));
    }

    #[test]
    fn rows_are_exhaustive_and_ordered() {
        let group = params("control", (20.0, 10.0), (-30.0, 40.0));
        let table = generate(&group, 4, 6, 3).unwrap();
        assert_eq!(table.len(), 24);
        let keys: Vec<(u32, u32)> = table.rows().iter().map(|r| (r.participant.0, r.day)).collect();
        let expected: Vec<(u32, u32)> = (1..=4).flat_map(|p| (1..=6).map(move |d| (p, d))).collect();
        assert_eq!(keys, expected);
        assert_eq!(table.row(3, 5).unwrap().participant.0, 3);
        assert_eq!(table.row(3, 5).unwrap().day, 5);
        assert!(table.row(5, 1).is_none());
        assert!(table.row(1, 0).is_none());
    }

    #[test]
    fn same_seed_same_table() {
        let group = params("insomnia", (40.0, 30.0), (-20.0, 60.0));
        let a = generate(&group, 5, 7, 11).unwrap();
        let b = generate(&group, 5, 7, 11).unwrap();
        assert_eq!(a, b);
        let c = generate(&group, 5, 7, 12).unwrap();
        assert_ne!(a.rows()[0].primary, c.rows()[0].primary);
    }

    #[test]
    fn pathological_parameters_clamp_instead_of_failing() {
        let mut entries = vec![
            (
                Variable::LightsOff,
                VariableParams::new(600.0, 0.0, DistributionFamily::Normal),
            ),
            (
                Variable::SleepEnd,
                VariableParams::new(300.0, 0.0, DistributionFamily::Normal),
            ),
        ];
        entries.push((Variable::Sol, VariableParams::new(20.0, 10.0, DistributionFamily::Gamma)));
        entries.push((Variable::Waso, VariableParams::new(10.0, 5.0, DistributionFamily::Gamma)));
        let group = GroupParameters::from_entries("odd", entries).unwrap();

        let table = generate(&group, 3, 2, 1).unwrap();
        assert_eq!(table.degenerate_events().len(), 6);
        assert_eq!(table.summary().clamped_rows, 6);
        for row in table.rows() {
            assert!(row.derived.tib_clamped);
            assert_eq!(row.derived.se, 0.0);
            assert_eq!(row.derived.tst, 0.0);
        }

        let strict = AssemblyOptions {
            seed: 1,
            policy: DegeneratePolicy::Fail,
            ..AssemblyOptions::default()
        };
        let err = TimeSeriesAssembler::new(&group, strict).unwrap().generate(3, 2).unwrap_err();
        assert!(matches!(err, SynthError::DegenerateInterval { participant: 1, day: 1, .. }));
    }

    #[test]
    fn zero_counts_are_rejected() {
        let group = params("control", (20.0, 10.0), (-30.0, 30.0));
        assert!(matches!(generate(&group, 0, 21, 1), Err(SynthError::InvalidConfig(_))));
        assert!(matches!(generate(&group, 10, 0, 1), Err(SynthError::InvalidConfig(_))));
    }

    #[test]
    fn invalid_delay_is_rejected_up_front() {
        let group = params("control", (20.0, 10.0), (-30.0, 30.0));
        let options = AssemblyOptions {
            out_of_bed_delay: OutOfBedDelay {
                min: 30.0,
                max: 5.0,
                ..OutOfBedDelay::default()
            },
            ..AssemblyOptions::default()
        };
        let err = TimeSeriesAssembler::new(&group, options).err().unwrap();
        assert!(err.to_string().contains("out_of_bed_delay"), "{err}");
    }

    #[test]
    fn summary_means() {
        let group = params("control", (20.0, 0.0), (-30.0, 0.0));
        let table = generate(&group, 2, 3, 5).unwrap();
        let s = table.summary();
        assert_eq!(s.rows, 6);
        assert_relative_eq!(s.mean_sol_min, 20.0);
        assert!(s.mean_se_pct > 0.0 && s.mean_se_pct <= 100.0);
    }
}
