//! Dependent sleep variables computed from one night's primary draws.
//!
//! All inputs and outputs are night-axis minutes (see [`crate::clock`]), so
//! the lights-off to out-of-bed interval is a plain subtraction even when it
//! spans midnight.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SynthError};

/// What to do with a row whose time in bed is not positive.
///
/// Independently of the policy, sleep end is capped at out of bed when SOL
/// alone exceeds time in bed, and a clamped row reports sleep end at lights off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    /// Clamp TIB, TST and SE to zero and flag the row.
    #[default]
    Clamp,
    /// Abort the cohort.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrimaryDraws {
    pub lights_off: f64,
    /// Final awakening, drawn from the published "Sleep End" statistics.
    pub final_wake: f64,
    pub sol: f64,
    pub waso: f64,
    pub out_of_bed_delay: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedValues {
    pub out_of_bed: f64,
    pub tib: f64,
    pub twt: f64,
    pub tst: f64,
    pub se: f64,
    pub sleep_end: f64,
    pub midpoint: f64,
    pub tib_clamped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DegenerateInterval {
    pub participant: u32,
    pub day: u32,
    pub raw_tib: f64,
}

/// Elapsed minutes from lights off to out of bed.
pub fn time_in_bed(lights_off: f64, out_of_bed: f64) -> f64 {
    out_of_bed - lights_off
}

/// Sleep efficiency in percent, clamped to `[0, 100]`. Zero for a
/// non-positive time in bed.
pub fn sleep_efficiency(tst: f64, tib: f64) -> f64 {
    if tib <= 0.0 || !tib.is_finite() {
        return 0.0;
    }
    (100.0 * tst / tib).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DerivationEngine {
    policy: DegeneratePolicy,
}

impl DerivationEngine {
    pub fn new(policy: DegeneratePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DegeneratePolicy {
        self.policy
    }

    /// Derives one row. Returns the clamping event alongside the values when
    /// the policy is [`DegeneratePolicy::Clamp`].
    pub fn derive(
        &self,
        participant: u32,
        day: u32,
        draws: &PrimaryDraws,
    ) -> Result<(DerivedValues, Option<DegenerateInterval>)> {
        let out_of_bed = draws.final_wake + draws.out_of_bed_delay;
        let raw_tib = time_in_bed(draws.lights_off, out_of_bed);
        let twt = draws.sol + draws.waso;

        let mut event = None;
        let tib = if raw_tib > 0.0 && raw_tib.is_finite() {
            raw_tib
        } else {
            match self.policy {
                DegeneratePolicy::Fail => {
                    return Err(SynthError::DegenerateInterval {
                        participant,
                        day,
                        tib_min: raw_tib,
                    });
                }
                DegeneratePolicy::Clamp => {
                    warn!(participant, day, tib_min = raw_tib, "non-positive time in bed clamped to zero");
                    event = Some(DegenerateInterval {
                        participant,
                        day,
                        raw_tib,
                    });
                    0.0
                }
            }
        };

        let tst = (tib - twt).max(0.0);
        let se = sleep_efficiency(tst, tib);
        // SOL longer than the whole stay in bed would put sleep end after
        // getting up; it is held at out of bed, never before lights off.
        let latest_end = out_of_bed.max(draws.lights_off);
        let sleep_end = (draws.lights_off + draws.sol + tst).min(latest_end);
        let midpoint = (draws.lights_off + sleep_end) / 2.0;

        Ok((
            DerivedValues {
                out_of_bed,
                tib,
                twt,
                tst,
                se,
                sleep_end,
                midpoint,
                tib_clamped: event.is_some(),
            },
            event,
        ))
    }
}
