use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Gamma, Normal};

use crate::error::{Result, SynthError};
use crate::params::{DistributionFamily, VariableParams};

/// A validated distribution ready to draw from.
#[derive(Debug, Clone, Copy)]
pub enum PreparedDistribution {
    Constant(f64),
    Gamma(Gamma<f64>),
    Normal(Normal<f64>),
}

impl PreparedDistribution {
    /// Gamma uses shape `(mean/std)^2` and scale `std^2/mean`. A zero SD
    /// collapses either family onto its mean. Errors name `label`.
    pub fn prepare(label: &str, family: DistributionFamily, mean: f64, std: f64) -> Result<Self> {
        VariableParams::new(mean, std, family).validate(label)?;

        if std == 0.0 {
            return Ok(Self::Constant(mean));
        }

        match family {
            DistributionFamily::Gamma => {
                let shape = (mean / std).powi(2);
                let scale = std * std / mean;
                if !shape.is_finite() || !scale.is_finite() || scale <= 0.0 {
                    return Err(SynthError::invalid(
                        label,
                        format!("mean {mean} and SD {std} give an unusable gamma shape/scale"),
                    ));
                }
                Gamma::new(shape, scale)
                    .map(Self::Gamma)
                    .map_err(|e| SynthError::invalid(label, e.to_string()))
            }
            DistributionFamily::Normal => Normal::new(mean, std)
                .map(Self::Normal)
                .map_err(|e| SynthError::invalid(label, e.to_string())),
        }
    }

    pub fn from_params(label: &str, params: &VariableParams) -> Result<Self> {
        Self::prepare(label, params.family, params.mean, params.std)
    }
}

/// Owns the cohort's random stream.
#[derive(Debug, Clone)]
pub struct VariableSampler {
    rng: ChaCha8Rng,
}

impl VariableSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_rng(rng: ChaCha8Rng) -> Self {
        Self { rng }
    }

    pub fn draw(&mut self, dist: &PreparedDistribution) -> f64 {
        match dist {
            PreparedDistribution::Constant(v) => *v,
            PreparedDistribution::Gamma(g) => g.sample(&mut self.rng),
            PreparedDistribution::Normal(n) => n.sample(&mut self.rng),
        }
    }

    pub fn sample(
        &mut self,
        family: DistributionFamily,
        mean: f64,
        std: f64,
        count: usize,
    ) -> Result<Vec<f64>> {
        let dist = PreparedDistribution::prepare(family.as_str(), family, mean, std)?;
        Ok((0..count).map(|_| self.draw(&dist)).collect())
    }

    /// Normal draw clamped into `[lo, hi]`.
    pub fn draw_clipped(&mut self, dist: &PreparedDistribution, lo: f64, hi: f64) -> f64 {
        self.draw(dist).clamp(lo, hi)
    }
}
