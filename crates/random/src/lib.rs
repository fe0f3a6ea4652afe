//! Random sources for element hooks.
//!
//! [`RandomSource`] has one method per distribution family, so a run can
//! swap the underlying engine behind a `Box<dyn RandomSource>` without
//! touching call sites. [`VpRng`] is the default engine: ChaCha8, one
//! independent stream per virtual process, derived from a single run seed
//! by [`RngFactory`].

use gridkernel_types::VpIndex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Binomial, Distribution, Exp, Gamma, LogNormal, Normal, Poisson};
use thiserror::Error;

/// Errors from sampling with invalid parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RandomError {
    #[error("invalid {distribution} parameters: {reason}")]
    InvalidParameter {
        distribution: &'static str,
        reason: String,
    },
}

fn invalid(distribution: &'static str, reason: impl ToString) -> RandomError {
    RandomError::InvalidParameter {
        distribution,
        reason: reason.to_string(),
    }
}

/// A random engine exposing a fixed set of distribution families.
pub trait RandomSource: Send {
    /// Integer uniformly drawn from `low..=high`.
    fn uniform_int(&mut self, low: u64, high: u64) -> Result<u64, RandomError>;

    /// Real uniformly drawn from `[low, high)`.
    fn uniform_real(&mut self, low: f64, high: f64) -> Result<f64, RandomError>;

    fn normal(&mut self, mean: f64, std_dev: f64) -> Result<f64, RandomError>;

    fn lognormal(&mut self, mu: f64, sigma: f64) -> Result<f64, RandomError>;

    fn exponential(&mut self, lambda: f64) -> Result<f64, RandomError>;

    fn poisson(&mut self, mean: f64) -> Result<u64, RandomError>;

    fn binomial(&mut self, trials: u64, p: f64) -> Result<u64, RandomError>;

    fn gamma(&mut self, shape: f64, scale: f64) -> Result<f64, RandomError>;

    /// Real uniformly drawn from `[0, 1)`.
    fn drand(&mut self) -> f64;

    /// Integer uniformly drawn from `0..n`.
    fn ulrand(&mut self, n: u64) -> Result<u64, RandomError>;
}

/// ChaCha8 stream bound to one virtual process.
#[derive(Debug, Clone)]
pub struct VpRng {
    vp: VpIndex,
    rng: ChaCha8Rng,
}

impl VpRng {
    pub fn vp(&self) -> VpIndex {
        self.vp
    }
}

impl RandomSource for VpRng {
    fn uniform_int(&mut self, low: u64, high: u64) -> Result<u64, RandomError> {
        if low > high {
            return Err(invalid("uniform_int", format!("low {low} exceeds high {high}")));
        }
        Ok(self.rng.gen_range(low..=high))
    }

    fn uniform_real(&mut self, low: f64, high: f64) -> Result<f64, RandomError> {
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(invalid(
                "uniform_real",
                format!("need finite low < high, got [{low}, {high})"),
            ));
        }
        Ok(self.rng.gen_range(low..high))
    }

    fn normal(&mut self, mean: f64, std_dev: f64) -> Result<f64, RandomError> {
        if !(std_dev.is_finite() && std_dev >= 0.0) {
            return Err(invalid(
                "normal",
                format!("std_dev must be finite and non-negative, got {std_dev}"),
            ));
        }
        let dist = Normal::new(mean, std_dev).map_err(|e| invalid("normal", e))?;
        Ok(dist.sample(&mut self.rng))
    }

    fn lognormal(&mut self, mu: f64, sigma: f64) -> Result<f64, RandomError> {
        if !(sigma.is_finite() && sigma >= 0.0) {
            return Err(invalid(
                "lognormal",
                format!("sigma must be finite and non-negative, got {sigma}"),
            ));
        }
        let dist = LogNormal::new(mu, sigma).map_err(|e| invalid("lognormal", e))?;
        Ok(dist.sample(&mut self.rng))
    }

    fn exponential(&mut self, lambda: f64) -> Result<f64, RandomError> {
        let dist = Exp::new(lambda).map_err(|e| invalid("exponential", e))?;
        Ok(dist.sample(&mut self.rng))
    }

    fn poisson(&mut self, mean: f64) -> Result<u64, RandomError> {
        let dist = Poisson::new(mean).map_err(|e| invalid("poisson", e))?;
        let draw: f64 = dist.sample(&mut self.rng);
        Ok(draw as u64)
    }

    fn binomial(&mut self, trials: u64, p: f64) -> Result<u64, RandomError> {
        let dist = Binomial::new(trials, p).map_err(|e| invalid("binomial", e))?;
        Ok(dist.sample(&mut self.rng))
    }

    fn gamma(&mut self, shape: f64, scale: f64) -> Result<f64, RandomError> {
        let dist = Gamma::new(shape, scale).map_err(|e| invalid("gamma", e))?;
        Ok(dist.sample(&mut self.rng))
    }

    fn drand(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn ulrand(&mut self, n: u64) -> Result<u64, RandomError> {
        if n == 0 {
            return Err(invalid("ulrand", "n must be positive"));
        }
        Ok(self.rng.gen_range(0..n))
    }
}

/// Derives one independent stream per virtual process from a run seed.
#[derive(Debug, Clone, Copy)]
pub struct RngFactory {
    seed: u64,
}

impl RngFactory {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The stream of `vp`. Identical on every call with the same seed.
    pub fn for_vp(&self, vp: VpIndex) -> VpRng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(vp.0 as u64);
        VpRng { vp, rng }
    }

    /// The stream of `vp` behind the engine-agnostic interface.
    pub fn boxed(&self, vp: VpIndex) -> Box<dyn RandomSource> {
        Box::new(self.for_vp(vp))
    }
}
