use crate::common::*;
use crate::gmm::GmmParams;
use matrix_util::traits::{MatOps, SampleOps};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// seed offsets so that the three random streams never share a generator
const SEED_OPERATOR: u64 = 1 << 32;
const SEED_NOISE: u64 = 2 << 32;

/// A sparse linear inverse problem `y = A x0 + w`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseLinearSim {
    /// latent dimension n
    pub nz0: usize,
    /// number of measurements m
    pub nz1: usize,
    /// number of independent columns
    pub ncol: usize,
    /// fraction of non-zero entries in x0
    pub sparse_rat: f64,
    /// mean of the non-zero entries
    pub xmean: f64,
    /// variance of the non-zero entries
    pub xvar: f64,
    /// signal-to-noise ratio in dB, `|A x0|^2 / |w|^2`
    pub snr_db: f64,
    /// condition number of A; i.i.d. Gaussian if `None`
    pub cond_num: Option<f64>,
    pub seed: u64,
}

impl Default for SparseLinearSim {
    fn default() -> Self {
        SparseLinearSim {
            nz0: 1000,
            nz1: 500,
            ncol: 1,
            sparse_rat: 0.1,
            xmean: 0.0,
            xvar: 1.0,
            snr_db: 30.0,
            cond_num: None,
            seed: 42,
        }
    }
}

/// Simulated problem
#[derive(Debug, Clone)]
pub struct SimData {
    /// ground truth (n x ncol)
    pub x0: Mat,
    /// operator (m x n)
    pub a: Mat,
    /// observations (m x ncol)
    pub y: Mat,
    /// noise variance used to corrupt `A x0`
    pub wvar: f64,
}

impl SparseLinearSim {
    fn validate(&self) -> anyhow::Result<()> {
        if self.nz0 == 0 || self.nz1 == 0 || self.ncol == 0 {
            anyhow::bail!(
                "dimensions must be positive: n={}, m={}, ncol={}",
                self.nz0,
                self.nz1,
                self.ncol
            );
        }
        if !(0.0..=1.0).contains(&self.sparse_rat) {
            anyhow::bail!("sparsity ratio must be in [0, 1], got {}", self.sparse_rat);
        }
        if !(self.xvar.is_finite() && self.xvar > 0.0) {
            anyhow::bail!("xvar must be positive, got {}", self.xvar);
        }
        if self.snr_db.is_nan() {
            anyhow::bail!("snr is not a number");
        }
        if let Some(cond) = self.cond_num {
            if !(cond.is_finite() && cond >= 1.0) {
                anyhow::bail!("condition number must be >= 1, got {}", cond);
            }
        }
        Ok(())
    }

    /// The mixture that generated `x0`, with a narrow zero component
    pub fn true_prior(&self, zero_var: f64) -> anyhow::Result<GmmParams> {
        GmmParams::bernoulli_gauss(self.sparse_rat, self.xmean, self.xvar, zero_var)
    }

    /// Bernoulli-Gaussian ground truth
    fn sample_x0(&self) -> Mat {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let sd = self.xvar.sqrt();
        // from_fn visits entries column by column
        Mat::from_fn(self.nz0, self.ncol, |_, _| {
            let active = rng.random::<f64>() < self.sparse_rat;
            let x: f64 = rng.sample(StandardNormal);
            if active {
                self.xmean + sd * x
            } else {
                0.0
            }
        })
    }

    /// i.i.d. N(0, 1/n) or `U diag(s) V'` with geometric singular values
    fn sample_operator(&self) -> anyhow::Result<Mat> {
        let (mm, nn) = (self.nz1, self.nz0);
        let seed = self.seed.wrapping_add(SEED_OPERATOR);

        let cond = match self.cond_num {
            None => {
                return Ok(Mat::rnorm_seeded(mm, nn, seed) / (nn as f64).sqrt());
            }
            Some(cond) => cond,
        };

        let pp = mm.min(nn);
        let uu = Mat::rnorm_seeded(mm, pp, seed).qr().q();
        let vv = Mat::rnorm_seeded(nn, pp, seed.wrapping_add(pp as u64)).qr().q();

        let mut ss = DVec::from_fn(pp, |i, _| {
            if pp > 1 {
                cond.powf(-(i as f64) / (pp - 1) as f64)
            } else {
                1.0
            }
        });

        // same Frobenius norm as the i.i.d. case, E|A|^2 = m
        let scale = (mm as f64 / ss.norm_squared()).sqrt();
        ss *= scale;

        if uu.ncols() != pp || vv.ncols() != pp {
            anyhow::bail!("QR returned unexpected factor shapes");
        }

        let mut us = uu;
        for (i, mut u_i) in us.column_iter_mut().enumerate() {
            u_i *= ss[i];
        }
        Ok(us * vv.transpose())
    }

    /// Generate `x0`, `A`, `y` and the noise variance
    pub fn generate(&self) -> anyhow::Result<SimData> {
        self.validate()?;

        info!(
            "simulating n={}, m={}, ncol={}, ρ={}, snr={} dB",
            self.nz0, self.nz1, self.ncol, self.sparse_rat, self.snr_db
        );

        let x0 = self.sample_x0();
        let a = self.sample_operator()?;
        let z = &a * &x0;

        let wvar = z.mean_square() * 10f64.powf(-self.snr_db / 10.0);
        let noise = Mat::rnorm_seeded(self.nz1, self.ncol, self.seed.wrapping_add(SEED_NOISE));
        let y = z + noise * wvar.sqrt();

        debug!("noise variance {:.4e}", wvar);

        Ok(SimData { x0, a, y, wvar })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn same_seed_same_data() -> anyhow::Result<()> {
        let sim = SparseLinearSim {
            nz0: 50,
            nz1: 30,
            ncol: 2,
            ..Default::default()
        };
        let d1 = sim.generate()?;
        let d2 = sim.generate()?;
        assert_eq!(d1.x0, d2.x0);
        assert_eq!(d1.a, d2.a);
        assert_eq!(d1.y, d2.y);

        let d3 = SparseLinearSim { seed: 7, ..sim }.generate()?;
        assert_ne!(d1.y, d3.y);
        Ok(())
    }

    #[test]
    fn condition_number_is_respected() -> anyhow::Result<()> {
        let sim = SparseLinearSim {
            nz0: 40,
            nz1: 20,
            cond_num: Some(100.0),
            ..Default::default()
        };
        let data = sim.generate()?;
        let s = data.a.clone().singular_values();
        assert_relative_eq!(s.max() / s.min(), 100.0, max_relative = 1e-6);
        assert_relative_eq!(data.a.norm_squared(), 20.0, max_relative = 1e-6);
        Ok(())
    }

    #[test]
    fn infinite_snr_is_noiseless() -> anyhow::Result<()> {
        let sim = SparseLinearSim {
            nz0: 30,
            nz1: 20,
            snr_db: f64::INFINITY,
            ..Default::default()
        };
        let data = sim.generate()?;
        assert_eq!(data.wvar, 0.0);
        assert_eq!(data.y, &data.a * &data.x0);
        Ok(())
    }

    #[test]
    fn invalid_settings() {
        let bad = SparseLinearSim {
            sparse_rat: 1.5,
            ..Default::default()
        };
        assert!(bad.generate().is_err());
        let bad = SparseLinearSim {
            cond_num: Some(0.5),
            ..Default::default()
        };
        assert!(bad.generate().is_err());
    }
}
