use crate::common::*;
use crate::traits::*;
use matrix_util::traits::MatOps;

/// sweeps before the SVD of the operator gives up
const SVD_MAX_ITER: usize = 10_000;

#[derive(Debug, Clone)]
pub struct LinearAwgnOptions {
    /// initial noise variance, shared by all columns. Default: 1.0
    pub wvar_init: f64,
    /// report the MAP cost instead of the MMSE cost. Default: false
    pub map_est: bool,
    /// take an EM step on the noise variance per call. Default: false
    pub tune_wvar: bool,
    /// floor of the noise variance after an EM update. Default: 1e-12
    pub wvar_min: f64,
}

impl Default for LinearAwgnOptions {
    fn default() -> Self {
        LinearAwgnOptions {
            wvar_init: 1.0,
            map_est: false,
            tune_wvar: false,
            wvar_min: 1e-12,
        }
    }
}

/// Likelihood of a linear measurement in white Gaussian noise
///
/// y[:,j] = A z[:,j] + w[:,j],  w[:,j] ~ N(0, wvar[j] I)
///
/// The operator is decomposed once, `A = U diag(s) V'` (thin SVD with
/// `p = min(m, n)` singular values), so that every estimate costs two
/// products with `V` instead of solving an `n x n` system.
pub struct LinearAwgn {
    a: Mat,
    y: Mat,
    wvar: DVec,
    svd_s: DVec,
    svd_v: Mat,
    /// U' y (p x ncol)
    uty: Mat,
    options: LinearAwgnOptions,
}

impl LinearAwgn {
    /// * `a` - linear operator (m x n)
    /// * `y` - observations (m x ncol)
    pub fn new(a: Mat, y: Mat, options: LinearAwgnOptions) -> anyhow::Result<Self> {
        if a.nrows() == 0 || a.ncols() == 0 {
            anyhow::bail!("empty operator {:?}", a.shape());
        }
        if y.nrows() != a.nrows() {
            anyhow::bail!(
                "observations have {} rows but the operator has {}",
                y.nrows(),
                a.nrows()
            );
        }
        if y.ncols() == 0 {
            anyhow::bail!("no observation columns");
        }
        if !(options.wvar_init.is_finite() && options.wvar_init > 0.0) {
            anyhow::bail!("noise variance must be positive, got {}", options.wvar_init);
        }
        if !(options.wvar_min.is_finite() && options.wvar_min > 0.0) {
            anyhow::bail!("wvar_min must be positive, got {}", options.wvar_min);
        }

        if let Some(k) = a.iter().position(|x| !x.is_finite()) {
            anyhow::bail!(
                "operator has a non-finite entry at ({}, {})",
                k % a.nrows(),
                k / a.nrows()
            );
        }
        if let Some(k) = y.iter().position(|x| !x.is_finite()) {
            anyhow::bail!(
                "observations have a non-finite entry at ({}, {})",
                k % y.nrows(),
                k / y.nrows()
            );
        }

        debug!("SVD on the operator [{} x {}]", a.nrows(), a.ncols());

        let svd = a
            .clone()
            .try_svd(true, true, f64::EPSILON, SVD_MAX_ITER)
            .ok_or(anyhow::anyhow!("SVD did not converge"))?;
        let svd_u = svd.u.ok_or(anyhow::anyhow!("SVD failed: no U"))?;
        let svd_vt = svd.v_t.ok_or(anyhow::anyhow!("SVD failed: no V'"))?;
        let svd_s = svd.singular_values;

        let uty = svd_u.tr_mul(&y);
        let wvar = DVec::from_element(y.ncols(), options.wvar_init);

        Ok(Self {
            a,
            y,
            wvar,
            svd_s,
            svd_v: svd_vt.transpose(),
            uty,
            options,
        })
    }

    pub fn wvar(&self) -> &DVec {
        &self.wvar
    }

    pub fn operator(&self) -> &Mat {
        &self.a
    }

    pub fn observations(&self) -> &Mat {
        &self.y
    }

    pub fn singular_values(&self) -> &DVec {
        &self.svd_s
    }

    pub fn options(&self) -> &LinearAwgnOptions {
        &self.options
    }

    /// per-column costs from the residual sums of squares
    fn costs(&self, res_sq: &[f64]) -> f64 {
        let mm = self.a.nrows() as f64;
        res_sq
            .iter()
            .zip(self.wvar.iter())
            .map(|(&rss, &w)| {
                let quad = rss / (2.0 * w);
                if self.options.map_est {
                    quad
                } else {
                    quad + 0.5 * mm * (LOG_2PI + w.ln())
                }
            })
            .sum()
    }
}

impl Estimator for LinearAwgn {
    fn shape(&self) -> (usize, usize) {
        (self.a.ncols(), self.y.ncols())
    }

    /// Minimum-norm least squares, `z = V diag(1/s) U' y`. The variance
    /// is the average diagonal of `wvar V diag(1/s^2) V'` over the `n`
    /// latent entries, `wvar Σ_i 1/s_i^2 / n`.
    fn est_init(&self) -> anyhow::Result<EstimOut> {
        let nn = self.a.ncols();
        let pp = self.svd_s.len();
        let tol = self.svd_s.max() * 1e-12 * (nn.max(self.a.nrows()) as f64);

        let inv_s = self
            .svd_s
            .map(|s| if s > tol { 1.0 / s } else { 0.0 });

        let mut coef = self.uty.clone();
        for i in 0..pp {
            coef.row_mut(i).scale_mut(inv_s[i]);
        }
        let zhat = &self.svd_v * coef;

        let sum_inv_sq: f64 = inv_s.iter().map(|x| x * x).sum();
        let zhatvar = self.wvar.map(|w| w * sum_inv_sq / nn as f64);

        let res_sq = (&self.y - &self.a * &zhat).column_sq_norms();
        let cost = self.costs(&res_sq);

        Ok(EstimOut {
            zhat,
            zhatvar,
            cost,
        })
    }

    fn est(&mut self, r: &Mat, rvar: &DVec) -> anyhow::Result<EstimOut> {
        check_message(self.shape(), r, rvar)?;

        let (nn, ncols) = self.shape();
        let mm = self.a.nrows();
        let pp = self.svd_s.len();

        // z = r + V (D (s ⊙ U'y / wvar + V'r / rvar) - V'r)
        // D = diag(1 / (s^2 / wvar + 1 / rvar))
        let vtr = self.svd_v.tr_mul(r);
        let mut coef = Mat::zeros(pp, ncols);
        let mut zhatvar = DVec::zeros(ncols);
        // Σ_i s_i^2 D_ii = tr(A Cov A')
        let mut trace_acov = vec![0.0; ncols];

        for j in 0..ncols {
            let w = self.wvar[j];
            let v = rvar[j];
            let mut sum_d = 0.0;
            for i in 0..pp {
                let s = self.svd_s[i];
                let d = 1.0 / (s * s / w + 1.0 / v);
                coef[(i, j)] = d * (s * self.uty[(i, j)] / w + vtr[(i, j)] / v) - vtr[(i, j)];
                sum_d += d;
                trace_acov[j] += s * s * d;
            }
            zhatvar[j] = (sum_d + (nn - pp) as f64 * v) / nn as f64;
        }

        let zhat = r + &self.svd_v * coef;

        let res_sq = (&self.y - &self.a * &zhat).column_sq_norms();
        let cost = self.costs(&res_sq);

        if self.options.tune_wvar {
            for j in 0..ncols {
                let wnew = (res_sq[j] + trace_acov[j]) / mm as f64;
                self.wvar[j] = wnew.max(self.options.wvar_min);
            }
            debug!("noise variance update: {:?}", self.wvar.as_slice());
        }

        Ok(EstimOut {
            zhat,
            zhatvar,
            cost,
        })
    }

    fn tuned_params(&self) -> Vec<NamedParam> {
        vec![NamedParam::new("wvar", self.wvar.as_slice())]
    }
}
