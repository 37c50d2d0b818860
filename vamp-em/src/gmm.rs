use crate::common::*;
use crate::traits::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Mixture parameters: weights, means and variances of `K` components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmmParams {
    pub probc: Vec<f64>,
    pub meanc: Vec<f64>,
    pub varc: Vec<f64>,
}

impl GmmParams {
    /// Validate and normalize the mixture weights
    ///
    /// * `probc` - non-negative component weights (normalized here)
    /// * `meanc` - component means
    /// * `varc` - positive component variances
    pub fn new(probc: Vec<f64>, meanc: Vec<f64>, varc: Vec<f64>) -> anyhow::Result<Self> {
        let kk = probc.len();
        if kk == 0 {
            anyhow::bail!("need at least one mixture component");
        }
        if meanc.len() != kk || varc.len() != kk {
            anyhow::bail!(
                "probc, meanc, varc lengths differ: {}, {}, {}",
                kk,
                meanc.len(),
                varc.len()
            );
        }
        if probc.iter().any(|p| !(p.is_finite() && *p >= 0.0)) {
            anyhow::bail!("component probabilities must be non-negative: {:?}", probc);
        }
        if meanc.iter().any(|m| !m.is_finite()) {
            anyhow::bail!("component means must be finite: {:?}", meanc);
        }
        if varc.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            anyhow::bail!("component variances must be positive: {:?}", varc);
        }
        let denom: f64 = probc.iter().sum();
        if denom <= 0.0 {
            anyhow::bail!("component probabilities sum to zero");
        }
        let probc = probc.into_iter().map(|p| p / denom).collect();
        Ok(Self {
            probc,
            meanc,
            varc,
        })
    }

    /// Two-component sparse prior
    ///
    /// x = 0 w.p. 1 - ρ (a narrow component with variance `zero_var`)
    /// x ~ N(xmean, xvar) w.p. ρ
    pub fn bernoulli_gauss(
        sparse_rat: f64,
        xmean: f64,
        xvar: f64,
        zero_var: f64,
    ) -> anyhow::Result<Self> {
        if !(0.0..=1.0).contains(&sparse_rat) {
            anyhow::bail!("sparsity ratio must be in [0, 1], got {}", sparse_rat);
        }
        Self::new(
            vec![1.0 - sparse_rat, sparse_rat],
            vec![0.0, xmean],
            vec![zero_var, xvar],
        )
    }

    pub fn num_components(&self) -> usize {
        self.probc.len()
    }

    /// E[x] under the mixture
    pub fn mean(&self) -> f64 {
        self.probc
            .iter()
            .zip(self.meanc.iter())
            .map(|(p, m)| p * m)
            .sum()
    }

    /// Var[x] under the mixture
    pub fn variance(&self) -> f64 {
        let mu = self.mean();
        let second: f64 = (0..self.num_components())
            .map(|k| self.probc[k] * (self.varc[k] + self.meanc[k] * self.meanc[k]))
            .sum();
        (second - mu * mu).max(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct GmmOptions {
    /// floor of each component variance after an EM update. Default: 1e-8
    pub zvarmin: f64,
    /// take an EM step on the mixture parameters per call. Default: false
    pub tune_gmm: bool,
    /// keep the component means at their initial values. Default: false
    pub fix_means: bool,
}

impl Default for GmmOptions {
    fn default() -> Self {
        GmmOptions {
            zvarmin: 1e-8,
            tune_gmm: false,
            fix_means: false,
        }
    }
}

/// Separable Gaussian-mixture prior on every entry of an `n x ncol` array
///
/// z[i,j] ~ Σ_k p_k N(μ_k, v_k)
///
pub struct GmmPrior {
    shape: (usize, usize),
    params: GmmParams,
    options: GmmOptions,
}

/// EM sufficient statistics per component
#[derive(Debug, Clone)]
struct GmmStat {
    /// Σ_i p(k|r_i)
    nk: Vec<f64>,
    /// Σ_i p(k|r_i) E[z_i|k]
    s1: Vec<f64>,
    /// Σ_i p(k|r_i) E[z_i^2|k]
    s2: Vec<f64>,
}

impl GmmStat {
    fn zeros(kk: usize) -> Self {
        Self {
            nk: vec![0.0; kk],
            s1: vec![0.0; kk],
            s2: vec![0.0; kk],
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for k in 0..self.nk.len() {
            self.nk[k] += other.nk[k];
            self.s1[k] += other.s1[k];
            self.s2[k] += other.s2[k];
        }
        self
    }
}

struct ColumnOut {
    zhat: Vec<f64>,
    zvar: f64,
    cost: f64,
    stat: GmmStat,
}

impl GmmPrior {
    pub fn new(
        shape: (usize, usize),
        params: GmmParams,
        options: GmmOptions,
    ) -> anyhow::Result<Self> {
        if shape.0 == 0 || shape.1 == 0 {
            anyhow::bail!("empty latent shape {:?}", shape);
        }
        if !(options.zvarmin.is_finite() && options.zvarmin > 0.0) {
            anyhow::bail!("zvarmin must be positive, got {}", options.zvarmin);
        }
        Ok(Self {
            shape,
            params,
            options,
        })
    }

    pub fn params(&self) -> &GmmParams {
        &self.params
    }

    pub fn options(&self) -> &GmmOptions {
        &self.options
    }

    /// Posterior of one column given `r[:,j]` with noise variance `rvar_j`
    fn est_column(&self, r_j: &[f64], rvar_j: f64) -> ColumnOut {
        let kk = self.params.num_components();
        let meanc = &self.params.meanc;
        let varc = &self.params.varc;
        let log_prob: Vec<f64> = self
            .params
            .probc
            .iter()
            .map(|p| p.max(PROB_MIN).ln())
            .collect();

        let mut logp = vec![0.0; kk];
        let mut post_m = vec![0.0; kk];
        let mut post_v = vec![0.0; kk];

        let mut zhat = Vec::with_capacity(r_j.len());
        let mut zvar_sum = 0.0;
        let mut cost = 0.0;
        let mut stat = GmmStat::zeros(kk);

        for &x in r_j {
            for k in 0..kk {
                let s = varc[k] + rvar_j;
                let d = x - meanc[k];
                logp[k] = log_prob[k] - 0.5 * (LOG_2PI + s.ln()) - d * d / (2.0 * s);
                post_m[k] = (meanc[k] * rvar_j + x * varc[k]) / s;
                post_v[k] = varc[k] * rvar_j / s;
            }

            let lse = log_sum_exp(&logp);
            cost -= lse;

            let mut z = 0.0;
            let mut z2 = 0.0;
            for k in 0..kk {
                let p = (logp[k] - lse).exp();
                let m2 = post_v[k] + post_m[k] * post_m[k];
                z += p * post_m[k];
                z2 += p * m2;
                stat.nk[k] += p;
                stat.s1[k] += p * post_m[k];
                stat.s2[k] += p * m2;
            }
            zhat.push(z);
            zvar_sum += (z2 - z * z).max(0.0);
        }

        ColumnOut {
            zhat,
            zvar: zvar_sum / r_j.len().max(1) as f64,
            cost,
            stat,
        }
    }

    /// One M-step from the accumulated sufficient statistics
    fn update_params(&mut self, stat: &GmmStat) {
        let kk = self.params.num_components();
        let ntot: f64 = stat.nk.iter().sum();
        if ntot <= 0.0 {
            return;
        }

        // a component that lost (almost) all of its mass keeps its
        // location and spread; only its weight shrinks
        let nk_min = PROB_MIN * ntot;

        for k in 0..kk {
            let nk = stat.nk[k];
            self.params.probc[k] = (nk / ntot).max(PROB_MIN);

            if nk <= nk_min {
                continue;
            }

            if !self.options.fix_means {
                self.params.meanc[k] = stat.s1[k] / nk;
            }

            let mu = self.params.meanc[k];
            let var = (stat.s2[k] - 2.0 * mu * stat.s1[k]) / nk + mu * mu;
            self.params.varc[k] = var.max(self.options.zvarmin);
        }

        let denom: f64 = self.params.probc.iter().sum();
        self.params.probc.iter_mut().for_each(|p| *p /= denom);

        debug!(
            "GMM update: probc={:?} meanc={:?} varc={:?}",
            self.params.probc, self.params.meanc, self.params.varc
        );
    }
}

impl Estimator for GmmPrior {
    fn shape(&self) -> (usize, usize) {
        self.shape
    }

    fn est_init(&self) -> anyhow::Result<EstimOut> {
        let (nrows, ncols) = self.shape;
        Ok(EstimOut {
            zhat: Mat::from_element(nrows, ncols, self.params.mean()),
            zhatvar: DVec::from_element(ncols, self.params.variance()),
            cost: 0.0,
        })
    }

    fn est(&mut self, r: &Mat, rvar: &DVec) -> anyhow::Result<EstimOut> {
        check_message(self.shape, r, rvar)?;

        let (nrows, ncols) = self.shape;
        let kk = self.params.num_components();

        let columns: Vec<ColumnOut> = (0..ncols)
            .into_par_iter()
            .map(|j| {
                let r_j = r.column(j);
                let r_j = r_j.as_slice();
                self.est_column(r_j, rvar[j])
            })
            .collect();

        let mut zhat = Mat::zeros(nrows, ncols);
        let mut zhatvar = DVec::zeros(ncols);
        let mut cost = 0.0;
        let mut stat = GmmStat::zeros(kk);

        for (j, col) in columns.into_iter().enumerate() {
            zhat.column_mut(j).copy_from_slice(&col.zhat);
            zhatvar[j] = col.zvar;
            cost += col.cost;
            stat = stat.merge(col.stat);
        }

        if self.options.tune_gmm {
            self.update_params(&stat);
        }

        Ok(EstimOut {
            zhat,
            zhatvar,
            cost,
        })
    }

    fn tuned_params(&self) -> Vec<NamedParam> {
        vec![
            NamedParam::new("probc", &self.params.probc),
            NamedParam::new("meanc", &self.params.meanc),
            NamedParam::new("varc", &self.params.varc),
        ]
    }
}
