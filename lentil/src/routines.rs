use crate::common::*;
use serde::Serialize;
use vamp_em::common::NamedParam;
use vamp_em::metrics::mse_curve;
use vamp_em::*;

pub type Solver = Vamp<GmmPrior, LinearAwgn, MsgHandler>;

#[derive(Args, Debug, Clone)]
pub struct PriorArgs {
    /// initial mixture weights (comma-separated)
    #[arg(long, value_delimiter = ',', default_values_t = vec![0.9, 0.1])]
    pub probc: Vec<f64>,

    /// initial mixture means (comma-separated)
    #[arg(long, value_delimiter = ',', default_values_t = vec![0.0, 0.0])]
    pub meanc: Vec<f64>,

    /// initial mixture variances (comma-separated)
    #[arg(long, value_delimiter = ',', default_values_t = vec![1e-4, 1.0])]
    pub varc: Vec<f64>,

    /// floor of the mixture variances
    #[arg(long, default_value_t = 1e-10)]
    pub zvarmin: f64,

    /// learn the mixture by EM
    #[arg(long)]
    pub tune_gmm: bool,

    /// keep the mixture means fixed while tuning
    #[arg(long)]
    pub fix_means: bool,
}

impl PriorArgs {
    pub fn params(&self) -> anyhow::Result<GmmParams> {
        GmmParams::new(self.probc.clone(), self.meanc.clone(), self.varc.clone())
    }

    pub fn options(&self) -> GmmOptions {
        GmmOptions {
            zvarmin: self.zvarmin,
            tune_gmm: self.tune_gmm,
            fix_means: self.fix_means,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct NoiseArgs {
    /// initial noise variance. If None, 10% of the mean squared observation
    #[arg(long)]
    pub wvar: Option<f64>,

    /// learn the noise variance by EM
    #[arg(long)]
    pub tune_wvar: bool,

    /// floor of the noise variance
    #[arg(long, default_value_t = 1e-12)]
    pub wvar_min: f64,
}

impl NoiseArgs {
    pub fn options(&self, y: &Mat, map_est: bool) -> LinearAwgnOptions {
        let wvar_init = self.wvar.unwrap_or_else(|| {
            let ntot = y.len().max(1) as f64;
            (0.1 * y.norm_squared() / ntot).max(self.wvar_min)
        });
        LinearAwgnOptions {
            wvar_init,
            map_est,
            tune_wvar: self.tune_wvar,
            wvar_min: self.wvar_min,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SolverArgs {
    /// number of VAMP iterations
    #[arg(long, default_value_t = 50)]
    pub nit: usize,

    /// history fields to record (comma-separated): zhat, zhatvar,
    /// zhat1, zhatvar1, r0, rvar0, r1, rvar1, cost, params
    #[arg(long, value_delimiter = ',', default_values_t = vec!["zhat".to_string(), "params".to_string()])]
    pub hist: Vec<String>,

    /// stop when the relative change of the estimate falls below this
    #[arg(long)]
    pub conv_tol: Option<f64>,

    /// log every `prt_period` iterations (0: never)
    #[arg(long, default_value_t = 10)]
    pub prt_period: usize,

    /// MAP costs instead of MMSE costs
    #[arg(long)]
    pub map: bool,

    /// damping of the message means, in (0, 1]
    #[arg(long, default_value_t = 1.0)]
    pub damp: f64,

    /// damping of the message variances, in (0, 1]
    #[arg(long, default_value_t = 1.0)]
    pub damp_var: f64,

    /// smallest message variance
    #[arg(long, default_value_t = 1e-10)]
    pub rvar_min: f64,

    /// largest message variance
    #[arg(long, default_value_t = 1e10)]
    pub rvar_max: f64,

    /// show a progress bar
    #[arg(long)]
    pub progress: bool,
}

impl SolverArgs {
    pub fn hist_list(&self) -> anyhow::Result<Vec<HistField>> {
        self.hist.iter().map(|h| h.parse()).collect()
    }

    pub fn msg_options(&self) -> MsgOptions {
        MsgOptions {
            map_est: self.map,
            rvar_min: self.rvar_min,
            rvar_max: self.rvar_max,
            damp: self.damp,
            damp_var: self.damp_var,
        }
    }

    pub fn vamp_options(&self) -> anyhow::Result<VampOptions> {
        Ok(VampOptions {
            nit: self.nit,
            hist_list: self.hist_list()?,
            conv_tol: self.conv_tol,
            prt_period: self.prt_period,
            progress: self.progress,
        })
    }
}

/// Assemble prior, likelihood and message handler around `y = A x + w`
pub fn build_solver(
    a: Mat,
    y: Mat,
    params: GmmParams,
    gmm_options: GmmOptions,
    lik_options: LinearAwgnOptions,
    solver_args: &SolverArgs,
) -> anyhow::Result<Solver> {
    let shape = (a.ncols(), y.ncols());

    info!(
        "prior: probc={:?} meanc={:?} varc={:?} (tune: {})",
        params.probc, params.meanc, params.varc, gmm_options.tune_gmm
    );
    info!(
        "noise: wvar={:.4e} (tune: {})",
        lik_options.wvar_init, lik_options.tune_wvar
    );

    let prior = GmmPrior::new(shape, params, gmm_options)?;
    let lik = LinearAwgn::new(a, y, lik_options)?;
    let msg_hdl = MsgHandler::new(shape, solver_args.msg_options())?;

    Vamp::new(prior, lik, msg_hdl, solver_args.vamp_options()?)
}

#[derive(Serialize, Debug)]
pub struct RunSummary {
    pub num_iter: usize,
    pub converged: bool,
    pub cost: f64,
    pub params: Vec<NamedParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mse_db: Option<Vec<f64>>,
}

impl RunSummary {
    pub fn from_solver(solver: &Solver, truth: Option<&Mat>) -> anyhow::Result<Self> {
        let mut params = solver.prior().tuned_params();
        params.extend(solver.lik().tuned_params());

        let mse_db = match (truth, solver.hist(HistField::Zhat)) {
            (Some(x0), Some(hist)) => Some(mse_curve(hist, x0)?),
            (Some(_), None) => {
                anyhow::bail!("need `zhat` in the history list to compute the MSE curve")
            }
            _ => None,
        };

        Ok(Self {
            num_iter: solver.num_iter(),
            converged: solver.converged(),
            cost: solver.cost(),
            params,
            mse_db,
        })
    }
}

/// Write `iter <tab> name_1 <tab> name_2 ...` rows
pub fn write_curves(names: &[&str], curves: &[Vec<f64>], file: &str) -> anyhow::Result<()> {
    if names.len() != curves.len() {
        anyhow::bail!("{} names for {} curves", names.len(), curves.len());
    }
    let nit = curves.iter().map(|c| c.len()).max().unwrap_or(0);

    let mut lines = Vec::with_capacity(nit + 1);
    lines.push(
        std::iter::once("iter")
            .chain(names.iter().copied())
            .collect::<Vec<_>>()
            .join("\t")
            .into_boxed_str(),
    );
    for it in 0..nit {
        let row = std::iter::once((it + 1).to_string())
            .chain(curves.iter().map(|c| match c.get(it) {
                Some(x) => format!("{:.6}", x),
                None => "NA".to_string(),
            }))
            .collect::<Vec<_>>()
            .join("\t");
        lines.push(row.into_boxed_str());
    }
    write_lines(&lines, file)
}
