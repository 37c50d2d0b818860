use crate::common::*;
use crate::traits::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Quantities that can be recorded once per iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HistField {
    /// prior-side posterior mean
    Zhat,
    /// prior-side posterior variance
    Zhatvar,
    /// likelihood-side posterior mean
    Zhat1,
    /// likelihood-side posterior variance
    Zhatvar1,
    /// message into the prior
    R0,
    Rvar0,
    /// message into the likelihood
    R1,
    Rvar1,
    /// total cost
    Cost,
    /// learnable parameters of both estimators
    Params,
}

impl HistField {
    pub fn all() -> Vec<HistField> {
        vec![
            HistField::Zhat,
            HistField::Zhatvar,
            HistField::Zhat1,
            HistField::Zhatvar1,
            HistField::R0,
            HistField::Rvar0,
            HistField::R1,
            HistField::Rvar1,
            HistField::Cost,
            HistField::Params,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            HistField::Zhat => "zhat",
            HistField::Zhatvar => "zhatvar",
            HistField::Zhat1 => "zhat1",
            HistField::Zhatvar1 => "zhatvar1",
            HistField::R0 => "r0",
            HistField::Rvar0 => "rvar0",
            HistField::R1 => "r1",
            HistField::Rvar1 => "rvar1",
            HistField::Cost => "cost",
            HistField::Params => "params",
        }
    }
}

impl fmt::Display for HistField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HistField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim().to_lowercase();
        HistField::all()
            .into_iter()
            .find(|h| h.name() == s)
            .ok_or(anyhow::anyhow!(
                "unknown history field '{}' (expected one of {:?})",
                s,
                HistField::all().iter().map(|h| h.name()).collect::<Vec<_>>()
            ))
    }
}

/// One recorded value
#[derive(Debug, Clone)]
pub enum HistEntry {
    Mat(Mat),
    Vec(DVec),
    Scalar(f64),
    Params(Vec<NamedParam>),
}

impl HistEntry {
    pub fn as_mat(&self) -> Option<&Mat> {
        match self {
            HistEntry::Mat(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_vec(&self) -> Option<&DVec> {
        match self {
            HistEntry::Vec(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            HistEntry::Scalar(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_params(&self) -> Option<&[NamedParam]> {
        match self {
            HistEntry::Params(x) => Some(x),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VampOptions {
    /// number of iterations. Default: 20
    pub nit: usize,
    /// fields to record per iteration. Default: none
    pub hist_list: Vec<HistField>,
    /// stop when |Δzhat|^2 / |zhat|^2 falls below this. Default: None
    pub conv_tol: Option<f64>,
    /// log every `prt_period` iterations (0: never). Default: 0
    pub prt_period: usize,
    /// show a progress bar. Default: false
    pub progress: bool,
}

impl Default for VampOptions {
    fn default() -> Self {
        VampOptions {
            nit: 20,
            hist_list: vec![],
            conv_tol: None,
            prt_period: 0,
            progress: false,
        }
    }
}

/// Vector approximate message passing between a prior-side estimator
/// `P` and a likelihood-side estimator `L`.
///
/// # Usage
///
/// ```ignore
/// let mut solver = Vamp::new(prior, lik, msg_hdl, VampOptions {
///     nit: 30,
///     hist_list: vec![HistField::Zhat],
///     ..Default::default()
/// })?;
/// solver.run()?;
/// let zhat_hist = solver.hist(HistField::Zhat);
/// ```
pub struct Vamp<P, L, M> {
    prior: P,
    lik: L,
    msg_hdl: M,
    options: VampOptions,
    zhat: Mat,
    zhatvar: DVec,
    zhat1: Mat,
    zhatvar1: DVec,
    hist: BTreeMap<HistField, Vec<HistEntry>>,
    num_iter: usize,
    converged: bool,
    cost: f64,
}

struct IterState<'a> {
    out0: &'a EstimOut,
    out1: &'a EstimOut,
    msg0: &'a Message,
    msg1: &'a Message,
    cost: f64,
}

impl<P, L, M> Vamp<P, L, M>
where
    P: Estimator,
    L: Estimator,
    M: MessageHandler,
{
    pub fn new(prior: P, lik: L, msg_hdl: M, options: VampOptions) -> anyhow::Result<Self> {
        let shape = prior.shape();
        if lik.shape() != shape {
            anyhow::bail!(
                "prior shape {:?} != likelihood shape {:?}",
                shape,
                lik.shape()
            );
        }
        if msg_hdl.shape() != shape {
            anyhow::bail!(
                "prior shape {:?} != message shape {:?}",
                shape,
                msg_hdl.shape()
            );
        }
        if let Some(tol) = options.conv_tol {
            if !(tol > 0.0) {
                anyhow::bail!("convergence tolerance must be positive, got {}", tol);
            }
        }

        let (nrows, ncols) = shape;
        Ok(Self {
            prior,
            lik,
            msg_hdl,
            options,
            zhat: Mat::zeros(nrows, ncols),
            zhatvar: DVec::zeros(ncols),
            zhat1: Mat::zeros(nrows, ncols),
            zhatvar1: DVec::zeros(ncols),
            hist: BTreeMap::new(),
            num_iter: 0,
            converged: false,
            cost: f64::NAN,
        })
    }

    /// Run the iterations from the prior's initial estimate. Calling
    /// `run` again starts over (tuned parameters are kept).
    pub fn run(&mut self) -> anyhow::Result<()> {
        let nit = self.options.nit;
        let (nrows, ncols) = self.prior.shape();

        info!(
            "VAMP: {} x {} latent, {} iterations, recording {:?}",
            nrows,
            ncols,
            nit,
            self.options
                .hist_list
                .iter()
                .map(|h| h.name())
                .collect::<Vec<_>>()
        );

        self.hist.clear();
        for &field in self.options.hist_list.iter() {
            self.hist.insert(field, vec![]);
        }
        self.num_iter = 0;
        self.converged = false;

        // the prior alone gives the first message to the likelihood
        let init = self.prior.est_init()?;
        let mut msg1 = Message {
            r: init.zhat.clone(),
            rvar: init.zhatvar.clone(),
        };
        let out1 = self.lik.est(&msg1.r, &msg1.rvar)?;
        let mut msg0 = self
            .msg_hdl
            .msg_sub(&out1.zhat, &out1.zhatvar, &msg1.r, &msg1.rvar, None)?;

        self.zhat = init.zhat;
        self.zhatvar = init.zhatvar;
        self.zhat1 = out1.zhat;
        self.zhatvar1 = out1.zhatvar;

        let pb = if self.options.progress {
            let pb = ProgressBar::new(nit as u64);
            pb.set_style(
                ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        for it in 0..nit {
            // prior side
            let out0 = self.prior.est(&msg0.r, &msg0.rvar)?;
            let cost0 = self
                .msg_hdl
                .cost(&out0.zhat, &out0.zhatvar, &msg0.r, &msg0.rvar);
            let new1 = self.msg_hdl.msg_sub(
                &out0.zhat,
                &out0.zhatvar,
                &msg0.r,
                &msg0.rvar,
                Some(&msg1),
            )?;

            // likelihood side
            let out1 = self.lik.est(&new1.r, &new1.rvar)?;
            let cost1 = self
                .msg_hdl
                .cost(&out1.zhat, &out1.zhatvar, &new1.r, &new1.rvar);
            let new0 = self.msg_hdl.msg_sub(
                &out1.zhat,
                &out1.zhatvar,
                &new1.r,
                &new1.rvar,
                Some(&msg0),
            )?;

            let cost = out0.cost + out1.cost + cost0 + cost1;

            let delta = (&out0.zhat - &self.zhat).norm_squared()
                / out0.zhat.norm_squared().max(f64::MIN_POSITIVE);

            self.record(IterState {
                out0: &out0,
                out1: &out1,
                msg0: &msg0,
                msg1: &new1,
                cost,
            });

            msg0 = new0;
            msg1 = new1;
            self.zhat = out0.zhat;
            self.zhatvar = out0.zhatvar;
            self.zhat1 = out1.zhat;
            self.zhatvar1 = out1.zhatvar;
            self.cost = cost;
            self.num_iter = it + 1;

            if !cost.is_finite() {
                warn!("non-finite cost at iteration {}", it + 1);
            }

            let period = self.options.prt_period;
            if period > 0 && (it + 1) % period == 0 {
                info!(
                    "iter {:>4}/{}: cost = {:.6e}, |Δz|²/|z|² = {:.3e}, rvar0 = {:.3e}",
                    it + 1,
                    nit,
                    cost,
                    delta,
                    msg0.rvar.mean()
                );
            }
            pb.inc(1);

            if let Some(tol) = self.options.conv_tol {
                if it > 0 && delta < tol {
                    info!("converged at iteration {} (|Δz|²/|z|² = {:.3e})", it + 1, delta);
                    self.converged = true;
                    break;
                }
            }
        }
        pb.finish_and_clear();

        Ok(())
    }

    fn record(&mut self, state: IterState) {
        let mut params = vec![];
        if self.options.hist_list.contains(&HistField::Params) {
            params.extend(self.prior.tuned_params());
            params.extend(self.lik.tuned_params());
        }

        for &field in self.options.hist_list.iter() {
            let entry = match field {
                HistField::Zhat => HistEntry::Mat(state.out0.zhat.clone()),
                HistField::Zhatvar => HistEntry::Vec(state.out0.zhatvar.clone()),
                HistField::Zhat1 => HistEntry::Mat(state.out1.zhat.clone()),
                HistField::Zhatvar1 => HistEntry::Vec(state.out1.zhatvar.clone()),
                HistField::R0 => HistEntry::Mat(state.msg0.r.clone()),
                HistField::Rvar0 => HistEntry::Vec(state.msg0.rvar.clone()),
                HistField::R1 => HistEntry::Mat(state.msg1.r.clone()),
                HistField::Rvar1 => HistEntry::Vec(state.msg1.rvar.clone()),
                HistField::Cost => HistEntry::Scalar(state.cost),
                HistField::Params => HistEntry::Params(params.clone()),
            };
            self.hist.entry(field).or_default().push(entry);
        }
    }

    /// prior-side posterior mean after the last iteration
    pub fn zhat(&self) -> &Mat {
        &self.zhat
    }

    pub fn zhatvar(&self) -> &DVec {
        &self.zhatvar
    }

    /// likelihood-side posterior mean after the last iteration
    pub fn zhat1(&self) -> &Mat {
        &self.zhat1
    }

    pub fn zhatvar1(&self) -> &DVec {
        &self.zhatvar1
    }

    /// recorded values of a field, one per completed iteration;
    /// `None` if the field was not in the history list
    pub fn hist(&self, field: HistField) -> Option<&[HistEntry]> {
        self.hist.get(&field).map(|x| x.as_slice())
    }

    /// recorded values of a field given by name
    pub fn hist_by_name(&self, name: &str) -> anyhow::Result<&[HistEntry]> {
        let field: HistField = name.parse()?;
        self.hist(field)
            .ok_or(anyhow::anyhow!("'{}' is not in the history list", field))
    }

    pub fn num_iter(&self) -> usize {
        self.num_iter
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// total cost of the last iteration
    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn prior(&self) -> &P {
        &self.prior
    }

    pub fn lik(&self) -> &L {
        &self.lik
    }

    pub fn options(&self) -> &VampOptions {
        &self.options
    }

    pub fn into_parts(self) -> (P, L, M) {
        (self.prior, self.lik, self.msg_hdl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hist_field_names() -> anyhow::Result<()> {
        for h in HistField::all() {
            let parsed: HistField = h.name().parse()?;
            assert_eq!(parsed, h);
        }
        assert_eq!("ZHAT".parse::<HistField>()?, HistField::Zhat);
        assert!("zhat2".parse::<HistField>().is_err());
        Ok(())
    }

    #[test]
    fn hist_entry_accessors() {
        let e = HistEntry::Scalar(1.5);
        assert_eq!(e.as_scalar(), Some(1.5));
        assert!(e.as_mat().is_none());
        let e = HistEntry::Vec(DVec::from_element(2, 1.0));
        assert_eq!(e.as_vec().map(|v| v.len()), Some(2));
        assert!(e.as_params().is_none());
    }
}
