use crate::common::*;

/// Output of an estimator given an incoming message
#[derive(Debug, Clone)]
pub struct EstimOut {
    /// posterior mean, same shape as the latent array
    pub zhat: Mat,
    /// posterior variance averaged over each column
    pub zhatvar: DVec,
    /// scalar cost of this estimate (lower is better)
    pub cost: f64,
}

/// A Gaussian message `N(r, rvar)` with one variance per column
#[derive(Debug, Clone)]
pub struct Message {
    pub r: Mat,
    pub rvar: DVec,
}

/// An estimator of a latent array `z` that combines its own factor
/// (prior or likelihood) with an incoming Gaussian message.
pub trait Estimator {
    /// shape of the latent array (rows, columns)
    fn shape(&self) -> (usize, usize);

    /// Estimate without any incoming message
    fn est_init(&self) -> anyhow::Result<EstimOut>;

    /// Posterior mean and variance of `z` under `factor(z) N(z; r, rvar)`.
    ///
    /// A tuning estimator also takes one EM step on its own parameters
    /// from the beliefs computed here. The updated parameters are used
    /// from the next call.
    fn est(&mut self, r: &Mat, rvar: &DVec) -> anyhow::Result<EstimOut>;

    /// Current values of learnable parameters
    fn tuned_params(&self) -> Vec<NamedParam> {
        vec![]
    }
}

/// Turns a belief and the message that produced it into the extrinsic
/// message for the other side.
pub trait MessageHandler {
    fn shape(&self) -> (usize, usize);

    /// * `z`, `zvar` - belief of an estimator
    /// * `r_in`, `rvar_in` - the message that estimator received
    /// * `prev` - the previous outgoing message on this edge (damping)
    fn msg_sub(
        &self,
        z: &Mat,
        zvar: &DVec,
        r_in: &Mat,
        rvar_in: &DVec,
        prev: Option<&Message>,
    ) -> anyhow::Result<Message>;

    /// Penalty of a belief against the message it was computed from
    fn cost(&self, z: &Mat, zvar: &DVec, r: &Mat, rvar: &DVec) -> f64;
}
