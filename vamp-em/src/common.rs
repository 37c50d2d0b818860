#![allow(dead_code)]

pub use log::{debug, info, warn};

pub type Mat = nalgebra::DMatrix<f64>;
pub type DVec = nalgebra::DVector<f64>;

/// ln(2π)
pub const LOG_2PI: f64 = 1.837_877_066_409_345_5;

/// smallest mixture weight we keep to avoid `ln(0)`
pub const PROB_MIN: f64 = 1e-12;

/// A learnable parameter vector reported by an estimator
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NamedParam {
    pub name: Box<str>,
    pub value: Vec<f64>,
}

impl NamedParam {
    pub fn new(name: &str, value: &[f64]) -> Self {
        Self {
            name: name.into(),
            value: value.to_vec(),
        }
    }
}

/// log(sum(exp(x))) without overflow
pub fn log_sum_exp(xx: &[f64]) -> f64 {
    let max = xx.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + xx.iter().map(|&x| (x - max).exp()).sum::<f64>().ln()
}

/// Check that a (mean, variance) message matches the expected shape
/// and carries positive finite variances
pub fn check_message(shape: (usize, usize), r: &Mat, rvar: &DVec) -> anyhow::Result<()> {
    if r.shape() != shape {
        anyhow::bail!("message mean shape {:?} != expected {:?}", r.shape(), shape);
    }
    if rvar.len() != shape.1 {
        anyhow::bail!(
            "message variance length {} != number of columns {}",
            rvar.len(),
            shape.1
        );
    }
    if let Some(v) = rvar.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        anyhow::bail!("message variance must be positive and finite, got {}", v);
    }
    Ok(())
}

