use crate::common::*;
use crate::solver::HistEntry;

/// `10 log10` of the smallest positive normal `f64`
pub const MSE_DB_FLOOR: f64 = -3076.5265556858876;

/// Normalized MSE in dB
///
/// 10 log10(|zhat - x0|^2 / |x0|^2)
///
/// An exact estimate gives `MSE_DB_FLOOR` instead of `-inf`, also when
/// `x0` is all zeros. Otherwise the denominator is floored at the
/// smallest positive `f64`.
pub fn mse_db(zhat: &Mat, x0: &Mat) -> anyhow::Result<f64> {
    if zhat.shape() != x0.shape() {
        anyhow::bail!("shape mismatch: {:?} vs {:?}", zhat.shape(), x0.shape());
    }
    let err = (zhat - x0).norm_squared();
    if !(err > 0.0) {
        return Ok(MSE_DB_FLOOR);
    }
    let denom = x0.norm_squared().max(f64::MIN_POSITIVE);
    Ok((10.0 * (err / denom).log10()).max(MSE_DB_FLOOR))
}

/// MSE (dB) of every matrix in a history list, e.g. the `zhat` history
pub fn mse_curve(hist: &[HistEntry], x0: &Mat) -> anyhow::Result<Vec<f64>> {
    hist.iter()
        .enumerate()
        .map(|(it, entry)| {
            let zhat = entry
                .as_mat()
                .ok_or(anyhow::anyhow!("history entry {} is not a matrix", it))?;
            mse_db(zhat, x0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn mse_db_values() -> anyhow::Result<()> {
        let x0 = Mat::from_element(4, 1, 1.0);
        let zhat = Mat::from_element(4, 1, 0.9);
        // 4 * 0.01 / 4 = 0.01 -> -20 dB
        assert_abs_diff_eq!(mse_db(&zhat, &x0)?, -20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(mse_db(&Mat::zeros(4, 1), &x0)?, 0.0, epsilon = 1e-12);
        assert_eq!(mse_db(&x0, &x0)?, MSE_DB_FLOOR);
        assert!(mse_db(&Mat::zeros(3, 1), &x0).is_err());
        Ok(())
    }

    #[test]
    fn all_zero_truth() -> anyhow::Result<()> {
        let x0 = Mat::zeros(3, 2);
        assert_eq!(mse_db(&x0, &x0)?, MSE_DB_FLOOR);
        // any error against an all-zero truth is huge, never below the floor
        assert!(mse_db(&Mat::from_element(3, 2, 1e-3), &x0)? > 0.0);
        assert_abs_diff_eq!(
            MSE_DB_FLOOR,
            10.0 * f64::MIN_POSITIVE.log10(),
            epsilon = 1e-9
        );
        Ok(())
    }

    #[test]
    fn mse_curve_requires_matrices() -> anyhow::Result<()> {
        let x0 = Mat::from_element(2, 1, 1.0);
        let hist = vec![
            HistEntry::Mat(Mat::zeros(2, 1)),
            HistEntry::Mat(x0.clone() * 0.9),
        ];
        let curve = mse_curve(&hist, &x0)?;
        assert_eq!(curve.len(), 2);
        assert!(curve[1] < curve[0]);

        let bad = vec![HistEntry::Scalar(1.0)];
        assert!(mse_curve(&bad, &x0).is_err());
        Ok(())
    }
}
