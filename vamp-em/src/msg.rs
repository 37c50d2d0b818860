use crate::common::*;
use crate::traits::*;

#[derive(Debug, Clone)]
pub struct MsgOptions {
    /// MAP messages: the cost drops the entropy term. Default: false
    pub map_est: bool,
    /// smallest outgoing variance. Default: 1e-10
    pub rvar_min: f64,
    /// largest outgoing variance. Default: 1e10
    pub rvar_max: f64,
    /// weight of the new mean against the previous one. Default: 1.0
    pub damp: f64,
    /// weight of the new variance against the previous one. Default: 1.0
    pub damp_var: f64,
}

impl Default for MsgOptions {
    fn default() -> Self {
        MsgOptions {
            map_est: false,
            rvar_min: 1e-10,
            rvar_max: 1e10,
            damp: 1.0,
            damp_var: 1.0,
        }
    }
}

/// Gaussian extrinsic messages with one variance per column
///
/// Given a belief `N(z, zvar)` that was computed from an incoming
/// message `N(r_in, rvar_in)`, the outgoing message divides the
/// incoming one out:
///
/// 1/rvar = 1/zvar - 1/rvar_in
/// r = rvar (z/zvar - r_in/rvar_in)
///
pub struct MsgHandler {
    shape: (usize, usize),
    options: MsgOptions,
}

impl MsgHandler {
    pub fn new(shape: (usize, usize), options: MsgOptions) -> anyhow::Result<Self> {
        if shape.0 == 0 || shape.1 == 0 {
            anyhow::bail!("empty message shape {:?}", shape);
        }
        let MsgOptions {
            rvar_min,
            rvar_max,
            damp,
            damp_var,
            ..
        } = options;

        if !(rvar_min > 0.0 && rvar_min <= rvar_max && rvar_max.is_finite()) {
            anyhow::bail!(
                "need 0 < rvar_min <= rvar_max < inf, got [{}, {}]",
                rvar_min,
                rvar_max
            );
        }
        if !(damp > 0.0 && damp <= 1.0) || !(damp_var > 0.0 && damp_var <= 1.0) {
            anyhow::bail!(
                "damping factors must be in (0, 1], got {} and {}",
                damp,
                damp_var
            );
        }
        Ok(Self { shape, options })
    }

    pub fn options(&self) -> &MsgOptions {
        &self.options
    }
}

impl MessageHandler for MsgHandler {
    fn shape(&self) -> (usize, usize) {
        self.shape
    }

    fn msg_sub(
        &self,
        z: &Mat,
        zvar: &DVec,
        r_in: &Mat,
        rvar_in: &DVec,
        prev: Option<&Message>,
    ) -> anyhow::Result<Message> {
        check_message(self.shape, r_in, rvar_in)?;
        if z.shape() != self.shape || zvar.len() != self.shape.1 {
            anyhow::bail!(
                "belief shape {:?} (variance {}) != {:?}",
                z.shape(),
                zvar.len(),
                self.shape
            );
        }

        let opts = &self.options;
        let ncols = self.shape.1;
        let mut r = z.clone();
        let mut rvar = DVec::zeros(ncols);

        for j in 0..ncols {
            let zv = zvar[j];
            let rv = rvar_in[j];

            if !(zv > 0.0) {
                // a certain belief passes through unchanged
                rvar[j] = opts.rvar_min;
                continue;
            }

            let gam = 1.0 / zv - 1.0 / rv;
            if gam.is_finite() && gam > 0.0 {
                let mut r_j = r.column_mut(j);
                r_j.scale_mut(1.0 / zv);
                r_j.axpy(-1.0 / rv, &r_in.column(j), 1.0);
                r_j.scale_mut(1.0 / gam);
                rvar[j] = (1.0 / gam).clamp(opts.rvar_min, opts.rvar_max);
            } else {
                // the belief is no more certain than the message;
                // send the belief with an uninformative variance
                rvar[j] = opts.rvar_max;
            }
        }

        if let Some(prev) = prev {
            if prev.r.shape() != self.shape || prev.rvar.len() != ncols {
                anyhow::bail!("previous message has a different shape");
            }
            if opts.damp < 1.0 {
                r = r * opts.damp + &prev.r * (1.0 - opts.damp);
            }
            if opts.damp_var < 1.0 {
                rvar = rvar * opts.damp_var + &prev.rvar * (1.0 - opts.damp_var);
            }
        }

        Ok(Message { r, rvar })
    }

    fn cost(&self, z: &Mat, zvar: &DVec, r: &Mat, rvar: &DVec) -> f64 {
        let nrows = self.shape.0 as f64;
        (0..self.shape.1)
            .map(|j| {
                let rv = rvar[j];
                let zv = zvar[j].max(f64::MIN_POSITIVE);
                let dist = (z.column(j) - r.column(j)).norm_squared();
                let quad = (dist + nrows * zv) / (2.0 * rv);
                if self.options.map_est {
                    quad
                } else {
                    quad - 0.5 * nrows * (zv / rv).ln()
                }
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn extrinsic_message() -> anyhow::Result<()> {
        let hdl = MsgHandler::new((2, 1), MsgOptions::default())?;
        let z = Mat::from_column_slice(2, 1, &[1.0, 2.0]);
        let zvar = DVec::from_element(1, 0.5);
        let r_in = Mat::from_column_slice(2, 1, &[0.0, 4.0]);
        let rvar_in = DVec::from_element(1, 1.0);

        let out = hdl.msg_sub(&z, &zvar, &r_in, &rvar_in, None)?;

        // 1/rvar = 2 - 1; r = (z / 0.5 - r_in) / 1
        assert_abs_diff_eq!(out.rvar[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.r[(0, 0)], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.r[(1, 0)], 0.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn non_positive_precision_falls_back() -> anyhow::Result<()> {
        let options = MsgOptions {
            rvar_max: 1e6,
            ..Default::default()
        };
        let hdl = MsgHandler::new((2, 1), options)?;
        let z = Mat::from_column_slice(2, 1, &[1.0, 2.0]);
        let out = hdl.msg_sub(
            &z,
            &DVec::from_element(1, 2.0),
            &Mat::zeros(2, 1),
            &DVec::from_element(1, 1.0),
            None,
        )?;
        assert_eq!(out.rvar[0], 1e6);
        assert_eq!(out.r, z);
        Ok(())
    }

    #[test]
    fn variance_is_clipped() -> anyhow::Result<()> {
        let options = MsgOptions {
            rvar_max: 10.0,
            ..Default::default()
        };
        let hdl = MsgHandler::new((1, 1), options)?;
        // 1/rvar = 1/0.99 - 1 ~ 0.0101 -> rvar ~ 99 -> clipped
        let out = hdl.msg_sub(
            &Mat::zeros(1, 1),
            &DVec::from_element(1, 0.99),
            &Mat::zeros(1, 1),
            &DVec::from_element(1, 1.0),
            None,
        )?;
        assert_eq!(out.rvar[0], 10.0);
        Ok(())
    }

    #[test]
    fn damping_mixes_previous_message() -> anyhow::Result<()> {
        let options = MsgOptions {
            damp: 0.5,
            damp_var: 0.25,
            ..Default::default()
        };
        let hdl = MsgHandler::new((1, 1), options)?;
        let prev = Message {
            r: Mat::from_element(1, 1, 10.0),
            rvar: DVec::from_element(1, 5.0),
        };
        let out = hdl.msg_sub(
            &Mat::from_element(1, 1, 1.0),
            &DVec::from_element(1, 0.5),
            &Mat::zeros(1, 1),
            &DVec::from_element(1, 1.0),
            Some(&prev),
        )?;
        // undamped: rvar = 1, r = 2
        assert_abs_diff_eq!(out.r[(0, 0)], 0.5 * 2.0 + 0.5 * 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.rvar[0], 0.25 * 1.0 + 0.75 * 5.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn map_cost_drops_entropy() -> anyhow::Result<()> {
        let z = Mat::from_element(3, 1, 1.0);
        let r = Mat::zeros(3, 1);
        let zvar = DVec::from_element(1, 0.5);
        let rvar = DVec::from_element(1, 2.0);

        let map = MsgHandler::new(
            (3, 1),
            MsgOptions {
                map_est: true,
                ..Default::default()
            },
        )?;
        let mmse = MsgHandler::new((3, 1), MsgOptions::default())?;

        let quad = (3.0 + 3.0 * 0.5) / 4.0;
        assert_abs_diff_eq!(map.cost(&z, &zvar, &r, &rvar), quad, epsilon = 1e-12);
        assert_abs_diff_eq!(
            mmse.cost(&z, &zvar, &r, &rvar),
            quad - 1.5 * (0.25f64).ln(),
            epsilon = 1e-12
        );
        Ok(())
    }

    #[test]
    fn invalid_options_are_rejected() {
        let bad_damp = MsgOptions {
            damp: 0.0,
            ..Default::default()
        };
        assert!(MsgHandler::new((1, 1), bad_damp).is_err());
        let bad_clip = MsgOptions {
            rvar_min: 1.0,
            rvar_max: 0.5,
            ..Default::default()
        };
        assert!(MsgHandler::new((1, 1), bad_clip).is_err());
    }
}
