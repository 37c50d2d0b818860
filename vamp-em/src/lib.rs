//! Vector approximate message passing (VAMP) with expectation-maximization
//! (EM) tuning for sparse linear inverse problems.
//!
//! We observe `y = A x + w` with `w ~ N(0, wvar)` and model the entries of
//! `x` with a Gaussian mixture. The solver alternates between two
//! estimators that exchange Gaussian messages `N(r, rvar)`:
//! - a separable Gaussian-mixture denoiser (prior side), and
//! - a linear MMSE estimator built on the SVD of `A` (likelihood side).
//!
//! Both estimators can re-estimate their own parameters (mixture weights,
//! means, variances; noise variance) by one EM step per call.
//!
//! # References
//!
//! Rangan, Schniter & Fletcher (2019). "Vector approximate message passing."
//! Fletcher, Sahraee-Ardakan, Rangan & Schniter (2016). "Expectation
//! consistent approximate inference: generalizations and convergence."

/// Type aliases, constants and small numerical helpers
pub mod common;

/// Estimator and message handler interfaces
pub mod traits;

/// Gaussian-mixture prior estimator with EM updates
pub mod gmm;

/// Linear operator with additive white Gaussian noise
pub mod lin_awgn;

/// Extrinsic message computation with damping and variance clipping
pub mod msg;

/// VAMP iterations and history
pub mod solver;

/// Synthetic sparse linear inverse problems
pub mod sim;

/// Normalized mean squared error in dB
pub mod metrics;

pub use gmm::{GmmOptions, GmmParams, GmmPrior};
pub use lin_awgn::{LinearAwgn, LinearAwgnOptions};
pub use msg::{MsgHandler, MsgOptions};
pub use solver::{HistEntry, HistField, Vamp, VampOptions};
pub use traits::{EstimOut, Estimator, Message, MessageHandler};
