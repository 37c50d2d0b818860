use approx::assert_abs_diff_eq;
use matrix_util::traits::{MatOps, SampleOps};
use nalgebra::DMatrix;

#[test]
fn seeded_sampling_is_reproducible() {
    let xx = DMatrix::<f64>::rnorm_seeded(30, 7, 42);
    let yy = DMatrix::<f64>::rnorm_seeded(30, 7, 42);
    let zz = DMatrix::<f64>::rnorm_seeded(30, 7, 43);

    assert_eq!(xx, yy);
    assert_ne!(xx, zz);
}

#[test]
fn rnorm_moments() {
    let xx = DMatrix::<f64>::rnorm_seeded(2000, 10, 1);
    let mean = xx.mean();
    assert!(mean.abs() < 0.05);
    assert_abs_diff_eq!(xx.mean_square(), 1.0, epsilon = 0.05);
}

#[test]
fn runif_range() {
    let xx = DMatrix::<f32>::runif(100, 10);
    assert!(xx.iter().all(|&x| (0.0..=1.0).contains(&x)));
}

#[test]
fn column_sq_norms_test() {
    let xx = DMatrix::<f64>::from_column_slice(2, 2, &[3.0, 4.0, 1.0, 0.0]);
    assert_eq!(xx.column_sq_norms(), vec![25.0, 1.0]);
    assert_abs_diff_eq!(xx.mean_square(), 26.0 / 4.0);
}
