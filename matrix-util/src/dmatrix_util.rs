pub use nalgebra::{DMatrix, DVector};
pub use rand::rngs::StdRng;
pub use rand::{Rng, SeedableRng};
pub use rand_distr::{StandardNormal, Uniform};
pub use rayon::prelude::*;

use crate::traits::*;
use num_traits::{Float, FromPrimitive};

fn sample_columns<T, F>(dd: usize, nn: usize, seed: Option<u64>, draw: F) -> DMatrix<T>
where
    T: nalgebra::Scalar + Send,
    F: Fn(&mut StdRng) -> T + Sync,
{
    let columns: Vec<Vec<T>> = (0..nn)
        .into_par_iter()
        .map(|j| {
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(s.wrapping_add(j as u64)),
                None => StdRng::from_rng(&mut rand::rng()),
            };
            (0..dd).map(|_| draw(&mut rng)).collect()
        })
        .collect();

    // column-major storage
    DMatrix::<T>::from_vec(dd, nn, columns.into_iter().flatten().collect())
}

impl<T> SampleOps for DMatrix<T>
where
    T: nalgebra::Scalar + Float + FromPrimitive + Send,
{
    type Mat = Self;
    type Scalar = T;

    fn runif(dd: usize, nn: usize) -> Self::Mat {
        sample_columns(dd, nn, None, |rng| {
            T::from_f64(rng.random::<f64>()).unwrap_or_else(T::zero)
        })
    }

    fn rnorm(dd: usize, nn: usize) -> Self::Mat {
        sample_columns(dd, nn, None, |rng| {
            let x: f64 = rng.sample(StandardNormal);
            T::from_f64(x).unwrap_or_else(T::zero)
        })
    }

    fn runif_seeded(dd: usize, nn: usize, seed: u64) -> Self::Mat {
        sample_columns(dd, nn, Some(seed), |rng| {
            T::from_f64(rng.random::<f64>()).unwrap_or_else(T::zero)
        })
    }

    fn rnorm_seeded(dd: usize, nn: usize, seed: u64) -> Self::Mat {
        sample_columns(dd, nn, Some(seed), |rng| {
            let x: f64 = rng.sample(StandardNormal);
            T::from_f64(x).unwrap_or_else(T::zero)
        })
    }
}

impl<T> MatOps for DMatrix<T>
where
    T: nalgebra::RealField + Float + FromPrimitive + Copy,
{
    type Mat = Self;
    type Scalar = T;

    fn mean_square(&self) -> T {
        let ntot = self.len();
        if ntot == 0 {
            return T::zero();
        }
        let ss = self.iter().fold(T::zero(), |acc, &x| acc + x * x);
        ss / T::from_usize(ntot).unwrap_or_else(T::one)
    }

    fn column_sq_norms(&self) -> Vec<T> {
        self.column_iter()
            .map(|x_j| x_j.iter().fold(T::zero(), |acc, &x| acc + x * x))
            .collect()
    }
}

