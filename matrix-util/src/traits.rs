/// Operations to sample random matrices
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// Sample a matrix from a uniform distribution `U(0,1)`
    fn runif(dd: usize, nn: usize) -> Self::Mat;

    /// Sample a matrix from a normal distribution `N(0,1)`
    fn rnorm(dd: usize, nn: usize) -> Self::Mat;

    /// Sample a matrix from `U(0,1)` reproducibly. Each column draws
    /// from its own generator seeded by `seed + column`, so the
    /// result does not depend on the thread schedule.
    fn runif_seeded(dd: usize, nn: usize, seed: u64) -> Self::Mat;

    /// Sample a matrix from `N(0,1)` reproducibly (see `runif_seeded`)
    fn rnorm_seeded(dd: usize, nn: usize, seed: u64) -> Self::Mat;
}

/// Column-wise summaries used for normalization and power calculations
pub trait MatOps {
    type Mat;
    type Scalar;

    /// mean of squared entries `|X|^2 / (d * n)`
    fn mean_square(&self) -> Self::Scalar;

    /// per-column squared norms
    fn column_sq_norms(&self) -> Vec<Self::Scalar>;
}

/// Read and write matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    fn read_file_delim(
        file: &str,
        delim: &str,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat>;

    fn from_tsv(tsv_file: &str, skip: Option<usize>) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(tsv_file, "\t", skip)
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }
}
