use crate::common::*;
use crate::routines::*;

#[derive(Args, Debug)]
pub struct FitArgs {
    /// linear operator A, m x n (`.tsv`, `.tsv.gz`)
    #[arg(short = 'a', long, required = true)]
    pub a_file: Box<str>,

    /// observations y, m x ncol (`.tsv`, `.tsv.gz`)
    #[arg(short = 'y', long, required = true)]
    pub y_file: Box<str>,

    /// ground truth x0, n x ncol, to report the MSE per iteration
    #[arg(short = 't', long)]
    pub truth: Option<Box<str>>,

    /// number of header lines to skip in the input files
    #[arg(long)]
    pub skip: Option<usize>,

    #[command(flatten)]
    pub prior: PriorArgs,

    #[command(flatten)]
    pub noise: NoiseArgs,

    #[command(flatten)]
    pub solver: SolverArgs,

    /// output file header
    #[arg(short, long, required = true)]
    pub out: Box<str>,
}

pub fn run_fit(args: &FitArgs) -> anyhow::Result<()> {
    let a = Mat::from_tsv(&args.a_file, args.skip)?;
    let y = Mat::from_tsv(&args.y_file, args.skip)?;
    info!("A: {} x {}, y: {} x {}", a.nrows(), a.ncols(), y.nrows(), y.ncols());

    let truth = match &args.truth {
        Some(file) => {
            let x0 = Mat::from_tsv(file, args.skip)?;
            if x0.shape() != (a.ncols(), y.ncols()) {
                anyhow::bail!(
                    "truth is {:?}, expected {:?}",
                    x0.shape(),
                    (a.ncols(), y.ncols())
                );
            }
            Some(x0)
        }
        None => None,
    };

    let lik_options = args.noise.options(&y, args.solver.map);
    let mut solver = build_solver(
        a,
        y,
        args.prior.params()?,
        args.prior.options(),
        lik_options,
        &args.solver,
    )?;

    solver.run()?;

    let summary = RunSummary::from_solver(&solver, truth.as_ref())?;

    mkdir(&args.out)?;
    solver.zhat().to_tsv(&(args.out.to_string() + ".zhat.tsv.gz"))?;
    Mat::from_row_slice(1, solver.zhatvar().len(), solver.zhatvar().as_slice())
        .to_tsv(&(args.out.to_string() + ".zhatvar.tsv.gz"))?;

    if let Some(mse) = summary.mse_db.as_ref() {
        write_curves(&["mse_db"], &[mse.clone()], &(args.out.to_string() + ".mse.tsv"))?;
        if let Some(last) = mse.last() {
            info!("final MSE: {:.3} dB", last);
        }
    }

    write_json(&summary, &(args.out.to_string() + ".summary.json"))?;

    info!("done");
    Ok(())
}
