use crate::common::*;
use serde::Serialize;
use vamp_em::sim::{SimData, SparseLinearSim};

#[derive(Args, Debug, Clone)]
pub struct SimArgs {
    /// latent dimension (columns of A)
    #[arg(long, default_value_t = 1000)]
    pub nz0: usize,

    /// number of measurements (rows of A)
    #[arg(long, default_value_t = 500)]
    pub nz1: usize,

    /// number of independent signal columns
    #[arg(long, default_value_t = 1)]
    pub ncol: usize,

    /// fraction of non-zero entries
    #[arg(long, default_value_t = 0.1)]
    pub sparse_rat: f64,

    /// mean of the non-zero entries
    #[arg(long, default_value_t = 0.0)]
    pub xmean: f64,

    /// variance of the non-zero entries
    #[arg(long, default_value_t = 1.0)]
    pub xvar: f64,

    /// signal-to-noise ratio (dB)
    #[arg(long, default_value_t = 30.0)]
    pub snr: f64,

    /// condition number of A. If None, i.i.d. Gaussian entries
    #[arg(long)]
    pub cond_num: Option<f64>,

    /// random seed
    #[arg(long, default_value_t = 42)]
    pub rseed: u64,
}

impl SimArgs {
    pub fn to_sim(&self) -> SparseLinearSim {
        SparseLinearSim {
            nz0: self.nz0,
            nz1: self.nz1,
            ncol: self.ncol,
            sparse_rat: self.sparse_rat,
            xmean: self.xmean,
            xvar: self.xvar,
            snr_db: self.snr,
            cond_num: self.cond_num,
            seed: self.rseed,
        }
    }
}

#[derive(Args, Debug)]
pub struct SimCmdArgs {
    #[command(flatten)]
    pub sim: SimArgs,

    /// output file header
    #[arg(short, long, required = true)]
    pub out: Box<str>,
}

#[derive(Serialize)]
struct SimRecord<'a> {
    settings: &'a SparseLinearSim,
    wvar: f64,
}

pub fn write_sim_data(sim: &SparseLinearSim, data: &SimData, out: &str) -> anyhow::Result<()> {
    mkdir(out)?;

    let x0_file = out.to_string() + ".x0.tsv.gz";
    let a_file = out.to_string() + ".A.tsv.gz";
    let y_file = out.to_string() + ".y.tsv.gz";
    let json_file = out.to_string() + ".sim.json";

    data.x0.to_tsv(&x0_file)?;
    data.a.to_tsv(&a_file)?;
    data.y.to_tsv(&y_file)?;
    write_json(
        &SimRecord {
            settings: sim,
            wvar: data.wvar,
        },
        &json_file,
    )?;

    info!("wrote {}, {}, {}", x0_file, a_file, y_file);
    Ok(())
}

pub fn run_sim(args: &SimCmdArgs) -> anyhow::Result<()> {
    let sim = args.sim.to_sim();
    let data = sim.generate()?;
    write_sim_data(&sim, &data, &args.out)?;
    info!("done");
    Ok(())
}
