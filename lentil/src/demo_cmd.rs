use crate::common::*;
use crate::routines::*;
use crate::sim_cmd::{write_sim_data, SimArgs};
use vamp_em::metrics::mse_db;
use vamp_em::*;

#[derive(Args, Debug)]
pub struct DemoArgs {
    #[command(flatten)]
    pub sim: SimArgs,

    #[command(flatten)]
    pub solver: SolverArgs,

    /// initial guess of the sparsity ratio for EM-VAMP
    #[arg(long, default_value_t = 0.5)]
    pub init_sparse_rat: f64,

    /// initial guess of the SNR (dB) for EM-VAMP
    #[arg(long, default_value_t = 10.0)]
    pub init_snr: f64,

    /// variance of the zero component of the mixture
    #[arg(long, default_value_t = 1e-10)]
    pub zero_var: f64,

    /// also write the simulated x0, A, y
    #[arg(long)]
    pub save_data: bool,

    /// output file header
    #[arg(short, long, required = true)]
    pub out: Box<str>,
}

/// Runs oracle VAMP (true prior and noise, no tuning) and EM-VAMP
/// (mismatched initial guesses, tuning on) on the same simulated data
/// and writes both MSE curves.
pub fn run_demo(args: &DemoArgs) -> anyhow::Result<()> {
    let sim = args.sim.to_sim();
    let data = sim.generate()?;

    if args.save_data {
        write_sim_data(&sim, &data, &args.out)?;
    }

    let mut solver_args = args.solver.clone();
    if !solver_args.hist.iter().any(|h| h.eq_ignore_ascii_case("zhat")) {
        solver_args.hist.push("zhat".to_string());
    }

    ///////////////////
    // oracle VAMP   //
    ///////////////////

    info!("oracle VAMP");

    let oracle_lik = LinearAwgnOptions {
        wvar_init: data.wvar.max(1e-12),
        map_est: args.solver.map,
        tune_wvar: false,
        wvar_min: 1e-12,
    };
    let oracle_gmm = GmmOptions {
        zvarmin: args.zero_var,
        tune_gmm: false,
        fix_means: false,
    };
    let mut oracle = build_solver(
        data.a.clone(),
        data.y.clone(),
        sim.true_prior(args.zero_var)?,
        oracle_gmm,
        oracle_lik,
        &solver_args,
    )?;
    oracle.run()?;
    let oracle_summary = RunSummary::from_solver(&oracle, Some(&data.x0))?;

    ///////////////////
    // EM-VAMP       //
    ///////////////////

    info!("EM-VAMP");

    let mm = data.y.nrows() as f64;
    let ntot = data.y.len() as f64;
    let ysq = data.y.norm_squared();

    // match the observed energy: |y|^2 ≈ |A|_F^2 ρ xvar ncol
    let xvar_init = ysq / (data.a.norm_squared() * args.init_sparse_rat * sim.ncol as f64);
    let em_prior = GmmParams::bernoulli_gauss(args.init_sparse_rat, 0.0, xvar_init, 1e-4)?;
    let em_gmm = GmmOptions {
        zvarmin: args.zero_var,
        tune_gmm: true,
        fix_means: true,
    };
    let em_lik = LinearAwgnOptions {
        wvar_init: ysq / ntot / (10f64.powf(args.init_snr / 10.0) + 1.0),
        map_est: args.solver.map,
        tune_wvar: true,
        wvar_min: 1e-12,
    };
    info!("m = {}, initial xvar = {:.3}", mm, xvar_init);

    let mut em = build_solver(
        data.a.clone(),
        data.y.clone(),
        em_prior,
        em_gmm,
        em_lik,
        &solver_args,
    )?;
    em.run()?;
    let em_summary = RunSummary::from_solver(&em, Some(&data.x0))?;

    ///////////////////
    // report        //
    ///////////////////

    let oracle_curve = oracle_summary.mse_db.clone().unwrap_or_default();
    let em_curve = em_summary.mse_db.clone().unwrap_or_default();

    info!(
        "final MSE: oracle {:.3} dB, EM {:.3} dB",
        mse_db(oracle.zhat(), &data.x0)?,
        mse_db(em.zhat(), &data.x0)?
    );
    info!("true noise variance {:.4e}, learned {:?}", data.wvar, em.lik().wvar().as_slice());

    mkdir(&args.out)?;
    write_curves(
        &["oracle", "em"],
        &[oracle_curve, em_curve],
        &(args.out.to_string() + ".mse.tsv"),
    )?;
    write_json(&oracle_summary, &(args.out.to_string() + ".oracle.json"))?;
    write_json(&em_summary, &(args.out.to_string() + ".em.json"))?;

    info!("done");
    Ok(())
}
