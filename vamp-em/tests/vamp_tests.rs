use vamp_em::metrics::{mse_curve, mse_db};
use vamp_em::sim::{SimData, SparseLinearSim};
use vamp_em::*;

type Mat = nalgebra::DMatrix<f64>;

fn small_problem(ncol: usize, snr_db: f64) -> anyhow::Result<(SparseLinearSim, SimData)> {
    let sim = SparseLinearSim {
        nz0: 500,
        nz1: 250,
        ncol,
        sparse_rat: 0.1,
        snr_db,
        seed: 2024,
        ..Default::default()
    };
    let data = sim.generate()?;
    Ok((sim, data))
}

fn oracle_solver(
    sim: &SparseLinearSim,
    data: &SimData,
    options: VampOptions,
) -> anyhow::Result<Vamp<GmmPrior, LinearAwgn, MsgHandler>> {
    let shape = (sim.nz0, sim.ncol);
    let prior = GmmPrior::new(shape, sim.true_prior(1e-10)?, GmmOptions::default())?;
    let lik = LinearAwgn::new(
        data.a.clone(),
        data.y.clone(),
        LinearAwgnOptions {
            wvar_init: data.wvar.max(1e-12),
            ..Default::default()
        },
    )?;
    let msg_hdl = MsgHandler::new(shape, MsgOptions::default())?;
    Vamp::new(prior, lik, msg_hdl, options)
}

#[test]
fn oracle_vamp_recovers_sparse_signal() -> anyhow::Result<()> {
    let (sim, data) = small_problem(2, 40.0)?;
    let mut solver = oracle_solver(
        &sim,
        &data,
        VampOptions {
            nit: 30,
            hist_list: vec![HistField::Zhat, HistField::Rvar0],
            ..Default::default()
        },
    )?;
    solver.run()?;

    assert_eq!(solver.num_iter(), 30);

    let zhat_hist = solver.hist(HistField::Zhat).expect("zhat recorded");
    assert_eq!(zhat_hist.len(), 30);
    assert_eq!(solver.hist(HistField::Rvar0).map(|h| h.len()), Some(30));
    assert!(solver.hist(HistField::Cost).is_none());

    let curve = mse_curve(zhat_hist, &data.x0)?;
    let last = *curve.last().expect("non-empty");
    assert!(last < -25.0, "final MSE {} dB", last);
    assert!(last < curve[0]);

    for j in 0..sim.ncol {
        let zj = Mat::from_column_slice(sim.nz0, 1, solver.zhat().column(j).as_slice());
        let xj = Mat::from_column_slice(sim.nz0, 1, data.x0.column(j).as_slice());
        assert!(mse_db(&zj, &xj)? < -25.0);
    }
    Ok(())
}

#[test]
fn em_vamp_learns_prior_and_noise() -> anyhow::Result<()> {
    let (sim, data) = small_problem(1, 40.0)?;
    let shape = (sim.nz0, sim.ncol);

    let init = GmmParams::bernoulli_gauss(0.3, 0.0, 3.0, 1e-4)?;
    let prior = GmmPrior::new(
        shape,
        init,
        GmmOptions {
            zvarmin: 1e-10,
            tune_gmm: true,
            fix_means: true,
        },
    )?;

    let ysq = data.y.norm_squared() / sim.nz1 as f64;
    let lik = LinearAwgn::new(
        data.a.clone(),
        data.y.clone(),
        LinearAwgnOptions {
            wvar_init: ysq * 0.1,
            tune_wvar: true,
            ..Default::default()
        },
    )?;
    let msg_hdl = MsgHandler::new(shape, MsgOptions::default())?;

    let mut solver = Vamp::new(
        prior,
        lik,
        msg_hdl,
        VampOptions {
            nit: 50,
            hist_list: vec![HistField::Zhat, HistField::Params, HistField::Cost],
            ..Default::default()
        },
    )?;
    solver.run()?;

    let curve = mse_curve(solver.hist_by_name("zhat")?, &data.x0)?;
    let last = *curve.last().expect("non-empty");
    assert!(last < -15.0, "final MSE {} dB", last);

    let wvar_hat = solver.lik().wvar()[0];
    let ratio = wvar_hat / data.wvar;
    assert!(ratio > 0.2 && ratio < 5.0, "wvar ratio {}", ratio);

    let probc = &solver.prior().params().probc;
    assert!((probc[1] - sim.sparse_rat).abs() < 0.1, "probc {:?}", probc);

    let params = solver.hist(HistField::Params).expect("params recorded");
    let names: Vec<&str> = params[0]
        .as_params()
        .expect("params")
        .iter()
        .map(|p| p.name.as_ref())
        .collect();
    assert_eq!(names, vec!["probc", "meanc", "varc", "wvar"]);

    let costs = solver.hist(HistField::Cost).expect("cost recorded");
    assert!(costs.iter().all(|c| c.as_scalar().is_some_and(f64::is_finite)));
    Ok(())
}

#[test]
fn high_snr_reaches_low_error() -> anyhow::Result<()> {
    let (sim, data) = small_problem(1, 60.0)?;
    let mut solver = oracle_solver(
        &sim,
        &data,
        VampOptions {
            nit: 50,
            ..Default::default()
        },
    )?;
    solver.run()?;
    let mse = mse_db(solver.zhat(), &data.x0)?;
    assert!(mse < -35.0, "MSE {} dB", mse);
    Ok(())
}

#[test]
fn noiseless_reaches_numerical_floor() -> anyhow::Result<()> {
    let (sim, data) = small_problem(1, f64::INFINITY)?;
    assert_eq!(data.wvar, 0.0);

    let mut solver = oracle_solver(
        &sim,
        &data,
        VampOptions {
            nit: 50,
            hist_list: vec![HistField::Zhat],
            ..Default::default()
        },
    )?;
    solver.run()?;

    let mse = mse_db(solver.zhat(), &data.x0)?;
    assert!(mse < -100.0, "MSE {} dB", mse);
    assert!(mse >= metrics::MSE_DB_FLOOR);

    let curve = mse_curve(solver.hist_by_name("zhat")?, &data.x0)?;
    assert!(curve.iter().all(|x| x.is_finite()));
    Ok(())
}

#[test]
fn zero_iterations_keep_requested_fields() -> anyhow::Result<()> {
    let (sim, data) = small_problem(1, 30.0)?;
    let mut solver = oracle_solver(
        &sim,
        &data,
        VampOptions {
            nit: 0,
            hist_list: vec![HistField::Zhat, HistField::Params],
            ..Default::default()
        },
    )?;
    solver.run()?;

    assert_eq!(solver.num_iter(), 0);
    assert!(solver.hist_by_name("zhat")?.is_empty());
    assert_eq!(solver.hist(HistField::Params).map(|h| h.len()), Some(0));
    assert!(solver.hist_by_name("cost").is_err());
    assert!(mse_curve(solver.hist_by_name("zhat")?, &data.x0)?.is_empty());

    // the initial estimate is the prior's
    assert_eq!(solver.zhat().shape(), (sim.nz0, 1));
    Ok(())
}

#[test]
fn estimators_are_usable_through_the_crate_root() -> anyhow::Result<()> {
    let (sim, data) = small_problem(1, 30.0)?;
    let shape = (sim.nz0, sim.ncol);

    let mut lik = LinearAwgn::new(data.a.clone(), data.y.clone(), LinearAwgnOptions::default())?;
    let init: EstimOut = lik.est_init()?;
    assert_eq!(lik.shape(), shape);

    let msg_hdl = MsgHandler::new(shape, MsgOptions::default())?;
    let prior = GmmPrior::new(shape, sim.true_prior(1e-10)?, GmmOptions::default())?;
    let prior_init = prior.est_init()?;

    let out = lik.est(&prior_init.zhat, &prior_init.zhatvar)?;
    let msg: Message = msg_hdl.msg_sub(
        &out.zhat,
        &out.zhatvar,
        &prior_init.zhat,
        &prior_init.zhatvar,
        None,
    )?;
    assert_eq!(msg.r.shape(), init.zhat.shape());
    assert!(msg.rvar.iter().all(|&v| v > 0.0));
    Ok(())
}

#[test]
fn stops_early_when_converged() -> anyhow::Result<()> {
    let (sim, data) = small_problem(1, 40.0)?;
    let mut solver = oracle_solver(
        &sim,
        &data,
        VampOptions {
            nit: 200,
            conv_tol: Some(1e-6),
            hist_list: vec![HistField::Zhatvar],
            ..Default::default()
        },
    )?;
    solver.run()?;
    assert!(solver.converged());
    assert!(solver.num_iter() < 200);
    assert_eq!(
        solver.hist(HistField::Zhatvar).map(|h| h.len()),
        Some(solver.num_iter())
    );
    Ok(())
}

#[test]
fn mismatched_shapes_are_rejected() -> anyhow::Result<()> {
    let (sim, data) = small_problem(1, 30.0)?;
    let prior = GmmPrior::new((sim.nz0, 2), sim.true_prior(1e-10)?, GmmOptions::default())?;
    let lik = LinearAwgn::new(data.a, data.y, LinearAwgnOptions::default())?;
    let msg_hdl = MsgHandler::new((sim.nz0, 2), MsgOptions::default())?;
    assert!(Vamp::new(prior, lik, msg_hdl, VampOptions::default()).is_err());
    Ok(())
}
