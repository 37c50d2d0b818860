mod common;
mod demo_cmd;
mod fit_cmd;
mod routines;
mod sim_cmd;

use demo_cmd::*;
use fit_cmd::*;
use sim_cmd::*;

use crate::common::*;

/// Sparse linear inverse problems by EM-tuned vector approximate message passing
#[derive(Parser)]
#[command(name = "lentil", version, about, long_about = None, term_width = 80)]
struct Cli {
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a sparse linear inverse problem y = A x0 + w
    Sim(SimCmdArgs),

    #[command(
        about = "Estimate x from y = A x + w by (EM-)VAMP",
        long_about = "Estimate x from y = A x + w in three stages:\n\
		      (1) Read the operator A and the observations y\n\
		      (2) Alternate a Gaussian-mixture denoiser and an LMMSE step\n\
		      (3) Write the estimate, learned parameters and history.\n"
    )]
    Fit(FitArgs),

    /// Compare oracle VAMP and EM-VAMP MSE curves on simulated data
    Demo(DemoArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match &cli.commands {
        Commands::Sim(args) => {
            run_sim(args)?;
        }
        Commands::Fit(args) => {
            run_fit(args)?;
        }
        Commands::Demo(args) => {
            run_demo(args)?;
        }
    }

    Ok(())
}
