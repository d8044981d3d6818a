use anyhow::Context;
use clap::Parser;
use sched_bench::{cli::Args, config::Config, runner::Runner};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = Config::from(Args::parse());
    let runner = Runner::new(config).context("failed to prepare benchmarks")?;

    let stdout = std::io::stdout();
    runner
        .run(&mut stdout.lock())
        .context("failed to write results")?;
    Ok(())
}
