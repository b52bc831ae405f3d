pub mod clock;
pub mod error;
pub mod recording;
pub mod settings;
pub mod window;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::clock::{Clock, SystemClock};
use crate::recording::SchedulerExit;
use crate::settings::Cli;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn run() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli
        .into_config(SystemClock.now())
        .context("invalid recording settings")?;

    settings::ensure_output_dir(&config.output_directory)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let exit = runtime.block_on(recording::record_until_finished(config))?;
    if exit == SchedulerExit::StopRequested {
        tracing::info!("Recorder stopped on request");
    }

    Ok(())
}
