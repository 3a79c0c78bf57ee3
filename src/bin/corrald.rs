use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;

use corral::config::Config;
use corral::daemon::{self, Daemon, PidFile};

#[derive(Parser)]
#[command(author, version, about = "corral container supervisor daemon")]
struct Args {
    /// JSON configuration file; built-in defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the spec store directory
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Override the pid file path
    #[arg(long)]
    pid_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dir) = args.store_dir {
        config.store_dir = dir;
    }
    if let Some(path) = args.pid_file {
        config.pid_file = path;
    }

    let pid_file = PidFile::new(&config.pid_file, "corrald");
    if pid_file.running() {
        bail!("corrald is already running");
    }
    pid_file.save()?;

    daemon::install_term_handlers()?;
    let engine = Daemon::start(config)?;

    daemon::wait_for_shutdown(Duration::from_millis(100));

    engine.shutdown();
    pid_file.remove();
    Ok(())
}
