use std::process::ExitCode;

use clap::Parser;
use eject::config::SYSTEM_PATHS;
use eject::drive::BlockDeviceOpener;
use eject::mtab::StatIdentity;
use eject::umount::ForkRunner;
use eject::{Cli, EjectOptions, Outcome, System};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let opts = EjectOptions::from(&cli);
    init_logging(opts.verbose);

    let system = System {
        paths: &SYSTEM_PATHS,
        drives: &BlockDeviceOpener,
        runner: &ForkRunner,
        identity: &StatIdentity,
    };

    match eject::run(&opts, &system) {
        Ok(Outcome::DefaultDevice(device)) => {
            println!("eject: default device: '{device}'");
            ExitCode::SUCCESS
        }
        Ok(Outcome::Found(device)) => {
            println!("eject: device is '{}'", device.display());
            ExitCode::SUCCESS
        }
        Ok(outcome) => {
            tracing::debug!("done: {outcome:?}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let err = anyhow::Error::from(err);
            eprintln!("eject: {err:#}");
            ExitCode::FAILURE
        }
    }
}
