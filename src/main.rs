use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod create;
mod error;
mod listing;
mod lock;
mod manifest;
mod name;
mod paths;
mod prune;
mod store;
mod templates;
mod util;
mod vagrant;
mod workflow;

use cli::{Command, RootArgs};
use config::{Config, ConfigOverrides};
use error::BoxError;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(args: RootArgs) -> Result<()> {
    let config = Config::resolve(&ConfigOverrides {
        config_path: args.config,
        install_dir: args.install_dir,
        public_base_url: args.public_url,
    })?;
    tracing::debug!(?config, "resolved config");

    match args.command {
        Command::Create(create) => workflow::run_create(&config, create),
        Command::Prune(prune) => workflow::run_prune(&config, prune),
        Command::List(list) => workflow::run_list(&config, list),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("boxman={level}")));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<BoxError>())
        .map_or(1, BoxError::exit_code)
}
