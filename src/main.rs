// main.rs - CLI entry point

use std::env;
use std::io;

use tracing_subscriber::EnvFilter;

use runparams::core::get_params_from_args;
use runparams::params::write_params;
use runparams::{ExtraArgs, LaunchError};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run_main() {
        match e {
            LaunchError::Usage(err) => err.exit(),
            other => {
                eprintln!("❌ ERROR: {}", other);
                std::process::exit(other.exit_code());
            }
        }
    }
}

fn run_main() -> Result<(), LaunchError> {
    let run_dir = env::current_dir().map_err(|e| {
        LaunchError::Config(format!("Could not determine the working directory: {}", e))
    })?;

    let params = get_params_from_args(run_dir, ExtraArgs::default)?;
    write_params(io::stdout().lock(), &params)
}
