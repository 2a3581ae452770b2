// lib.rs - runparams library root

//! # runparams - Launch-argument reconciliation for training and eval runs
//!
//! This library builds the command-line surface used to launch a model run on
//! CPU, GPU or a CSX system, and reconciles what the user typed with the
//! `runconfig` section of a YAML params file and optional site-wide defaults.
//!
//! ## Features
//!
//! - **Per-device schemas**: general, GPU, CSX and execution-strategy options
//! - **Contributed options**: model code can register extra flags per device
//! - **Precedence**: command line, then params file, then sysadmin defaults
//! - **Two-pass validation**: the merged config is rebuilt into a command line
//!   and checked by a strict parser before it is returned
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use runparams::prelude::*;
//!
//! let report = LaunchContext::new()
//!     .with_run_dir("/tmp/run")
//!     .with_sysadmin_defaults_from_env()
//!     .launch(["CSX", "weight_streaming", "-p", "params.yaml", "-m", "train"])?;
//!
//! for warning in &report.warnings {
//!     eprintln!("{}", warning);
//! }
//! # Ok::<(), runparams::LaunchError>(())
//! ```

pub mod cli;
pub mod core;
pub mod error;
pub mod params;

// Convenience prelude for common imports
pub mod prelude {
    pub use crate::cli::{ArgFragment, DeviceKey, DeviceSelector, ExtraArgs};
    pub use crate::cli::{OptionSpec, ParsePass, ScalarKind};
    pub use crate::core::{discard_params, get_params_from_args};
    pub use crate::core::{LaunchContext, LaunchReport, LaunchWarning};
    pub use crate::error::{LaunchError, Result};
    pub use crate::params::{read_params_file, write_params, Params};
}

// Re-export main types at the root level for convenience
pub use cli::{DeviceSelector, ExtraArgs, LaunchParser};
pub use core::{LaunchContext, LaunchReport, LaunchWarning};
pub use error::LaunchError;
pub use params::Params;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn get_info() -> String {
    format!(
        "runparams v{} - Launch-argument reconciliation for model runs",
        VERSION
    )
}
