// mod.rs - Core reconciliation logic

pub mod diagnostics;
pub mod disallow;
pub mod launch;
pub mod merge;
pub mod rebuild;

// Re-export main types for convenience
pub use diagnostics::{Diagnostics, LaunchWarning};
pub use disallow::{assemble_disallowlist, discard_params, params_template, Disallowlist};
pub use launch::{
    get_params_from_args, LaunchContext, LaunchReport, DEFAULT_BIN_NAME, SYSADMIN_DEFAULTS_ENV,
};
pub use merge::{
    concat_path_lists, finalize_runconfig, overlay_confirmed_args, update_params_from_args,
};
pub use rebuild::rebuild_command;
