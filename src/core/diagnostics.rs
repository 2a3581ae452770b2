// diagnostics.rs - Non-fatal findings collected during a launch

use std::fmt::{self, Display};

use tracing::{info, warn};

/// Something worth telling the user that does not stop the launch.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchWarning {
    /// Params-file options that do not apply to the selected target.
    DroppedOptions { target: String, keys: Vec<String> },
    /// `multireplica` was requested outside of training.
    MultireplicaDisabled { mode: String },
    /// An explicit command-line value replaced a different file value.
    CliOverride {
        key: String,
        file_value: String,
        cli_value: String,
    },
}

impl Display for LaunchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchWarning::DroppedOptions { target, keys } => write!(
                f,
                "User specified a {target} run, but the following non-{target} configurations \
                 were found in params file: {keys:?}. Ignoring these arguments and continuing."
            ),
            LaunchWarning::MultireplicaDisabled { mode } => write!(
                f,
                "Multireplica is only supported in `train` mode. Disabling it for {mode} mode."
            ),
            LaunchWarning::CliOverride {
                key,
                file_value,
                cli_value,
            } => write!(
                f,
                "Command-line value {cli_value} for '{key}' overrides params file value {file_value}"
            ),
        }
    }
}

/// Ordered list of warnings, each logged as it is recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    warnings: Vec<LaunchWarning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, warning: LaunchWarning) {
        match &warning {
            LaunchWarning::DroppedOptions { .. } => info!("{}", warning),
            _ => warn!("{}", warning),
        }
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[LaunchWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<LaunchWarning> {
        self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}
