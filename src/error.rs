// error.rs - Error types for launch-argument reconciliation

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    /// Malformed or missing command-line arguments, invalid choices, or a
    /// help/version request. Reported by clap.
    #[error(transparent)]
    Usage(#[from] clap::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid entry for device {device} and/or execution strategy {strategy}")]
    InvalidSelector { device: String, strategy: String },

    #[error("Failed to read params file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse params file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize params: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("Failed to create model directory '{}': {source}", path.display())]
    ModelDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The command line rebuilt from the merged params was rejected by the
    /// strict parser.
    #[error(
        "A mismatch was detected between your params file and specified command-line arguments \
         (rebuilt command: {}): {source}",
        command.join(" ")
    )]
    Inconsistent {
        command: Vec<String>,
        source: clap::Error,
    },

    #[error("Invalid option schema: {0}")]
    Schema(String),
}

impl LaunchError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::Usage(e) => e.exit_code(),
            LaunchError::Inconsistent { source, .. } => source.exit_code(),
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, LaunchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_exit_codes() {
        let usage = LaunchError::from(clap::Error::new(ErrorKind::InvalidValue));
        assert_eq!(usage.exit_code(), 2);

        let inconsistent = LaunchError::Inconsistent {
            command: vec!["CPU".to_string(), "--mode".to_string(), "train".to_string()],
            source: clap::Error::new(ErrorKind::ArgumentConflict),
        };
        assert_eq!(inconsistent.exit_code(), 2);
        assert!(inconsistent.to_string().contains("CPU --mode train"));

        assert_eq!(LaunchError::Config("bad".to_string()).exit_code(), 1);
    }

    #[test]
    fn test_invalid_selector_message() {
        let err = LaunchError::InvalidSelector {
            device: "GPU".to_string(),
            strategy: "pipeline".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid entry for device GPU and/or execution strategy pipeline"
        );
    }
}
