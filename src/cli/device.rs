// device.rs - Target devices and execution strategies

use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::{LaunchError, Result};

/// Execution backend for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceType {
    Cpu,
    Gpu,
    Csx,
}

impl DeviceType {
    pub const ALL: [DeviceType; 3] = [DeviceType::Cpu, DeviceType::Gpu, DeviceType::Csx];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Cpu => "CPU",
            DeviceType::Gpu => "GPU",
            DeviceType::Csx => "CSX",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DeviceType::Cpu => "Run on CPU",
            DeviceType::Gpu => "Run on GPU",
            DeviceType::Csx => "Run on Cerebras System",
        }
    }
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CPU" => Ok(DeviceType::Cpu),
            "GPU" => Ok(DeviceType::Gpu),
            "CSX" => Ok(DeviceType::Csx),
            _ => Err(format!("Unknown device type '{}'. Available: CPU, GPU, CSX", s)),
        }
    }
}

/// How a model is executed on the CSX system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExecutionStrategy {
    /// Layer-pipelined execution
    Pipeline,
    /// Weights streamed to compute servers
    WeightStreaming,
}

impl ExecutionStrategy {
    pub const ALL: [ExecutionStrategy; 2] =
        [ExecutionStrategy::Pipeline, ExecutionStrategy::WeightStreaming];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::Pipeline => "pipeline",
            ExecutionStrategy::WeightStreaming => "weight_streaming",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExecutionStrategy::Pipeline => {
                "Run the pipeline execution strategy on the Cerebras System."
            }
            ExecutionStrategy::WeightStreaming => {
                "Run the weight-streaming execution strategy on the Cerebras System."
            }
        }
    }
}

impl Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pipeline" => Ok(ExecutionStrategy::Pipeline),
            "weight_streaming" => Ok(ExecutionStrategy::WeightStreaming),
            _ => Err(format!(
                "Unknown execution strategy '{}'. Available: pipeline, weight_streaming",
                s
            )),
        }
    }
}

/// Key under which externally contributed options are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceKey {
    /// Applies to every device schema
    Any,
    Cpu,
    Gpu,
    Pipeline,
    WeightStreaming,
}

impl DeviceKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKey::Any => "any",
            DeviceKey::Cpu => "CPU",
            DeviceKey::Gpu => "GPU",
            DeviceKey::Pipeline => "pipeline",
            DeviceKey::WeightStreaming => "weight_streaming",
        }
    }

    pub fn matches(&self, other: DeviceKey) -> bool {
        *self == DeviceKey::Any || *self == other
    }
}

impl Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated (device, strategy) pair. The strategy is present exactly when
/// the device is CSX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceSelector {
    device: DeviceType,
    strategy: Option<ExecutionStrategy>,
}

impl DeviceSelector {
    /// The four valid combinations, in the order their schemas are walked.
    pub const ALL: [DeviceSelector; 4] = [
        DeviceSelector::CPU,
        DeviceSelector::GPU,
        DeviceSelector::PIPELINE,
        DeviceSelector::WEIGHT_STREAMING,
    ];

    pub const CPU: DeviceSelector = DeviceSelector {
        device: DeviceType::Cpu,
        strategy: None,
    };
    pub const GPU: DeviceSelector = DeviceSelector {
        device: DeviceType::Gpu,
        strategy: None,
    };
    pub const PIPELINE: DeviceSelector = DeviceSelector {
        device: DeviceType::Csx,
        strategy: Some(ExecutionStrategy::Pipeline),
    };
    pub const WEIGHT_STREAMING: DeviceSelector = DeviceSelector {
        device: DeviceType::Csx,
        strategy: Some(ExecutionStrategy::WeightStreaming),
    };

    pub fn new(device: DeviceType, strategy: Option<ExecutionStrategy>) -> Result<Self> {
        match (device, strategy) {
            (DeviceType::Cpu | DeviceType::Gpu, None) | (DeviceType::Csx, Some(_)) => {
                Ok(Self { device, strategy })
            }
            _ => Err(LaunchError::InvalidSelector {
                device: device.to_string(),
                strategy: strategy.map_or("None".to_string(), |s| s.to_string()),
            }),
        }
    }

    /// Build a selector from the names used on the command line.
    pub fn from_names(device: &str, strategy: Option<&str>) -> Result<Self> {
        let invalid = || LaunchError::InvalidSelector {
            device: device.to_string(),
            strategy: strategy.unwrap_or("None").to_string(),
        };
        let device_type = device.parse::<DeviceType>().map_err(|_| invalid())?;
        let strategy = match strategy {
            Some(name) => Some(name.parse::<ExecutionStrategy>().map_err(|_| invalid())?),
            None => None,
        };
        Self::new(device_type, strategy).map_err(|_| invalid())
    }

    pub fn device(&self) -> DeviceType {
        self.device
    }

    pub fn strategy(&self) -> Option<ExecutionStrategy> {
        self.strategy
    }

    /// The fragment key that selects options for this schema.
    pub fn key(&self) -> DeviceKey {
        match (self.device, self.strategy) {
            (DeviceType::Cpu, _) => DeviceKey::Cpu,
            (DeviceType::Gpu, _) => DeviceKey::Gpu,
            (DeviceType::Csx, Some(ExecutionStrategy::Pipeline)) => DeviceKey::Pipeline,
            (DeviceType::Csx, _) => DeviceKey::WeightStreaming,
        }
    }

    /// Leading command-line tokens that select this target.
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens = vec![self.device.to_string()];
        if let Some(strategy) = self.strategy {
            tokens.push(strategy.to_string());
        }
        tokens
    }
}

impl Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.strategy {
            Some(strategy) => write!(f, "{} {}", self.device, strategy),
            None => write!(f, "{}", self.device),
        }
    }
}
