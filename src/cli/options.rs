// options.rs - Declarative option descriptors and the built-in catalog

use serde_yaml::Value;

use crate::cli::device::DeviceKey;

/// Valid values for `--mode`.
pub const MODES: [&str; 4] = ["train", "eval", "train_and_eval", "eval_all"];

/// Valid values for `--dist_backend`.
pub const DIST_BACKENDS: [&str; 3] = ["nccl", "mpi", "gloo"];

pub const REQUIRED_HEADING: &str = "Required Arguments";
pub const GENERAL_HEADING: &str = "Optional Arguments, All Devices";
pub const GPU_HEADING: &str = "Optional Arguments, GPU Specific";
pub const CSX_HEADING: &str = "Optional Arguments, CSX Specific";
pub const WEIGHT_STREAMING_HEADING: &str =
    "Optional Arguments, Weightstreaming Execution Strategy";
pub const PIPELINE_HEADING: &str = "Optional Arguments, Pipeline Execution Strategy";
pub const USER_DEFINED_HEADING: &str = "User-Defined and/or Model Specific Arguments";

/// Mutual-exclusion group of the CSX workflow switches.
pub const CSX_WORKFLOW_GROUP: &str = "csx_workflow";

/// Which parse an option schema is built for.
///
/// The first parse reads the real command line: nothing is defaulted so that
/// the params file can fill any gap. The second parse re-validates the
/// merged params: defaults are injected and the params file is no longer
/// needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParsePass {
    First,
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Str,
    Int,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    /// Present or absent, no value token
    Flag,
    /// Exactly one value
    Value(ScalarKind),
    /// One or more values
    List(ScalarKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    Optional,
    /// Required on the real command line only
    FirstPass,
    Always,
}

impl Requirement {
    pub fn is_required(self, pass: ParsePass) -> bool {
        match self {
            Requirement::Optional => false,
            Requirement::FirstPass => pass == ParsePass::First,
            Requirement::Always => true,
        }
    }
}

/// One recognized command-line option.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    name: String,
    short: Option<char>,
    help: String,
    heading: Option<String>,
    kind: OptionKind,
    choices: Vec<String>,
    default: Option<Value>,
    requirement: Requirement,
    exclusive_group: Option<String>,
    targets: Vec<DeviceKey>,
}

impl OptionSpec {
    fn with_kind(name: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            short: None,
            help: String::new(),
            heading: None,
            kind,
            choices: Vec::new(),
            default: None,
            requirement: Requirement::Optional,
            exclusive_group: None,
            targets: vec![DeviceKey::Any],
        }
    }

    pub fn flag(name: impl Into<String>) -> Self {
        Self::with_kind(name, OptionKind::Flag)
    }

    pub fn value(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self::with_kind(name, OptionKind::Value(kind))
    }

    pub fn list(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self::with_kind(name, OptionKind::List(kind))
    }

    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    /// Default applied by the second parse only.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn requirement(mut self, requirement: Requirement) -> Self {
        self.requirement = requirement;
        self
    }

    pub fn exclusive(mut self, group: impl Into<String>) -> Self {
        self.exclusive_group = Some(group.into());
        self
    }

    pub fn targets(mut self, targets: &[DeviceKey]) -> Self {
        self.targets = targets.to_vec();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_flag(&self) -> Option<char> {
        self.short
    }

    pub fn help_text(&self) -> &str {
        &self.help
    }

    pub fn help_heading(&self) -> Option<&str> {
        self.heading.as_deref()
    }

    pub fn kind(&self) -> OptionKind {
        self.kind
    }

    pub fn choice_values(&self) -> &[String] {
        &self.choices
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn requirement_policy(&self) -> Requirement {
        self.requirement
    }

    pub fn exclusive_group(&self) -> Option<&str> {
        self.exclusive_group.as_deref()
    }

    pub fn target_keys(&self) -> &[DeviceKey] {
        &self.targets
    }

    pub fn applies_to(&self, key: DeviceKey) -> bool {
        self.targets.iter().any(|target| target.matches(key))
    }

    pub fn is_required(&self, pass: ParsePass) -> bool {
        self.requirement.is_required(pass)
    }

    /// Value this option takes when it is not given on the command line.
    pub fn default_for(&self, pass: ParsePass) -> Value {
        match pass {
            ParsePass::First => Value::Null,
            ParsePass::Second => self.default.clone().unwrap_or(Value::Null),
        }
    }
}

const CSX_TARGETS: &[DeviceKey] = &[DeviceKey::Pipeline, DeviceKey::WeightStreaming];

/// Options shared by every target.
pub fn general_options() -> Vec<OptionSpec> {
    vec![
        OptionSpec::value("params", ScalarKind::Str)
            .short('p')
            .help("Path to .yaml file with model parameters")
            .heading(REQUIRED_HEADING)
            .requirement(Requirement::FirstPass),
        OptionSpec::value("mode", ScalarKind::Str)
            .short('m')
            .help(
                "Select mode of execution for the run. Can choose between train, eval, \
                 train_and_eval or eval_all.",
            )
            .heading(REQUIRED_HEADING)
            .choices(MODES)
            .requirement(Requirement::Always),
        OptionSpec::value("model_dir", ScalarKind::Str)
            .short('o')
            .help("Model directory where checkpoints will be written.")
            .heading(GENERAL_HEADING),
        OptionSpec::value("checkpoint_path", ScalarKind::Str)
            .help("Checkpoint to initialize weights from.")
            .heading(GENERAL_HEADING),
        OptionSpec::flag("is_pretrained_checkpoint")
            .help(
                "Flag indicating that the provided checkpoint is from a pre-training run. \
                 If set, training will begin from step 0 after loading the matching weights \
                 from the checkpoint and ignoring the optimizer state if present in the \
                 checkpoint. Defaults to False.",
            )
            .heading(GENERAL_HEADING)
            .default_value(false),
        OptionSpec::value("logging", ScalarKind::Str)
            .help("Specifies the default logging level. Defaults to INFO.")
            .heading(GENERAL_HEADING),
        OptionSpec::value("max_steps", ScalarKind::Int)
            .help("Specifies the maximum number of steps to run.")
            .heading(GENERAL_HEADING),
        OptionSpec::value("eval_steps", ScalarKind::Int)
            .help("Specifies the number of steps to run for eval.")
            .heading(GENERAL_HEADING),
    ]
}

pub fn gpu_options() -> Vec<OptionSpec> {
    vec![
        OptionSpec::value("dist_addr", ScalarKind::Str)
            .help(
                "To init master_addr and master_port of distributed. \
                 Defaults to localhost:8888.",
            )
            .default_value("localhost:8888"),
        OptionSpec::value("dist_backend", ScalarKind::Str)
            .help("Distributed backend engine. Defaults to nccl.")
            .choices(DIST_BACKENDS)
            .default_value("nccl"),
        OptionSpec::value("init_method", ScalarKind::Str)
            .help("URL specifying how to initialize the process group. Defaults to env://")
            .default_value("env://"),
    ]
    .into_iter()
    .map(|spec| spec.heading(GPU_HEADING).targets(&[DeviceKey::Gpu]))
    .collect()
}

/// Options shared by both CSX execution strategies.
pub fn csx_options() -> Vec<OptionSpec> {
    vec![
        OptionSpec::flag("compile_only")
            .help("Enables compile only workflow. Defaults to None.")
            .exclusive(CSX_WORKFLOW_GROUP),
        OptionSpec::flag("validate_only")
            .help(
                "Enables validate only workflow. validate_only stops the compilation at \
                 ws_km stage for weight streaming mode. For pipeline mode, the compilation \
                 is stopped at the optimize_graph stage. Defaults to None.",
            )
            .exclusive(CSX_WORKFLOW_GROUP),
        OptionSpec::value("num_workers_per_csx", ScalarKind::Int)
            .help(
                "Number of workers to use for streaming inputs per CS node. If 0, a default \
                 value based on the model will be chosen. Defaults to 0.",
            )
            .default_value(0),
        OptionSpec::value("compile_dir", ScalarKind::Str)
            .short('c')
            .help("Compile directory where compile artifacts will be written."),
        OptionSpec::list("job_labels", ScalarKind::Str)
            .help("A list of equal-sign-separated key value pairs served as job labels."),
        OptionSpec::value("debug_args_path", ScalarKind::Str)
            .help("Path to debugs args file. Defaults to None."),
        OptionSpec::list("mount_dirs", ScalarKind::Str).help(
            "A list of paths to be mounted to the appliance containers. It should generally \
             contain path to the directory containing the Cerebras modelzoo.",
        ),
        OptionSpec::list("python_paths", ScalarKind::Str).help(
            "A list of paths to be exported into PYTHONPATH for worker containers. It should \
             generally contain path to the directory containing the Cerebras modelzoo, as well \
             as any external python packages needed by input workers.",
        ),
        OptionSpec::value("credentials_path", ScalarKind::Str).help(
            "Credentials for cluster access. Defaults to None. If None, the value from a \
             pre-configured location will be used if available.",
        ),
        OptionSpec::value("mgmt_address", ScalarKind::Str).help(
            "<host>:<port> for cluster management. Defaults to None. If None, the value from \
             a pre-configured location will be used if available.",
        ),
        OptionSpec::value("job_time_sec", ScalarKind::Int).help(
            "Time limit in seconds for the appliance jobs. When the time limit is hit, the \
             appliance jobs will be cancelled and the run will be terminated.",
        ),
        OptionSpec::flag("disable_version_check")
            .help("Disable version check for local experimentation and debugging")
            .default_value(false),
    ]
    .into_iter()
    .map(|spec| spec.heading(CSX_HEADING).targets(CSX_TARGETS))
    .collect()
}

pub fn weight_streaming_options() -> Vec<OptionSpec> {
    vec![
        OptionSpec::value("num_csx", ScalarKind::Int)
            .help("Number of CS nodes. Defaults to 1")
            .default_value(1),
        OptionSpec::value("num_wgt_servers", ScalarKind::Int).help(
            "Maximum number of weight servers to use in weight streaming execution strategy. \
             Defaults to None.",
        ),
        OptionSpec::value("num_act_servers", ScalarKind::Int)
            .help("Number of ACT server per device. Defaults to 1.")
            .default_value(1),
    ]
    .into_iter()
    .map(|spec| {
        spec.heading(WEIGHT_STREAMING_HEADING)
            .targets(&[DeviceKey::WeightStreaming])
    })
    .collect()
}

pub fn pipeline_options() -> Vec<OptionSpec> {
    vec![OptionSpec::flag("multireplica")
        .help("Enables multireplica mode. Defaults to None.")
        .heading(PIPELINE_HEADING)
        .targets(&[DeviceKey::Pipeline])]
}

/// Every built-in option, in help order.
pub fn builtin_options() -> Vec<OptionSpec> {
    let mut options = general_options();
    options.extend(gpu_options());
    options.extend(csx_options());
    options.extend(weight_streaming_options());
    options.extend(pipeline_options());
    options
}
