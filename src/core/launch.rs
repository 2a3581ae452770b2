// launch.rs - Two-pass reconciliation of command line and params file

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::{debug, error, info};

use crate::cli::{ExtraArgs, LaunchParser, ParsePass};
use crate::core::diagnostics::{Diagnostics, LaunchWarning};
use crate::core::disallow::assemble_disallowlist;
use crate::core::merge::{
    finalize_runconfig, overlay_confirmed_args, sysadmin_runconfig, sysadmin_sections,
    update_params_from_args,
};
use crate::core::rebuild::rebuild_command;
use crate::error::{LaunchError, Result};
use crate::params::{
    get_set, read_params_file, remove_keys, section_mut, update_defaults, Params, CONFIG_KEY,
    PARAMS_KEY, RUNCONFIG_KEY,
};

/// Environment variable naming the site-wide defaults file.
pub const SYSADMIN_DEFAULTS_ENV: &str = "CEREBRAS_WAFER_SCALE_CLUSTER_DEFAULTS";

pub const DEFAULT_BIN_NAME: &str = "runparams";

/// Outcome of a successful launch.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchReport {
    /// The full params mapping with its reconciled `runconfig` section.
    pub params: Params,
    pub warnings: Vec<LaunchWarning>,
    /// The synthetic command line that passed the strict parse.
    pub command: Vec<String>,
}

impl LaunchReport {
    pub fn runconfig(&self) -> Option<&Params> {
        self.params.get(RUNCONFIG_KEY).and_then(Value::as_mapping)
    }
}

/// Inputs of a launch other than the command line itself.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    bin_name: String,
    run_dir: Option<PathBuf>,
    sysadmin_defaults: Option<PathBuf>,
    extra: ExtraArgs,
}

impl Default for LaunchContext {
    fn default() -> Self {
        Self {
            bin_name: DEFAULT_BIN_NAME.to_string(),
            run_dir: None,
            sysadmin_defaults: None,
            extra: ExtraArgs::None,
        }
    }
}

impl LaunchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program name shown in usage and help.
    pub fn with_bin_name(mut self, name: impl Into<String>) -> Self {
        self.bin_name = name.into();
        self
    }

    /// Directory under which `model_dir` defaults to `<run_dir>/model_dir`.
    pub fn with_run_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run_dir = Some(dir.into());
        self
    }

    pub fn with_sysadmin_defaults(mut self, path: impl Into<PathBuf>) -> Self {
        self.sysadmin_defaults = Some(path.into());
        self
    }

    /// Read the sysadmin defaults path from the environment, if set.
    pub fn with_sysadmin_defaults_from_env(mut self) -> Self {
        if let Some(path) = env::var_os(SYSADMIN_DEFAULTS_ENV).filter(|p| !p.is_empty()) {
            debug!("Using sysadmin defaults from {}", SYSADMIN_DEFAULTS_ENV);
            self.sysadmin_defaults = Some(PathBuf::from(path));
        }
        self
    }

    /// Register model-specific options. The closure is called once, here.
    pub fn with_extra_args<F>(mut self, extra: F) -> Self
    where
        F: FnOnce() -> ExtraArgs,
    {
        self.extra = extra();
        if !self.extra.is_empty() {
            debug!("Registered model-specific options");
        }
        self
    }

    pub fn sysadmin_defaults(&self) -> Option<&Path> {
        self.sysadmin_defaults.as_deref()
    }

    /// Reconcile `args` (without the program name) with the params file
    /// they name.
    pub fn launch<I, T>(&self, args: I) -> Result<LaunchReport>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let first = LaunchParser::new(self.bin_name.as_str(), ParsePass::First, &self.extra)?;
        let raw = first.parse(args)?;
        info!("Preparing {} run", raw.selector);

        let (template, disallowed) = assemble_disallowlist(&raw.values, &self.extra)?;
        if !disallowed.is_empty() {
            debug!(
                "Options not accepted for {}: {}",
                raw.selector,
                disallowed.iter().collect::<Vec<_>>().join(", ")
            );
        }

        let params_path = match get_set(&raw.values, PARAMS_KEY) {
            Some(Value::String(path)) => PathBuf::from(path),
            _ => {
                return Err(LaunchError::Config(
                    "a params file is required ('--params')".to_string(),
                ))
            }
        };
        let mut params = read_params_file(&params_path)?;

        let sysadmin = self.load_sysadmin_defaults()?;
        update_defaults(&mut params, &sysadmin_sections(&sysadmin));
        let sysadmin = sysadmin_runconfig(&sysadmin);

        let default_model_dir = self.run_dir.as_ref().map(|dir| dir.join("model_dir"));
        let mut diagnostics = Diagnostics::new();
        let runconfig = section_mut(&mut params, RUNCONFIG_KEY)?;

        update_params_from_args(&raw.values, runconfig, &sysadmin, &mut diagnostics);
        finalize_runconfig(runconfig, default_model_dir.as_deref(), &mut diagnostics)?;

        let command = rebuild_command(runconfig, &template, &disallowed, &mut diagnostics)?;
        let second = LaunchParser::new(self.bin_name.as_str(), ParsePass::Second, &self.extra)?;
        let confirmed = second.parse(&command).map_err(|source| {
            error!(
                "A mismatch was detected between your params file and specified command-line \
                 arguments. Rebuilt command: {}",
                command.join(" ")
            );
            LaunchError::Inconsistent {
                command: command.clone(),
                source,
            }
        })?;

        overlay_confirmed_args(&confirmed.values, runconfig, &sysadmin);
        finalize_runconfig(runconfig, default_model_dir.as_deref(), &mut diagnostics)?;

        for (key, default) in &template {
            let allowed = key.as_str().is_some_and(|name| !disallowed.contains(name));
            if allowed && !runconfig.contains_key(key) {
                runconfig.insert(key.clone(), default.clone());
            }
        }
        remove_keys(runconfig, [PARAMS_KEY, CONFIG_KEY]);

        info!(
            "Params reconciled for {} with {} warning(s)",
            confirmed.selector,
            diagnostics.warnings().len()
        );
        Ok(LaunchReport {
            params,
            warnings: diagnostics.into_warnings(),
            command,
        })
    }

    fn load_sysadmin_defaults(&self) -> Result<Params> {
        match &self.sysadmin_defaults {
            Some(path) => {
                info!("Loading sysadmin defaults from {}", path.display());
                read_params_file(path)
            }
            None => Ok(Params::new()),
        }
    }
}

/// Reconcile the process arguments using the sysadmin defaults named in the
/// environment. Returns only the final params mapping.
pub fn get_params_from_args<F>(run_dir: impl Into<PathBuf>, extra: F) -> Result<Params>
where
    F: FnOnce() -> ExtraArgs,
{
    let report = LaunchContext::new()
        .with_run_dir(run_dir)
        .with_sysadmin_defaults_from_env()
        .with_extra_args(extra)
        .launch(env::args_os().skip(1))?;
    Ok(report.params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{ArgFragment, DeviceKey, OptionSpec, ScalarKind};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        params: String,
    }

    impl Fixture {
        fn new(params_yaml: &str) -> Self {
            let dir = tempdir().unwrap();
            let path = dir.path().join("params.yaml");
            fs::write(&path, params_yaml).unwrap();
            Self {
                params: path.to_string_lossy().into_owned(),
                dir,
            }
        }

        fn context(&self) -> LaunchContext {
            LaunchContext::new().with_run_dir(self.dir.path())
        }

        fn argv<'a>(&'a self, head: &[&'a str], tail: &[&'a str]) -> Vec<&'a str> {
            let mut argv = head.to_vec();
            argv.extend(["-p", self.params.as_str()]);
            argv.extend_from_slice(tail);
            argv
        }
    }

    #[test]
    fn test_weight_streaming_run() {
        let fixture = Fixture::new("runconfig:\n  mode: train\n  num_csx: 2\n");
        let report = fixture
            .context()
            .launch(fixture.argv(&["CSX", "weight_streaming"], &["-m", "train"]))
            .unwrap();

        let runconfig = report.runconfig().unwrap();
        assert_eq!(runconfig["target_device"], Value::from("CSX"));
        assert_eq!(runconfig["execution_strategy"], Value::from("weight_streaming"));
        assert_eq!(runconfig["mode"], Value::from("train"));
        assert_eq!(runconfig["num_csx"], Value::from(2));
        assert_eq!(runconfig["num_act_servers"], Value::from(1));
        assert!(!runconfig.contains_key("params"));
        assert!(!runconfig.contains_key("multireplica"));

        let model_dir = fixture.dir.path().join("model_dir");
        assert!(model_dir.is_dir());
        assert_eq!(
            runconfig["model_dir"],
            Value::from(model_dir.to_string_lossy().into_owned())
        );
        assert_eq!(runconfig["service_dir"], runconfig["model_dir"]);
        assert!(report.warnings.is_empty());
        assert_eq!(&report.command[..2], &["CSX", "weight_streaming"]);
    }

    #[test]
    fn test_cpu_drops_device_options() {
        let fixture = Fixture::new("runconfig:\n  mode: train\n  dist_backend: nccl\n");
        let report = fixture
            .context()
            .launch(fixture.argv(&["CPU"], &["-m", "train"]))
            .unwrap();

        let runconfig = report.runconfig().unwrap();
        assert!(!runconfig.contains_key("dist_backend"));
        assert!(!runconfig.contains_key("execution_strategy"));
        assert_eq!(
            report.warnings,
            vec![LaunchWarning::DroppedOptions {
                target: "CPU".to_string(),
                keys: vec!["dist_backend".to_string()],
            }]
        );
    }

    #[test]
    fn test_rebuilt_command_reparses() {
        let fixture = Fixture::new(
            "runconfig:\n  mode: eval\n  multireplica: false\n  mount_dirs: [/data]\n  \
             python_paths: /modelzoo\n  job_labels: [team=ml, run=1]\n  job_time_sec: 600\n",
        );
        let report = fixture
            .context()
            .launch(fixture.argv(&["CSX", "pipeline"], &["-m", "eval", "--python_paths", "/extra"]))
            .unwrap();

        let runconfig = report.runconfig().unwrap();
        assert_eq!(
            runconfig["python_paths"],
            Value::Sequence(vec![Value::from("/extra"), Value::from("/modelzoo")])
        );
        assert_eq!(runconfig["job_time_sec"], Value::from(600));

        let parser = LaunchParser::new(DEFAULT_BIN_NAME, ParsePass::Second, &ExtraArgs::None).unwrap();
        let reparsed = parser.parse(&report.command).unwrap();
        assert_eq!(reparsed.values["mount_dirs"], runconfig["mount_dirs"]);
        assert_eq!(reparsed.values["job_labels"], runconfig["job_labels"]);
    }

    #[test]
    fn test_hyphen_leading_file_value() {
        let fixture = Fixture::new(
            "runconfig:\n  mode: train\n  checkpoint_path: -run1/ckpt.mdl\n  max_steps: -1\n",
        );
        let report = fixture
            .context()
            .launch(fixture.argv(&["CPU"], &["-m", "train"]))
            .unwrap();

        let runconfig = report.runconfig().unwrap();
        assert_eq!(runconfig["checkpoint_path"], Value::from("-run1/ckpt.mdl"));
        assert_eq!(runconfig["max_steps"], Value::from(-1));
        assert!(report
            .command
            .contains(&"--checkpoint_path=-run1/ckpt.mdl".to_string()));
    }

    #[test]
    fn test_quoted_numbers_are_not_overrides() {
        let fixture = Fixture::new("runconfig:\n  mode: train\n  max_steps: \"100\"\n");
        let report = fixture
            .context()
            .launch(fixture.argv(&["CPU"], &["-m", "train"]))
            .unwrap();

        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.runconfig().unwrap()["max_steps"], Value::from(100));
    }

    #[test]
    fn test_missing_params_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        let err = LaunchContext::new()
            .with_run_dir(dir.path())
            .launch(["GPU", "-p", missing.to_str().unwrap(), "-m", "train"])
            .unwrap_err();
        assert!(matches!(err, LaunchError::Read { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_missing_runconfig_section() {
        let fixture = Fixture::new("model:\n  hidden: 64\n");
        let err = fixture
            .context()
            .launch(fixture.argv(&["GPU"], &["-m", "train"]))
            .unwrap_err();
        assert!(matches!(err, LaunchError::Config(_)));
    }

    #[test]
    fn test_usage_errors_pass_through() {
        let fixture = Fixture::new("runconfig:\n  mode: train\n");
        let err = fixture
            .context()
            .launch(fixture.argv(&["GPU"], &[]))
            .unwrap_err();
        assert!(matches!(err, LaunchError::Usage(_)));
        assert_ne!(err.exit_code(), 1);
    }

    #[test]
    fn test_sysadmin_defaults_overlay() {
        let fixture = Fixture::new(
            "runconfig:\n  mode: train\n  mgmt_address: local:1\n  python_paths: [/user]\n\
             train_input:\n  batch_size: 4\n",
        );
        let sysadmin = fixture.dir.path().join("cluster.yaml");
        fs::write(
            &sysadmin,
            "runconfig:\n  mgmt_address: mgmt:9000\n  credentials_path: /etc/creds\n  \
             python_paths: [/site]\ntrain_input:\n  batch_size: 256\n  shuffle: true\n",
        )
        .unwrap();

        let report = fixture
            .context()
            .with_sysadmin_defaults(&sysadmin)
            .launch(fixture.argv(&["CSX", "weight_streaming"], &["-m", "train"]))
            .unwrap();

        let runconfig = report.runconfig().unwrap();
        assert_eq!(runconfig["mgmt_address"], Value::from("local:1"));
        assert_eq!(runconfig["credentials_path"], Value::from("/etc/creds"));
        assert_eq!(
            runconfig["python_paths"],
            Value::Sequence(vec![Value::from("/user"), Value::from("/site")])
        );
        assert_eq!(report.params["train_input"]["batch_size"], Value::from(4));
        assert_eq!(report.params["train_input"]["shuffle"], Value::from(true));
    }

    #[test]
    fn test_unreadable_sysadmin_defaults() {
        let fixture = Fixture::new("runconfig:\n  mode: train\n");
        let err = fixture
            .context()
            .with_sysadmin_defaults(fixture.dir.path().join("nope.yaml"))
            .launch(fixture.argv(&["GPU"], &["-m", "train"]))
            .unwrap_err();
        match &err {
            LaunchError::Read { path, .. } => assert!(path.ends_with("nope.yaml")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_sysadmin_defaults_from_env() {
        // Only this test touches the variable
        env::remove_var(SYSADMIN_DEFAULTS_ENV);
        assert!(LaunchContext::new()
            .with_sysadmin_defaults_from_env()
            .sysadmin_defaults()
            .is_none());

        env::set_var(SYSADMIN_DEFAULTS_ENV, "");
        assert!(LaunchContext::new()
            .with_sysadmin_defaults_from_env()
            .sysadmin_defaults()
            .is_none());

        env::set_var(SYSADMIN_DEFAULTS_ENV, "/etc/cluster/defaults.yaml");
        let context = LaunchContext::new().with_sysadmin_defaults_from_env();
        env::remove_var(SYSADMIN_DEFAULTS_ENV);
        assert_eq!(
            context.sysadmin_defaults(),
            Some(Path::new("/etc/cluster/defaults.yaml"))
        );
    }

    #[test]
    fn test_other_sections_untouched() {
        let fixture = Fixture::new(
            "model:\n  hidden: 64\nrunconfig:\n  mode: eval\n  config: legacy.yaml\n  \
             custom_key: kept\noptimizer:\n  lr: 0.01\n",
        );
        let report = fixture
            .context()
            .launch(fixture.argv(&["GPU"], &["-m", "eval"]))
            .unwrap();

        let keys: Vec<&str> = report.params.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, vec!["model", "runconfig", "optimizer"]);
        assert_eq!(report.params["model"]["hidden"], Value::from(64));
        assert_eq!(report.params["optimizer"]["lr"], Value::from(0.01));

        let runconfig = report.runconfig().unwrap();
        assert_eq!(runconfig["custom_key"], Value::from("kept"));
        assert!(!runconfig.contains_key("config"));
        assert_eq!(runconfig["dist_backend"], Value::from("nccl"));
        assert_eq!(runconfig["dist_addr"], Value::from("localhost:8888"));
    }

    #[test]
    fn test_cli_value_overrides_file() {
        let fixture = Fixture::new("runconfig:\n  mode: eval\n  max_steps: 10\n");
        let report = fixture
            .context()
            .launch(fixture.argv(&["GPU"], &["-m", "train", "--max_steps", "20"]))
            .unwrap();

        let runconfig = report.runconfig().unwrap();
        assert_eq!(runconfig["mode"], Value::from("train"));
        assert_eq!(runconfig["max_steps"], Value::from(20));
        let overridden: Vec<&str> = report
            .warnings
            .iter()
            .filter_map(|w| match w {
                LaunchWarning::CliOverride { key, .. } => Some(key.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(overridden, vec!["mode", "max_steps"]);
    }

    #[test]
    fn test_multireplica_disabled_outside_train() {
        let fixture = Fixture::new("runconfig:\n  mode: eval\n  multireplica: true\n");
        let report = fixture
            .context()
            .launch(fixture.argv(&["CSX", "pipeline"], &["-m", "eval"]))
            .unwrap();
        let runconfig = report.runconfig().unwrap();
        assert!(runconfig["multireplica"].is_null());
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, LaunchWarning::MultireplicaDisabled { .. })));
        assert!(!report.command.iter().any(|t| t == "--multireplica"));
    }

    #[test]
    fn test_file_conflict_is_inconsistent() {
        let fixture = Fixture::new(
            "runconfig:\n  mode: train\n  compile_only: true\n  validate_only: true\n",
        );
        let err = fixture
            .context()
            .launch(fixture.argv(&["CSX", "pipeline"], &["-m", "train"]))
            .unwrap_err();
        match &err {
            LaunchError::Inconsistent { command, .. } => {
                assert!(command.iter().any(|t| t == "--compile_only"));
                assert!(command.iter().any(|t| t == "--validate_only"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_ne!(err.exit_code(), 0);
    }

    #[test]
    fn test_contributed_options_flow_through() {
        let fixture = Fixture::new("runconfig:\n  mode: train\n  nodes: 4\n  seed: 7\n");
        let extra = || {
            ExtraArgs::ByDevice(vec![
                (
                    DeviceKey::Any,
                    vec![ArgFragment::new().option(OptionSpec::value("seed", ScalarKind::Int))],
                ),
                (
                    DeviceKey::Gpu,
                    vec![ArgFragment::titled("Cluster")
                        .option(OptionSpec::value("nodes", ScalarKind::Int).default_value(1))],
                ),
            ])
        };

        let report = fixture
            .context()
            .with_extra_args(extra)
            .launch(fixture.argv(&["CPU"], &["-m", "train"]))
            .unwrap();
        let runconfig = report.runconfig().unwrap();
        assert_eq!(runconfig["seed"], Value::from(7));
        assert!(!runconfig.contains_key("nodes"));

        let report = fixture
            .context()
            .with_extra_args(extra)
            .launch(fixture.argv(&["GPU"], &["-m", "train"]))
            .unwrap();
        assert_eq!(report.runconfig().unwrap()["nodes"], Value::from(4));
    }
}
