// parser.rs - clap command trees derived from option schemas

use std::ffi::OsString;

use clap::builder::PossibleValuesParser;
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command};
use serde_yaml::Value;

use crate::cli::device::{DeviceKey, DeviceSelector, DeviceType, ExecutionStrategy};
use crate::cli::extra::ExtraArgs;
use crate::cli::options::{OptionKind, OptionSpec, ParsePass, ScalarKind};
use crate::cli::schema::OptionSchema;
use crate::error::Result;
use crate::params::{Params, EXECUTION_STRATEGY_KEY, TARGET_DEVICE_KEY};

/// A command line resolved against one device schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArgs {
    pub selector: DeviceSelector,
    /// One entry per schema option plus the target selector keys.
    pub values: Params,
}

/// Command-line parser covering all four targets for one parse pass.
pub struct LaunchParser {
    bin_name: String,
    cpu: OptionSchema,
    gpu: OptionSchema,
    pipeline: OptionSchema,
    weight_streaming: OptionSchema,
}

impl LaunchParser {
    pub fn new(bin_name: impl Into<String>, pass: ParsePass, extra: &ExtraArgs) -> Result<Self> {
        Ok(Self {
            bin_name: bin_name.into(),
            cpu: OptionSchema::build(DeviceSelector::CPU, pass, extra)?,
            gpu: OptionSchema::build(DeviceSelector::GPU, pass, extra)?,
            pipeline: OptionSchema::build(DeviceSelector::PIPELINE, pass, extra)?,
            weight_streaming: OptionSchema::build(
                DeviceSelector::WEIGHT_STREAMING,
                pass,
                extra,
            )?,
        })
    }

    pub fn schema(&self, selector: DeviceSelector) -> &OptionSchema {
        match selector.key() {
            DeviceKey::Cpu => &self.cpu,
            DeviceKey::Gpu => &self.gpu,
            DeviceKey::Pipeline => &self.pipeline,
            DeviceKey::WeightStreaming | DeviceKey::Any => &self.weight_streaming,
        }
    }

    /// Build the full command tree: `<device> [<strategy>] [options]`.
    pub fn command(&self) -> Command {
        let csx = Command::new(DeviceType::Csx.as_str())
            .about(DeviceType::Csx.description())
            .subcommand_required(true)
            .subcommand_help_heading("Execution Strategy")
            .after_help(csx_epilog(&self.bin_name))
            .subcommand(
                device_command(
                    ExecutionStrategy::Pipeline.as_str(),
                    ExecutionStrategy::Pipeline.description(),
                    &self.pipeline,
                )
                .override_usage(format!(
                    "{} CSX pipeline ... --params /path/to/params.yaml --mode {{mode}} \
                     --python_paths /path/to/modelzoo --mount_dirs /path/to/modelzoo",
                    self.bin_name
                )),
            )
            .subcommand(
                device_command(
                    ExecutionStrategy::WeightStreaming.as_str(),
                    ExecutionStrategy::WeightStreaming.description(),
                    &self.weight_streaming,
                )
                .override_usage(format!(
                    "{} CSX weight_streaming ... --params /path/to/params.yaml --mode {{mode}} \
                     --python_paths /path/to/modelzoo --mount_dirs /path/to/modelzoo",
                    self.bin_name
                )),
            );

        Command::new(self.bin_name.clone())
            .about("Reconcile launch arguments with a YAML params file for a training or eval run")
            .version(env!("CARGO_PKG_VERSION"))
            .subcommand_required(true)
            .arg_required_else_help(true)
            .disable_help_subcommand(true)
            .subcommand_help_heading("Target Device")
            .after_help(root_epilog(&self.bin_name))
            .subcommand(device_command(
                DeviceType::Cpu.as_str(),
                DeviceType::Cpu.description(),
                &self.cpu,
            ))
            .subcommand(device_command(
                DeviceType::Gpu.as_str(),
                DeviceType::Gpu.description(),
                &self.gpu,
            ))
            .subcommand(csx)
    }

    /// Parse a command line (without the program name).
    pub fn parse<I, T>(&self, args: I) -> std::result::Result<ParsedArgs, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let argv = std::iter::once(OsString::from(&self.bin_name))
            .chain(args.into_iter().map(Into::into));
        let matches = self.command().try_get_matches_from(argv)?;

        let (device_name, device_matches) = matches
            .subcommand()
            .ok_or_else(|| self.usage_error("a target device is required"))?;
        let (strategy_name, leaf) = match device_matches.subcommand() {
            Some((strategy, leaf)) => (Some(strategy), leaf),
            None => (None, device_matches),
        };
        let selector = DeviceSelector::from_names(device_name, strategy_name)
            .map_err(|e| self.usage_error(&e.to_string()))?;

        Ok(ParsedArgs {
            selector,
            values: collect_values(self.schema(selector), selector, leaf),
        })
    }

    /// Long help for one target's subcommand.
    pub fn render_help(&self, selector: DeviceSelector) -> String {
        let mut root = self.command();
        let mut path = selector.tokens().into_iter();
        let Some(device) = path.next() else {
            return root.render_long_help().to_string();
        };
        let Some(device_cmd) = root.find_subcommand_mut(&device) else {
            return String::new();
        };
        match path.next() {
            Some(strategy) => device_cmd
                .find_subcommand_mut(&strategy)
                .map(|cmd| cmd.render_long_help().to_string())
                .unwrap_or_default(),
            None => device_cmd.render_long_help().to_string(),
        }
    }

    fn usage_error(&self, message: &str) -> clap::Error {
        self.command().error(ErrorKind::InvalidSubcommand, message)
    }
}

fn device_command(name: &str, about: &str, schema: &OptionSchema) -> Command {
    let mut cmd = Command::new(name.to_string()).about(about.to_string());
    for spec in schema.options() {
        cmd = cmd.arg(build_arg(spec, schema.pass()));
    }

    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for spec in schema.options() {
        if let Some(group) = spec.exclusive_group() {
            match groups.iter_mut().find(|(name, _)| name == group) {
                Some((_, members)) => members.push(spec.name().to_string()),
                None => groups.push((group.to_string(), vec![spec.name().to_string()])),
            }
        }
    }
    for (group, members) in groups {
        if members.len() > 1 {
            cmd = cmd.group(ArgGroup::new(group).args(members).multiple(false));
        }
    }
    cmd
}

fn build_arg(spec: &OptionSpec, pass: ParsePass) -> Arg {
    let mut arg = Arg::new(spec.name().to_string())
        .long(spec.name().to_string())
        .required(spec.is_required(pass));

    if let Some(short) = spec.short_flag() {
        arg = arg.short(short);
    }
    if !spec.help_text().is_empty() {
        arg = arg.help(spec.help_text().to_string());
    }
    if let Some(heading) = spec.help_heading() {
        arg = arg.help_heading(heading.to_string());
    }

    match spec.kind() {
        OptionKind::Flag => arg.action(ArgAction::SetTrue),
        OptionKind::Value(kind) => with_value_parser(arg.action(ArgAction::Set), kind, spec),
        OptionKind::List(kind) => {
            with_value_parser(arg.action(ArgAction::Append).num_args(1..), kind, spec)
        }
    }
}

fn with_value_parser(arg: Arg, kind: ScalarKind, spec: &OptionSpec) -> Arg {
    match kind {
        ScalarKind::Str if !spec.choice_values().is_empty() => {
            arg.value_parser(PossibleValuesParser::new(spec.choice_values().to_vec()))
        }
        ScalarKind::Str => arg.value_parser(clap::value_parser!(String)),
        ScalarKind::Int => arg
            .value_parser(clap::value_parser!(i64))
            .allow_negative_numbers(true),
        ScalarKind::Float => arg
            .value_parser(clap::value_parser!(f64))
            .allow_negative_numbers(true),
    }
}

/// Turn matches back into typed values, filling in the pass defaults.
fn collect_values(schema: &OptionSchema, selector: DeviceSelector, matches: &ArgMatches) -> Params {
    let mut values = Params::new();
    values.insert(
        Value::from(TARGET_DEVICE_KEY),
        Value::from(selector.device().as_str()),
    );
    if let Some(strategy) = selector.strategy() {
        values.insert(
            Value::from(EXECUTION_STRATEGY_KEY),
            Value::from(strategy.as_str()),
        );
    }

    for spec in schema.options() {
        let name = spec.name();
        let given = match spec.kind() {
            OptionKind::Flag => matches.get_flag(name).then_some(Value::Bool(true)),
            OptionKind::Value(kind) => scalar_value(matches, name, kind),
            OptionKind::List(kind) => list_value(matches, name, kind),
        };
        values.insert(
            Value::from(name),
            given.unwrap_or_else(|| spec.default_for(schema.pass())),
        );
    }
    values
}

fn scalar_value(matches: &ArgMatches, name: &str, kind: ScalarKind) -> Option<Value> {
    match kind {
        ScalarKind::Str => matches.get_one::<String>(name).map(|v| Value::from(v.as_str())),
        ScalarKind::Int => matches.get_one::<i64>(name).map(|v| Value::from(*v)),
        ScalarKind::Float => matches.get_one::<f64>(name).map(|v| Value::from(*v)),
    }
}

fn list_value(matches: &ArgMatches, name: &str, kind: ScalarKind) -> Option<Value> {
    let values: Vec<Value> = match kind {
        ScalarKind::Str => matches
            .get_many::<String>(name)?
            .map(|v| Value::from(v.as_str()))
            .collect(),
        ScalarKind::Int => matches.get_many::<i64>(name)?.map(|v| Value::from(*v)).collect(),
        ScalarKind::Float => matches.get_many::<f64>(name)?.map(|v| Value::from(*v)).collect(),
    };
    Some(Value::Sequence(values))
}

fn root_epilog(bin: &str) -> String {
    format!(
        "Please run '{bin} {{CPU,GPU}} -h' or '{bin} CSX {{pipeline,weight_streaming}} -h'\n\
         to list available subcommands.\n\n\
         Here are some example commands for running on different devices:\n\n    \
         {bin} CPU --params /path/to/params.yaml --mode train\n\n    \
         {bin} CSX weight_streaming --params /path/to/params.yaml --mode eval --num_csx 1\n"
    )
}

fn csx_epilog(bin: &str) -> String {
    format!(
        "To see a complete list of all available arguments for your chosen execution strategy,\n\
         please run '{bin} CSX {{pipeline,weight_streaming}} -h'.\n\n\
         Here are some example commands for running with different execution strategies:\n\n    \
         {bin} CSX weight_streaming --params /path/to/params.yaml --mode eval --num_csx 1\n\n    \
         {bin} CSX pipeline --params /path/to/params.yaml --mode train --multireplica\n\n\
         When running from the Cerebras Modelzoo, you generally specify --python_paths and\n\
         --mount_dirs. This can be done here or in the params under the 'runconfig' section.\n\
         Both should at least include a path to the directory in which the Cerebras Modelzoo\n\
         resides.\n"
    )
}
