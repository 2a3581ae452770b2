// mod.rs - Params mappings and value helpers

pub mod file;

use serde_yaml::{Mapping, Value};

use crate::error::{LaunchError, Result};

pub use file::{read_params_file, update_defaults, update_params_from_file, write_params};

/// An ordered YAML mapping. Iteration follows file order.
pub type Params = Mapping;

pub const RUNCONFIG_KEY: &str = "runconfig";
pub const PARAMS_KEY: &str = "params";
/// Legacy config-file key, stripped from the final runconfig.
pub const CONFIG_KEY: &str = "config";
pub const TARGET_DEVICE_KEY: &str = "target_device";
pub const EXECUTION_STRATEGY_KEY: &str = "execution_strategy";
pub const MODE_KEY: &str = "mode";
pub const MODEL_DIR_KEY: &str = "model_dir";
pub const SERVICE_DIR_KEY: &str = "service_dir";
pub const CHECKPOINT_PATH_KEY: &str = "checkpoint_path";
pub const PRETRAINED_CHECKPOINT_KEY: &str = "is_pretrained_checkpoint";
pub const MULTIREPLICA_KEY: &str = "multireplica";

/// Options whose values accumulate across sources instead of overriding.
pub const PATH_LIST_KEYS: [&str; 2] = ["python_paths", "mount_dirs"];

/// Null, `false`, zero, and empty strings or collections are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(seq) => !seq.is_empty(),
        Value::Mapping(map) => !map.is_empty(),
        Value::Tagged(tagged) => is_truthy(&tagged.value),
    }
}

/// Look up a key, treating an explicit null like a missing entry.
pub fn get_set<'a>(params: &'a Params, key: &str) -> Option<&'a Value> {
    params.get(key).filter(|value| !value.is_null())
}

/// A string is a one-element list; null is an empty list.
pub fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Sequence(seq) => seq.clone(),
        other => vec![other.clone()],
    }
}

/// Render a scalar as a single command-line token.
pub fn scalar_token(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Tagged(tagged) => scalar_token(key, &tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => Err(LaunchError::Config(format!(
            "'{}' must be a scalar or a list of scalars to be passed on the command line",
            key
        ))),
    }
}

/// Remove `keys` without disturbing the order of the remaining entries.
pub fn remove_keys<'a, I>(params: &mut Params, keys: I)
where
    I: IntoIterator<Item = &'a str>,
{
    let keys: Vec<&str> = keys.into_iter().collect();
    let retained = std::mem::take(params)
        .into_iter()
        .filter(|(key, _)| !key.as_str().is_some_and(|k| keys.contains(&k)))
        .collect();
    *params = retained;
}

/// Mutable access to a required nested mapping.
pub fn section_mut<'a>(params: &'a mut Params, key: &str) -> Result<&'a mut Params> {
    match params.get_mut(key) {
        Some(Value::Mapping(section)) => Ok(section),
        Some(_) => Err(LaunchError::Config(format!(
            "'{}' section of the params file must be a mapping",
            key
        ))),
        None => Err(LaunchError::Config(format!(
            "params file is missing the required '{}' section",
            key
        ))),
    }
}
