// rebuild.rs - Serialize a merged runconfig back into an argument vector

use serde_yaml::Value;
use tracing::debug;

use crate::cli::DeviceType;
use crate::core::diagnostics::{Diagnostics, LaunchWarning};
use crate::core::disallow::Disallowlist;
use crate::error::{LaunchError, Result};
use crate::params::{
    get_set, remove_keys, scalar_token, Params, EXECUTION_STRATEGY_KEY, TARGET_DEVICE_KEY,
};

/// Build the synthetic command line for the strict second parse.
///
/// `target_device` and `execution_strategy` are taken out of `runconfig` and
/// become the leading tokens. Set options known to `template` follow in
/// mapping order. Disallowed options are removed from `runconfig` and
/// reported once; unknown keys are left in place but not emitted.
pub fn rebuild_command(
    runconfig: &mut Params,
    template: &Params,
    disallowed: &Disallowlist,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<String>> {
    let device = take_string(runconfig, TARGET_DEVICE_KEY)?.ok_or_else(|| {
        LaunchError::Config(format!("'{}' is missing from runconfig", TARGET_DEVICE_KEY))
    })?;
    let strategy = take_string(runconfig, EXECUTION_STRATEGY_KEY)?;

    let mut command = vec![device.clone()];
    // Only CSX takes a strategy token; a stale one from the file is ignored
    if device == DeviceType::Csx.as_str() {
        command.extend(strategy);
    }

    let mut dropped: Vec<String> = Vec::new();
    for (key, value) in runconfig.iter() {
        let Some(name) = key.as_str() else {
            continue;
        };
        if value.is_null() || *value == Value::Bool(false) {
            continue;
        }
        if disallowed.contains(name) {
            dropped.push(name.to_string());
        } else if template.contains_key(name) {
            push_option(&mut command, name, value)?;
        }
    }

    if !dropped.is_empty() {
        remove_keys(runconfig, dropped.iter().map(String::as_str));
        diagnostics.record(LaunchWarning::DroppedOptions {
            target: device,
            keys: dropped,
        });
    }

    debug!("Rebuilt command: {}", command.join(" "));
    Ok(command)
}

fn take_string(runconfig: &mut Params, key: &str) -> Result<Option<String>> {
    let value = match get_set(runconfig, key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err(LaunchError::Config(format!("'{}' must be a string", key)));
        }
        None => None,
    };
    remove_keys(runconfig, [key]);
    Ok(value)
}

/// Values are attached with `=` so that a value starting with `-` is not
/// read as another option. Each list element is its own occurrence.
fn push_option(command: &mut Vec<String>, name: &str, value: &Value) -> Result<()> {
    match value {
        Value::Bool(true) => command.push(format!("--{}", name)),
        Value::Sequence(items) => {
            for item in items {
                command.push(format!("--{}={}", name, scalar_token(name, item)?));
            }
        }
        other => command.push(format!("--{}={}", name, scalar_token(name, other)?)),
    }
    Ok(())
}
