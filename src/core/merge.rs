// merge.rs - Merge command-line values, params file and sysadmin defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::debug;

use crate::core::diagnostics::{Diagnostics, LaunchWarning};
use crate::error::{LaunchError, Result};
use crate::params::{
    as_list, get_set, is_truthy, Params, CHECKPOINT_PATH_KEY, CONFIG_KEY, MODEL_DIR_KEY, MODE_KEY,
    MULTIREPLICA_KEY, PARAMS_KEY, PATH_LIST_KEYS, PRETRAINED_CHECKPOINT_KEY, RUNCONFIG_KEY,
    SERVICE_DIR_KEY,
};

/// Update `runconfig` in place from parsed command-line values.
///
/// Precedence is command line, then the existing `runconfig` entry, then the
/// sysadmin defaults. Path lists are concatenated in that same order instead.
/// Every key of `args` ends up in `runconfig`, null when no source sets it.
pub fn update_params_from_args(
    args: &Params,
    runconfig: &mut Params,
    sysadmin: &Params,
    diagnostics: &mut Diagnostics,
) {
    merge_args(args, runconfig, sysadmin, Some(diagnostics));
}

/// Apply the values of the strict re-parse to `runconfig`.
///
/// Same precedence as [`update_params_from_args`], but nothing is reported:
/// these values were rebuilt from `runconfig` itself, so a difference is only
/// the typed parser normalizing a file value (`"100"` becoming `100`).
pub fn overlay_confirmed_args(args: &Params, runconfig: &mut Params, sysadmin: &Params) {
    merge_args(args, runconfig, sysadmin, None);
}

fn merge_args(
    args: &Params,
    runconfig: &mut Params,
    sysadmin: &Params,
    mut diagnostics: Option<&mut Diagnostics>,
) {
    for (key, cli_value) in args {
        let Some(name) = key.as_str() else {
            continue;
        };
        if name == PARAMS_KEY || name == CONFIG_KEY {
            continue;
        }

        if PATH_LIST_KEYS.contains(&name) {
            let merged = concat_path_lists(cli_value, runconfig.get(name), sysadmin.get(name));
            if !merged.is_empty() {
                debug!("Merged {}: {:?}", name, merged);
                runconfig.insert(key.clone(), Value::Sequence(merged));
            }
            continue;
        }

        let value = if cli_value.is_null() {
            get_set(runconfig, name)
                .or_else(|| get_set(sysadmin, name))
                .cloned()
                .unwrap_or(Value::Null)
        } else {
            if let (Some(file_value), Some(diagnostics)) =
                (get_set(runconfig, name), diagnostics.as_deref_mut())
            {
                if file_value != cli_value {
                    diagnostics.record(LaunchWarning::CliOverride {
                        key: name.to_string(),
                        file_value: display_value(file_value),
                        cli_value: display_value(cli_value),
                    });
                }
            }
            cli_value.clone()
        };
        runconfig.insert(key.clone(), value);
    }
}

/// Concatenate path lists from every source, keeping the first occurrence
/// of each entry.
pub fn concat_path_lists(
    cli: &Value,
    file: Option<&Value>,
    sysadmin: Option<&Value>,
) -> Vec<Value> {
    let mut merged: Vec<Value> = Vec::new();
    let sources = [Some(cli), file, sysadmin];
    for entry in sources.into_iter().flatten().flat_map(as_list) {
        if !merged.contains(&entry) {
            merged.push(entry);
        }
    }
    merged
}

/// Enforce the post-merge invariants and resolve the model directory.
///
/// `default_model_dir` is used only when no source sets `model_dir`. The
/// directory is created if missing.
pub fn finalize_runconfig(
    runconfig: &mut Params,
    default_model_dir: Option<&Path>,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    let pretrained = runconfig
        .get(PRETRAINED_CHECKPOINT_KEY)
        .is_some_and(is_truthy);
    let has_checkpoint = runconfig.get(CHECKPOINT_PATH_KEY).is_some_and(is_truthy);
    if pretrained && !has_checkpoint {
        return Err(LaunchError::Config(
            "'--is_pretrained_checkpoint' can only be used if a '--checkpoint_path' is provided."
                .to_string(),
        ));
    }

    let mode = get_set(runconfig, MODE_KEY).map(display_value);
    if mode.as_deref() != Some("train") && runconfig.get(MULTIREPLICA_KEY).is_some_and(is_truthy) {
        diagnostics.record(LaunchWarning::MultireplicaDisabled {
            mode: mode.unwrap_or_else(|| "None".to_string()),
        });
        runconfig.insert(Value::from(MULTIREPLICA_KEY), Value::Null);
    }

    let model_dir = resolve_model_dir(runconfig, default_model_dir)?;
    fs::create_dir_all(&model_dir).map_err(|source| LaunchError::ModelDir {
        path: model_dir.clone(),
        source,
    })?;
    let model_dir = Value::from(model_dir.to_string_lossy().into_owned());
    runconfig.insert(Value::from(MODEL_DIR_KEY), model_dir.clone());

    if get_set(runconfig, SERVICE_DIR_KEY).is_none() {
        runconfig.insert(Value::from(SERVICE_DIR_KEY), model_dir);
    }
    Ok(())
}

fn resolve_model_dir(runconfig: &Params, default_model_dir: Option<&Path>) -> Result<PathBuf> {
    match get_set(runconfig, MODEL_DIR_KEY) {
        Some(Value::String(dir)) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        Some(other) => Err(LaunchError::Config(format!(
            "'{}' must be a directory path, got {}",
            MODEL_DIR_KEY,
            display_value(other)
        ))),
        None => default_model_dir.map(Path::to_path_buf).ok_or_else(|| {
            LaunchError::Config("Could not get default model directory".to_string())
        }),
    }
}

/// The `runconfig`-level part of a sysadmin defaults mapping.
///
/// A file with its own `runconfig` section is shaped like a params file;
/// anything else is taken to be the `runconfig` section itself.
pub fn sysadmin_runconfig(defaults: &Params) -> Params {
    match defaults.get(RUNCONFIG_KEY) {
        Some(Value::Mapping(runconfig)) => runconfig.clone(),
        _ => defaults.clone(),
    }
}

/// Top-level sections of a params-file-shaped sysadmin mapping, other than
/// `runconfig`.
pub fn sysadmin_sections(defaults: &Params) -> Params {
    match defaults.get(RUNCONFIG_KEY) {
        Some(Value::Mapping(_)) => defaults
            .iter()
            .filter(|(key, _)| key.as_str() != Some(RUNCONFIG_KEY))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        _ => Params::new(),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| format!("{:?}", other)),
    }
}
