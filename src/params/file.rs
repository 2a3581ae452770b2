// file.rs - Params file load/store and default back-filling

use std::fs;
use std::io::Write;
use std::path::Path;

use serde_yaml::Value;
use tracing::debug;

use super::Params;
use crate::error::{LaunchError, Result};

/// Load a YAML params file. The document must be a mapping.
pub fn read_params_file<P: AsRef<Path>>(path: P) -> Result<Params> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| LaunchError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value = serde_yaml::from_str(&content).map_err(|source| LaunchError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Mapping(params) => {
            debug!("Loaded params from {}", path.display());
            Ok(params)
        }
        other => Err(LaunchError::Config(format!(
            "params file '{}' must contain a mapping at the top level, found {}",
            path.display(),
            kind_name(&other)
        ))),
    }
}

/// Serialize params as YAML.
pub fn write_params<W: Write>(writer: W, params: &Params) -> Result<()> {
    serde_yaml::to_writer(writer, params).map_err(LaunchError::Serialize)
}

/// Fill keys missing from `params` with the values in `defaults`.
///
/// Nested mappings are merged recursively; any other value type is only
/// copied when the key is absent.
pub fn update_defaults(params: &mut Params, defaults: &Params) {
    for (key, default) in defaults {
        match default {
            Value::Mapping(nested_defaults) => {
                let entry = params
                    .entry(key.clone())
                    .or_insert_with(|| Value::Mapping(Params::new()));
                match entry {
                    Value::Mapping(nested) => update_defaults(nested, nested_defaults),
                    Value::Null => *entry = default.clone(),
                    _ => {}
                }
            }
            _ => {
                if !params.contains_key(key) {
                    params.insert(key.clone(), default.clone());
                }
            }
        }
    }
}

/// Back-fill `params` from a defaults file, if it exists.
pub fn update_params_from_file<P: AsRef<Path>>(params: &mut Params, path: P) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        let defaults = read_params_file(path)?;
        update_defaults(params, &defaults);
    }
    Ok(())
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "an empty document",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_and_write_preserve_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.yaml");
        let params: Params =
            serde_yaml::from_str("runconfig:\n  mode: train\n  num_csx: 2\nmodel:\n  hidden: 64\n")
                .unwrap();

        let mut buffer = Vec::new();
        write_params(&mut buffer, &params).unwrap();
        fs::write(&path, buffer).unwrap();
        let loaded = read_params_file(&path).unwrap();
        assert_eq!(loaded, params);

        let keys: Vec<&str> = loaded.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, vec!["runconfig", "model"]);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let err = read_params_file(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, LaunchError::Read { .. }));
        assert!(err.to_string().contains("absent.yaml"));
    }

    #[test]
    fn test_read_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "runconfig: [unclosed\n").unwrap();
        assert!(matches!(
            read_params_file(&path).unwrap_err(),
            LaunchError::Parse { .. }
        ));

        fs::write(&path, "- just\n- a list\n").unwrap();
        assert!(matches!(
            read_params_file(&path).unwrap_err(),
            LaunchError::Config(_)
        ));
    }

    #[test]
    fn test_update_defaults_is_recursive() {
        let mut params: Params =
            serde_yaml::from_str("train_input:\n  batch_size: 8\nrunconfig:\n  mode: eval\n")
                .unwrap();
        let defaults: Params = serde_yaml::from_str(
            "train_input:\n  batch_size: 256\n  shuffle: true\nrunconfig:\n  mode: train\n  max_steps: 10\nmodel:\n  layers: 2\n",
        )
        .unwrap();

        update_defaults(&mut params, &defaults);

        assert_eq!(params["train_input"]["batch_size"], Value::from(8));
        assert_eq!(params["train_input"]["shuffle"], Value::from(true));
        assert_eq!(params["runconfig"]["mode"], Value::from("eval"));
        assert_eq!(params["runconfig"]["max_steps"], Value::from(10));
        assert_eq!(params["model"]["layers"], Value::from(2));
    }

    #[test]
    fn test_update_params_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("defaults.yaml");
        let mut params: Params = serde_yaml::from_str("a: 1\n").unwrap();

        update_params_from_file(&mut params, &path).unwrap();
        assert_eq!(params.len(), 1);

        fs::write(&path, "a: 5\nb: 2\n").unwrap();
        update_params_from_file(&mut params, &path).unwrap();
        assert_eq!(params["a"], Value::from(1));
        assert_eq!(params["b"], Value::from(2));
    }
}
