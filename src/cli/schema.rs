// schema.rs - Per-device option schemas

use std::collections::HashSet;

use serde_yaml::Value;

use crate::cli::device::{DeviceKey, DeviceSelector};
use crate::cli::extra::ExtraArgs;
use crate::cli::options::{builtin_options, OptionSpec, ParsePass};
use crate::error::{LaunchError, Result};
use crate::params::Params;

/// The options recognized for one target in one parse pass.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSchema {
    selector: DeviceSelector,
    pass: ParsePass,
    options: Vec<OptionSpec>,
}

impl OptionSchema {
    /// Filter the built-in catalog and the contributed options down to the
    /// ones that apply to `selector`.
    ///
    /// Shared contributed options come first, then the general built-ins,
    /// then the device-specific contributions and built-ins.
    pub fn build(selector: DeviceSelector, pass: ParsePass, extra: &ExtraArgs) -> Result<Self> {
        let key = selector.key();
        let contributed = extra.options_for(key);
        let (shared, device_specific): (Vec<OptionSpec>, Vec<OptionSpec>) = contributed
            .into_iter()
            .partition(|spec| spec.applies_to(DeviceKey::Any));

        let (general, device_builtins): (Vec<OptionSpec>, Vec<OptionSpec>) = builtin_options()
            .into_iter()
            .filter(|spec| spec.applies_to(key))
            .partition(|spec| spec.applies_to(DeviceKey::Any));

        let mut options = shared;
        options.extend(general);
        options.extend(device_specific);
        options.extend(device_builtins);

        let mut seen = HashSet::new();
        for spec in &options {
            if !seen.insert(spec.name()) {
                return Err(LaunchError::Schema(format!(
                    "option '--{}' is defined more than once for {}",
                    spec.name(),
                    selector
                )));
            }
        }

        Ok(Self {
            selector,
            pass,
            options,
        })
    }

    /// Schemas for all four targets, in walk order.
    pub fn build_all(pass: ParsePass, extra: &ExtraArgs) -> Result<Vec<OptionSchema>> {
        DeviceSelector::ALL
            .iter()
            .map(|selector| Self::build(*selector, pass, extra))
            .collect()
    }

    pub fn selector(&self) -> DeviceSelector {
        self.selector
    }

    pub fn pass(&self) -> ParsePass {
        self.pass
    }

    pub fn options(&self) -> &[OptionSpec] {
        &self.options
    }

    pub fn get(&self, name: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|spec| spec.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(|spec| spec.name())
    }

    /// Every option mapped to the value it takes when not given.
    pub fn defaults(&self) -> Params {
        self.options
            .iter()
            .map(|spec| (Value::from(spec.name()), spec.default_for(self.pass)))
            .collect()
    }
}
