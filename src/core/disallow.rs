// disallow.rs - Options that do not apply to the selected target

use std::collections::BTreeSet;

use serde_yaml::Value;

use crate::cli::{DeviceSelector, ExtraArgs, OptionSchema, ParsePass};
use crate::error::Result;
use crate::params::Params;

/// Sorted set of option names that are valid for some target but not the
/// selected one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disallowlist(BTreeSet<String>);

impl Disallowlist {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for Disallowlist {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Union of every target's options, each mapped to its second-pass default.
///
/// Schemas are folded in walk order, so a later target's default wins when
/// two targets disagree.
pub fn params_template(schemas: &[OptionSchema]) -> Params {
    let mut template = Params::new();
    for schema in schemas {
        for (key, default) in schema.defaults() {
            template.insert(key, default);
        }
    }
    template
}

/// Template names that are absent from `valid`.
fn difference<'a, I>(template: &Params, valid: I) -> Disallowlist
where
    I: IntoIterator<Item = &'a str>,
{
    let valid: BTreeSet<&str> = valid.into_iter().collect();
    template
        .keys()
        .filter_map(Value::as_str)
        .filter(|name| !valid.contains(name))
        .map(str::to_string)
        .collect()
}

/// Compute the params template and the options that `raw_args` (the first
/// parse for the selected target) does not accept.
///
/// CPU contributes nothing beyond the general options today but is walked
/// like every other target.
pub fn assemble_disallowlist(raw_args: &Params, extra: &ExtraArgs) -> Result<(Params, Disallowlist)> {
    let schemas = OptionSchema::build_all(ParsePass::Second, extra)?;
    let template = params_template(&schemas);
    let disallowed = difference(&template, raw_args.keys().filter_map(Value::as_str));
    Ok((template, disallowed))
}

/// Options that cannot be used with the named device and strategy.
pub fn discard_params(device: &str, strategy: Option<&str>, extra: &ExtraArgs) -> Result<Disallowlist> {
    let selector = DeviceSelector::from_names(device, strategy)?;
    let schemas = OptionSchema::build_all(ParsePass::Second, extra)?;
    let template = params_template(&schemas);
    let disallowed = schemas
        .iter()
        .find(|schema| schema.selector() == selector)
        .map(|schema| difference(&template, schema.names()))
        .unwrap_or_default();
    Ok(disallowed)
}
