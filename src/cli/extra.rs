// extra.rs - Options contributed by model code

use crate::cli::device::DeviceKey;
use crate::cli::options::{OptionSpec, USER_DEFINED_HEADING};

/// A bag of extra options, optionally with its own help heading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgFragment {
    title: Option<String>,
    options: Vec<OptionSpec>,
}

impl ArgFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            options: Vec::new(),
        }
    }

    pub fn option(mut self, spec: OptionSpec) -> Self {
        self.options.push(spec);
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn options(&self) -> &[OptionSpec] {
        &self.options
    }
}

/// What an extra-args provider returns.
///
/// Ungrouped fragments (`Single`, `List`) apply to every device and are shown
/// under the user-defined heading. `ByDevice` fragments apply only to the
/// schemas matching their key, `DeviceKey::Any` meaning all of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ExtraArgs {
    #[default]
    None,
    Single(ArgFragment),
    List(Vec<ArgFragment>),
    ByDevice(Vec<(DeviceKey, Vec<ArgFragment>)>),
}

impl ExtraArgs {
    /// Resolve the contributed options for one device schema, with their
    /// targets and help headings filled in.
    pub fn options_for(&self, key: DeviceKey) -> Vec<OptionSpec> {
        match self {
            ExtraArgs::None => Vec::new(),
            ExtraArgs::Single(fragment) => ungrouped(std::slice::from_ref(fragment)),
            ExtraArgs::List(fragments) => ungrouped(fragments),
            ExtraArgs::ByDevice(groups) => groups
                .iter()
                .filter(|(group_key, _)| group_key.matches(key))
                .flat_map(|(group_key, fragments)| {
                    fragments.iter().flat_map(move |fragment| {
                        let heading = fragment.title().unwrap_or(USER_DEFINED_HEADING);
                        fragment.options().iter().map(move |spec| {
                            let spec = spec.clone().targets(&[*group_key]);
                            match spec.help_heading() {
                                Some(_) => spec,
                                None => spec.heading(heading),
                            }
                        })
                    })
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ExtraArgs::None => true,
            ExtraArgs::Single(fragment) => fragment.options().is_empty(),
            ExtraArgs::List(fragments) => fragments.iter().all(|f| f.options().is_empty()),
            ExtraArgs::ByDevice(groups) => groups
                .iter()
                .all(|(_, fragments)| fragments.iter().all(|f| f.options().is_empty())),
        }
    }
}

impl From<ArgFragment> for ExtraArgs {
    fn from(fragment: ArgFragment) -> Self {
        ExtraArgs::Single(fragment)
    }
}

impl From<Vec<ArgFragment>> for ExtraArgs {
    fn from(fragments: Vec<ArgFragment>) -> Self {
        ExtraArgs::List(fragments)
    }
}

/// Ungrouped fragments always land under the user-defined heading.
fn ungrouped(fragments: &[ArgFragment]) -> Vec<OptionSpec> {
    fragments
        .iter()
        .flat_map(|fragment| fragment.options().iter())
        .map(|spec| {
            spec.clone()
                .targets(&[DeviceKey::Any])
                .heading(USER_DEFINED_HEADING)
        })
        .collect()
}
