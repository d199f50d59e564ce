use crate::{
    commands::Action,
    profile::{BindingOverride, Profile, ProfileRegistry},
    request::Target,
};

/// Concrete target together with its profile override.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ResolvedTarget {
    /// Target name passed to the build tool.
    pub name: String,

    /// Override applied on top of the selected profile.
    pub binding_override: Option<BindingOverride>,
}

impl ResolvedTarget {
    /// Profile used for this target only.
    pub fn profile(&self, selected: &Profile) -> Profile {
        match &self.binding_override {
            Some(binding_override) => selected.with_override(binding_override),
            None => selected.clone(),
        }
    }
}

/// Expand the requested target into the ordered list of concrete targets.
///
/// Wildcard expands into the catalogue. Catalogue names lose their separator
/// characters for the build action, as build tool target names do not
/// contain them.
pub(crate) fn resolve(
    registry: &ProfileRegistry,
    action: Action,
    target: &Target,
) -> Vec<ResolvedTarget> {
    let names = match target {
        Target::Named(name) => vec![name.clone()],
        Target::All if action == Action::Build => registry
            .catalogue()
            .iter()
            .map(|name| name.replace(registry.build_separator(), ""))
            .collect(),
        Target::All => registry.catalogue().to_vec(),
    };

    names
        .into_iter()
        .map(|name| ResolvedTarget {
            binding_override: registry.target_override(action, &name).cloned(),
            name,
        })
        .collect()
}
