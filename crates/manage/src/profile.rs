use std::{
    collections::{BTreeMap, HashSet},
    env,
    path::Path,
};

use derive_more::{Display, Error, From};
use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::Deserialize;

use crate::{commands::Action, request::Flags};

/// Built-in profile data.
const DEFAULT_PROFILES: &str = include_str!("../profiles.toml");

/// Profile registry errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum RegistryError {
    /// Unable to parse profile data with [`figment`].
    Figment(figment::Error),

    /// Profile data file does not exist.
    #[display(fmt = "profile data file {} does not exist", _0)]
    #[from(ignore)]
    MissingFile(#[error(ignore)] String),

    /// One of the environment profiles is not defined.
    #[display(fmt = "profile {} is not defined", _0)]
    #[from(ignore)]
    MissingProfile(#[error(ignore)] Environment),

    /// The same token is bound twice in a single profile.
    #[display(fmt = "token {} is bound more than once in profile {}", token, profile)]
    #[from(ignore)]
    DuplicateToken {
        /// Profile name.
        profile: String,

        /// Duplicated token.
        token: String,
    },
}

/// Deployment environments with a dedicated profile.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub(crate) enum Environment {
    /// Local sandbox tests.
    #[display(fmt = "test")]
    Test,

    /// On-chain testnet.
    #[display(fmt = "testnet")]
    Testnet,

    /// On-chain mainnet.
    #[display(fmt = "mainnet")]
    Mainnet,
}

impl Environment {
    /// All environments, each of which must be present in profile data.
    const ALL: [Environment; 3] = [Self::Test, Self::Testnet, Self::Mainnet];
}

/// A single placeholder binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Binding {
    /// Placeholder token, including surrounding quotes.
    pub token: String,

    /// Substituted value.
    pub value: String,
}

/// Binding as stored in profile data.
#[derive(Deserialize)]
struct BindingData {
    /// Placeholder token.
    token: String,

    /// Literal value.
    value: String,

    /// Environment variable which replaces the literal value when set.
    #[serde(default)]
    env: Option<String>,
}

impl BindingData {
    /// Resolve the binding value against the current process environment.
    fn resolve(self) -> Binding {
        let value = self
            .env
            .and_then(|name| env::var(name).ok())
            .map(|value| format!("\"{value}\""))
            .unwrap_or(self.value);

        Binding {
            token: self.token,
            value,
        }
    }
}

/// Slot replacement as stored in profile data.
#[derive(Deserialize)]
struct OverrideData {
    /// Binding position inside of a profile.
    slot: usize,

    /// Replacement token.
    token: String,

    /// Literal replacement value.
    value: String,

    /// Environment variable which replaces the literal value when set.
    #[serde(default)]
    env: Option<String>,
}

impl From<OverrideData> for BindingOverride {
    fn from(data: OverrideData) -> Self {
        let Binding { token, value } = BindingData {
            token: data.token,
            value: data.value,
            env: data.env,
        }
        .resolve();

        Self {
            slot: data.slot,
            token,
            value,
        }
    }
}

/// Replacement of a single profile slot.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "OverrideData")]
pub(crate) struct BindingOverride {
    /// Binding position inside of a profile.
    pub slot: usize,

    /// Replacement token.
    pub token: String,

    /// Replacement value.
    pub value: String,
}

impl BindingOverride {
    /// Replacement binding.
    fn binding(&self) -> Binding {
        Binding {
            token: self.token.clone(),
            value: self.value.clone(),
        }
    }
}

/// Overrides applied to a single target.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct TargetOverrides {
    /// Override used by the build action.
    pub build: Option<BindingOverride>,

    /// Override used by every other action.
    pub default: Option<BindingOverride>,
}

/// Deploy function extraction settings.
#[derive(Deserialize)]
struct DeployFunctions {
    /// Override applied to the test profile with `--test`.
    test_override: BindingOverride,
}

/// Raw profile data.
#[derive(Deserialize)]
struct RegistryData {
    /// Ordered contract catalogue.
    catalogue: Vec<String>,

    /// Separator stripped from catalogue names before building.
    build_separator: char,

    /// Environment profiles.
    profiles: BTreeMap<String, Vec<BindingData>>,

    /// Deploy function extraction settings.
    deploy_functions: DeployFunctions,

    /// Per-target overrides.
    #[serde(default)]
    overrides: BTreeMap<String, TargetOverrides>,
}

/// Named, ordered collection of placeholder bindings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Profile {
    /// Profile name.
    name: String,

    /// Ordered bindings.
    bindings: Vec<Binding>,
}

impl Profile {
    /// Profile name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered bindings.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Copy this profile with a single slot replaced.
    ///
    /// Slots past the end of the profile are appended.
    pub fn with_override(&self, binding_override: &BindingOverride) -> Profile {
        let mut profile = self.clone();

        match profile.bindings.get_mut(binding_override.slot) {
            Some(binding) => *binding = binding_override.binding(),
            None => profile.bindings.push(binding_override.binding()),
        }

        profile
    }
}

/// Profiles, contract catalogue and per-target overrides.
pub(crate) struct ProfileRegistry {
    /// Environment profiles by name.
    profiles: BTreeMap<String, Profile>,

    /// Ordered contract catalogue.
    catalogue: Vec<String>,

    /// Separator stripped from catalogue names before building.
    build_separator: char,

    /// Override applied to the test profile for deploy function extraction.
    deploy_test_override: BindingOverride,

    /// Per-target overrides, keyed by lower-cased target name.
    overrides: BTreeMap<String, TargetOverrides>,
}

impl ProfileRegistry {
    /// Load built-in profile data, optionally merged with a user-provided file.
    pub fn load(path: Option<&Path>) -> Result<Self, RegistryError> {
        let mut figment = Figment::from(Toml::string(DEFAULT_PROFILES));

        if let Some(path) = path {
            if !path.exists() {
                return Err(RegistryError::MissingFile(path.display().to_string()));
            }

            figment = figment.merge(Toml::file(path));
        }

        Self::from_data(figment.extract()?)
    }

    /// Load profile data from a TOML string.
    #[cfg(test)]
    pub fn from_toml(data: &str) -> Result<Self, RegistryError> {
        Self::from_data(Figment::from(Toml::string(data)).extract()?)
    }

    /// Validate raw data and build the registry.
    fn from_data(data: RegistryData) -> Result<Self, RegistryError> {
        let mut profiles = BTreeMap::new();

        for (name, bindings) in data.profiles {
            let bindings: Vec<Binding> = bindings.into_iter().map(BindingData::resolve).collect();

            let duplicate = {
                let mut tokens = HashSet::new();
                bindings
                    .iter()
                    .find(|binding| !tokens.insert(binding.token.as_str()))
                    .map(|binding| binding.token.clone())
            };

            if let Some(token) = duplicate {
                return Err(RegistryError::DuplicateToken {
                    profile: name,
                    token,
                });
            }

            profiles.insert(name.clone(), Profile { name, bindings });
        }

        if let Some(environment) = Environment::ALL
            .into_iter()
            .find(|environment| !profiles.contains_key(&environment.to_string()))
        {
            return Err(RegistryError::MissingProfile(environment));
        }

        let overrides = data
            .overrides
            .into_iter()
            .map(|(target, overrides)| (target.to_lowercase(), overrides))
            .collect();

        Ok(Self {
            profiles,
            catalogue: data.catalogue,
            build_separator: data.build_separator,
            deploy_test_override: data.deploy_functions.test_override,
            overrides,
        })
    }

    /// Pristine copy of an environment profile.
    pub fn profile(&self, environment: Environment) -> Profile {
        // Presence of every environment is checked while loading.
        self.profiles[&environment.to_string()].clone()
    }

    /// Select the profile used for the whole request.
    ///
    /// Each call returns a fresh copy, so overrides applied to the result
    /// never leak into later selections.
    pub fn select_profile(&self, action: Action, flags: Flags) -> Profile {
        match action {
            Action::Test => self.profile(Environment::Test),
            Action::Build | Action::Run if flags.testnet => self.profile(Environment::Testnet),
            Action::Build | Action::Run => self.profile(Environment::Mainnet),
            Action::GetDeployFunctions if flags.test => self
                .profile(Environment::Test)
                .with_override(&self.deploy_test_override),
            Action::GetDeployFunctions => self.profile(Environment::Mainnet),
        }
    }

    /// Ordered contract catalogue.
    pub fn catalogue(&self) -> &[String] {
        &self.catalogue
    }

    /// Separator stripped from catalogue names before building.
    pub fn build_separator(&self) -> char {
        self.build_separator
    }

    /// Override registered for the target, if any.
    pub fn target_override(&self, action: Action, target: &str) -> Option<&BindingOverride> {
        let overrides = self.overrides.get(&target.to_lowercase())?;

        match action {
            Action::Build => overrides.build.as_ref(),
            _ => overrides.default.as_ref(),
        }
    }
}
