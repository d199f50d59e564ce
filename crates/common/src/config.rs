use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

#[cfg(feature = "logging")]
use tracing_subscriber::filter::LevelFilter;

/// Shared configuration resource settings.
#[derive(Deserialize)]
pub struct Resource {
    /// Path to the constants file that receives placeholder substitutions.
    #[serde(default = "default_resource_path")]
    pub path: PathBuf,
}

impl Default for Resource {
    fn default() -> Self {
        Self {
            path: default_resource_path(),
        }
    }
}

/// External tool commands.
///
/// Each command is a program followed by its leading arguments,
/// the action-specific arguments are appended after them.
#[derive(Deserialize)]
pub struct Tools {
    /// Build, test and run tool.
    #[serde(default = "default_build_tool")]
    pub build: Vec<String>,

    /// Deploy function code extraction tool.
    #[serde(default = "default_extractor_tool")]
    pub extractor: Vec<String>,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            build: default_build_tool(),
            extractor: default_extractor_tool(),
        }
    }
}

/// Profile data location.
#[derive(Deserialize, Default)]
pub struct Profiles {
    /// Optional file merged over the built-in profile data.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Implementation of [`serde`]'s deserializer for [`FromStr`] types.
#[cfg(feature = "logging")]
fn deserialize_from_str<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error,
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    std::str::FromStr::from_str(&s).map_err(serde::de::Error::custom)
}

/// Logging configuration.
#[cfg(feature = "logging")]
#[derive(Deserialize)]
pub struct Logging {
    /// Log level.
    #[serde(deserialize_with = "deserialize_from_str")]
    pub level: LevelFilter,
}

#[cfg(feature = "logging")]
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
        }
    }
}

// Defaults match the layout of a blueprint-based contracts project.
fn default_resource_path() -> PathBuf {
    PathBuf::from("contracts/imports/constants.tolk")
}

fn default_build_tool() -> Vec<String> {
    vec![String::from("npx"), String::from("blueprint")]
}

fn default_extractor_tool() -> Vec<String> {
    vec![
        String::from("npx"),
        String::from("ts-node"),
        String::from("scripts/getDeployFunctionCode.ts"),
    ]
}

/// General configuration.
#[derive(Deserialize, Default)]
pub struct Config {
    /// Shared configuration resource.
    #[serde(default)]
    pub resource: Resource,

    /// External tool commands.
    #[serde(default)]
    pub tools: Tools,

    /// Profile data location.
    #[serde(default)]
    pub profiles: Profiles,

    /// Logging configuration.
    #[cfg(feature = "logging")]
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    /// Create new config using default configuration file or environment variables.
    ///
    /// See [`Env`] for more details on how to use environment variables configuration.
    ///
    /// [`Env`]: figment::providers::Env
    pub fn new(path: Option<PathBuf>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.unwrap_or(PathBuf::from("Manage.toml"))))
            .merge(Env::prefixed("MANAGE_").split("_"))
            .extract()
    }
}
