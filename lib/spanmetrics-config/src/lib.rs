//! Layered configuration loading.
//!
//! Configuration is assembled from YAML documents and prefixed environment variables, with later sources overriding
//! earlier ones, and then deserialized into whatever typed configuration a component declares.
#![deny(missing_docs)]

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use figment::{
    error::Kind,
    providers::{Env, Format as _, Serialized, Yaml},
    value::{Dict, Map},
    Figment, Profile, Provider as _,
};
use serde::Deserialize;
use snafu::{ResultExt as _, Snafu};

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// A configuration file could not be read.
    #[snafu(display("Failed to read configuration file '{}'.", path.display()))]
    ReadFile {
        /// Path of the file.
        path: PathBuf,

        /// Error source.
        source: io::Error,
    },

    /// A configuration source could not be parsed.
    #[snafu(display("Failed to parse configuration from {}.", origin))]
    Parse {
        /// Where the configuration came from.
        origin: String,

        /// Error source.
        source: figment::Error,
    },

    /// A required field was missing from the configuration.
    #[snafu(display("Missing field '{}' in configuration. {}", field, help_text))]
    MissingField {
        /// Period-separated path to the missing field.
        field: String,

        /// Help text describing how to set the missing field.
        help_text: String,
    },

    /// A field's data type was not the expected data type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Period-separated path to the invalid field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Any other deserialization failure.
    #[snafu(display("Invalid configuration."))]
    Invalid {
        /// Error source.
        source: figment::Error,
    },
}

/// A configuration loader that can pull from various sources.
///
/// Sources added later take precedence over sources added earlier. Nested maps are merged key by key, and arrays from
/// a later source are appended to those of an earlier one.
///
/// # Supported sources
///
/// - YAML file or string
/// - environment variables (must be prefixed; see [`from_environment`][Self::from_environment])
pub struct ConfigurationLoader {
    figment: Figment,
    env_prefix: Option<String>,
}

impl Default for ConfigurationLoader {
    fn default() -> Self {
        Self {
            figment: Figment::new(),
            env_prefix: None,
        }
    }
}

impl ConfigurationLoader {
    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid YAML, an error will be returned.
    pub fn from_yaml<P>(self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(ReadFile { path })?;
        let data = Yaml::string(&contents).data().context(Parse {
            origin: format!("'{}'", path.display()),
        })?;
        Ok(self.with_data(data))
    }

    /// Loads YAML configuration from a string.
    ///
    /// # Errors
    ///
    /// If the string is not valid YAML, an error will be returned.
    pub fn from_yaml_str(self, contents: &str) -> Result<Self, ConfigurationError> {
        let data = Yaml::string(contents).data().context(Parse { origin: "inline YAML" })?;
        Ok(self.with_data(data))
    }

    /// Loads configuration from environment variables.
    ///
    /// The prefix given will have an underscore appended to it if it does not already end with one, and is
    /// case-insensitive. Nested keys are separated by a double underscore: with a prefix of `app`, `APP_CACHE__SIZE`
    /// sets `cache.size`.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, or the environment could not be read, an error will be returned.
    pub fn from_environment(mut self, prefix: &'static str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = if prefix.ends_with('_') {
            prefix.to_uppercase()
        } else {
            format!("{}_", prefix.to_uppercase())
        };

        let data = Env::prefixed(&prefix).split("__").data().context(Parse {
            origin: format!("environment variables prefixed with '{}'", prefix),
        })?;
        self.env_prefix = Some(prefix);
        Ok(self.with_data(data))
    }

    /// Consumes the configuration loader and wraps it in a generic wrapper.
    pub fn into_generic(self) -> GenericConfiguration {
        GenericConfiguration {
            inner: Arc::new(Inner {
                figment: self.figment,
                env_prefix: self.env_prefix,
            }),
        }
    }

    fn with_data(mut self, data: Map<Profile, Dict>) -> Self {
        if let Some(dict) = data.get(&Profile::Default) {
            self.figment = self.figment.admerge(Serialized::defaults(dict.clone()));
        }
        self
    }
}

#[derive(Debug)]
struct Inner {
    figment: Figment,
    env_prefix: Option<String>,
}

/// The merged configuration produced by a [`ConfigurationLoader`].
#[derive(Clone, Debug)]
pub struct GenericConfiguration {
    inner: Arc<Inner>,
}

impl GenericConfiguration {
    /// Attempts to deserialize the entire configuration as `T`.
    ///
    /// ## Errors
    ///
    /// If the value could not be deserialized into `T`, an error will be returned.
    pub fn as_typed<'a, T>(&self) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.inner.figment.extract().map_err(|e| self.convert_error(e))
    }

    fn convert_error(&self, e: figment::Error) -> ConfigurationError {
        match e.kind {
            Kind::MissingField(ref field) => {
                let field = e.path.iter().map(String::as_str).chain([&**field]).collect::<Vec<_>>();
                let key = field.join(".");
                let help_text = match &self.inner.env_prefix {
                    Some(prefix) => {
                        let env_key = field.join("__").to_uppercase();
                        format!("Try setting `{}` or `{}{}`.", key, prefix, env_key)
                    }
                    None => format!("Try setting `{}`.", key),
                };
                ConfigurationError::MissingField { field: key, help_text }
            }
            Kind::InvalidType(ref actual_ty, ref expected_ty) => ConfigurationError::InvalidFieldType {
                field: e.path.join("."),
                expected_ty: expected_ty.clone(),
                actual_ty: actual_ty.to_string(),
            },
            _ => ConfigurationError::Invalid { source: e },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Cache {
        size: usize,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Config {
        namespace: String,
        cache: Cache,
    }

    #[test]
    fn later_sources_take_precedence() {
        let config = ConfigurationLoader::default()
            .from_yaml_str("namespace: traces\ncache:\n  size: 10\n")
            .unwrap()
            .from_yaml_str("cache:\n  size: 20\n")
            .unwrap()
            .into_generic();

        assert_eq!(
            config.as_typed::<Config>().unwrap(),
            Config {
                namespace: "traces".to_string(),
                cache: Cache { size: 20 },
            }
        );
    }

    #[test]
    fn environment_overrides_nested_keys() {
        std::env::set_var("SPANMETRICS_CONFIG_TEST_CACHE__SIZE", "42");

        let config = ConfigurationLoader::default()
            .from_yaml_str("namespace: traces\ncache:\n  size: 10\n")
            .unwrap()
            .from_environment("spanmetrics_config_test")
            .unwrap()
            .into_generic();

        std::env::remove_var("SPANMETRICS_CONFIG_TEST_CACHE__SIZE");

        assert_eq!(config.as_typed::<Config>().unwrap().cache, Cache { size: 42 });
    }

    #[test]
    fn missing_field_suggests_environment_variable() {
        let config = ConfigurationLoader::default()
            .from_yaml_str("namespace: traces\ncache: {}\n")
            .unwrap()
            .from_environment("SPANMETRICS_CONFIG_MISSING")
            .unwrap()
            .into_generic();

        match config.as_typed::<Config>() {
            Err(ConfigurationError::MissingField { field, help_text }) => {
                assert_eq!(field, "cache.size");
                assert!(help_text.contains("SPANMETRICS_CONFIG_MISSING_CACHE__SIZE"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn invalid_type_is_reported_with_path() {
        let config = ConfigurationLoader::default()
            .from_yaml_str("namespace: traces\ncache:\n  size: lots\n")
            .unwrap()
            .into_generic();

        assert!(matches!(
            config.as_typed::<Config>(),
            Err(ConfigurationError::InvalidFieldType { .. })
        ));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        assert!(matches!(
            ConfigurationLoader::default().from_environment(""),
            Err(ConfigurationError::EmptyPrefix)
        ));
    }

    #[test]
    fn unreadable_or_malformed_sources_are_errors() {
        assert!(matches!(
            ConfigurationLoader::default().from_yaml("/nonexistent/spanmetrics.yaml"),
            Err(ConfigurationError::ReadFile { .. })
        ));
        assert!(matches!(
            ConfigurationLoader::default().from_yaml_str("a: [1, 2"),
            Err(ConfigurationError::Parse { .. })
        ));
    }
}
