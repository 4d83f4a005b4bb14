//! Configuration for the security realm module.

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::Deserialize;

use crate::definition::RealmDefinition;

/// Module configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityRealmConfig {
    /// Running embedded in a full server. JAAS authentication then
    /// verifies through the server's security manager instead of a login
    /// context.
    pub normal_server: bool,

    /// What to do when an authentication section names more than one
    /// primary mechanism.
    pub mechanism_policy: MechanismPolicy,

    /// Realms installed at startup.
    pub realms: Vec<RealmDefinition>,
}

impl Default for SecurityRealmConfig {
    fn default() -> Self {
        Self {
            normal_server: false,
            mechanism_policy: MechanismPolicy::Strict,
            realms: Vec::new(),
        }
    }
}

/// Handling of several primary authentication mechanisms in one realm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MechanismPolicy {
    /// Reject the realm.
    #[default]
    Strict,
    /// Use the first in the order JAAS, LDAP, plug-in, properties, users and
    /// ignore the rest.
    Precedence,
}

impl SecurityRealmConfig {
    /// Environment prefix for overrides, e.g. `SECURITY_REALM__NORMAL_SERVER=true`.
    pub const ENV_PREFIX: &'static str = "SECURITY_REALM__";

    /// Loads the YAML file at `path`, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file is malformed or a value has
    /// the wrong shape.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::extract(Figment::new().merge(Yaml::file(path.as_ref())))
    }

    /// Parses YAML text, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the text is malformed or a value has
    /// the wrong shape.
    pub fn from_yaml(yaml: &str) -> Result<Self, Box<figment::Error>> {
        Self::extract(Figment::new().merge(Yaml::string(yaml)))
    }

    fn extract(figment: Figment) -> Result<Self, Box<figment::Error>> {
        figment
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }
}
