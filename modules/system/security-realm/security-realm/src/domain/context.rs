//! State shared by the resolvers while one realm is being built.

use secrecy::SecretString;
use security_realm_sdk::{NamedPath, PlugInProperties};
use service_graph::{ServiceHandle, ServiceName, Transaction};

use super::environment::RealmEnvironment;
use super::error::DomainError;
use super::files::ConfiguredFile;
use super::names;
use crate::spec::{ConfigValue, FileSpec, PlugInSpec};

pub struct BuildContext<'t, 'g> {
    pub tx: &'t mut Transaction<'g>,
    pub realm: &'t str,
    pub env: &'t RealmEnvironment,
}

impl<'t, 'g> BuildContext<'t, 'g> {
    #[must_use]
    pub fn new(tx: &'t mut Transaction<'g>, realm: &'t str, env: &'t RealmEnvironment) -> Self {
        Self { tx, realm, env }
    }

    /// Name of a node owned by the realm being built.
    #[must_use]
    pub fn name(&self, segment: &str) -> ServiceName {
        names::child(self.realm, segment)
    }

    /// Handle to a node published by the host.
    ///
    /// # Errors
    ///
    /// [`DomainError::Resolution`] if the node is missing or has another type.
    pub fn external<T>(&self, name: &ServiceName) -> Result<ServiceHandle<T>, DomainError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Ok(self.tx.lookup::<T>(name)?)
    }

    /// Turns a deferred value into a literal.
    ///
    /// # Errors
    ///
    /// [`DomainError::Expression`] if the value is an expression and no
    /// resolver is available or resolution fails.
    pub fn resolve(&self, value: &ConfigValue) -> Result<String, DomainError> {
        match value {
            ConfigValue::Literal(literal) => Ok(literal.clone()),
            ConfigValue::Expression(expression) => {
                let resolver = self.env.expressions.as_ref().ok_or_else(|| DomainError::Expression {
                    expression: expression.clone(),
                    reason: "no expression resolver available".to_owned(),
                })?;
                resolver
                    .resolve(expression)
                    .map_err(|e| DomainError::Expression {
                        expression: expression.clone(),
                        reason: e.to_string(),
                    })
            }
        }
    }

    /// # Errors
    ///
    /// See [`BuildContext::resolve`].
    pub fn resolve_secret(&self, value: &ConfigValue) -> Result<SecretString, DomainError> {
        self.resolve(value).map(SecretString::from)
    }

    /// Resolved property map of a plug-in.
    ///
    /// # Errors
    ///
    /// See [`BuildContext::resolve`].
    pub fn plug_in_properties(&self, spec: &PlugInSpec) -> Result<PlugInProperties, DomainError> {
        spec.properties
            .iter()
            .map(|(name, value)| {
                value
                    .as_ref()
                    .map(|v| self.resolve(v))
                    .transpose()
                    .map(|value| (name.clone(), value))
            })
            .collect()
    }

    /// Binds a file spec to the named path it is relative to.
    ///
    /// # Errors
    ///
    /// [`DomainError::Resolution`] if the named path is not published.
    pub fn file(&self, spec: &FileSpec) -> Result<ConfiguredFile, DomainError> {
        let relative_to = spec
            .relative_to
            .as_deref()
            .map(|token| self.external::<dyn NamedPath>(&names::path(token)))
            .transpose()?;
        Ok(ConfiguredFile::new(&spec.path, relative_to))
    }
}
