//! Realms installed in one graph, by name.

use std::collections::HashMap;
use std::sync::Arc;

use security_realm_sdk::SecurityRealmClient;
use service_graph::{ServiceGraph, ServiceHandle};
use tokio::sync::Mutex;
use tracing::info;

use super::environment::RealmEnvironment;
use super::error::DomainError;
use super::installer::{InstalledRealm, RealmInstaller};
use crate::config::{MechanismPolicy, SecurityRealmConfig};
use crate::definition::RealmDefinition;
use crate::spec::RealmSpec;

pub struct SecurityRealms {
    graph: Arc<ServiceGraph>,
    installer: RealmInstaller,
    policy: MechanismPolicy,
    // Held across installation so two adds of one name cannot race.
    realms: Mutex<HashMap<String, InstalledRealm>>,
}

impl SecurityRealms {
    #[must_use]
    pub fn new(graph: Arc<ServiceGraph>, env: RealmEnvironment, policy: MechanismPolicy) -> Self {
        Self {
            graph,
            installer: RealmInstaller::new(env),
            policy,
            realms: Mutex::new(HashMap::new()),
        }
    }

    /// Creates the registry and installs every configured realm, in order.
    /// `normal_server` from the configuration overrides the environment's.
    ///
    /// # Errors
    ///
    /// The first realm that fails stops the process; realms installed before
    /// it stay installed.
    pub async fn from_config(
        graph: Arc<ServiceGraph>,
        env: RealmEnvironment,
        config: SecurityRealmConfig,
    ) -> Result<Self, DomainError> {
        let env = env.with_normal_server(config.normal_server);
        let realms = Self::new(graph, env, config.mechanism_policy);
        let count = config.realms.len();
        for definition in config.realms {
            realms.add(definition).await?;
        }
        info!(count, "Configured security realms installed");
        Ok(realms)
    }

    #[must_use]
    pub fn graph(&self) -> &Arc<ServiceGraph> {
        &self.graph
    }

    /// Validates and installs a realm.
    ///
    /// # Errors
    ///
    /// - [`DomainError::Configuration`] if the definition is inconsistent
    /// - [`DomainError::RealmExists`] if the name is taken
    /// - any installation error of [`RealmInstaller::install`]
    pub async fn add(
        &self,
        definition: RealmDefinition,
    ) -> Result<ServiceHandle<dyn SecurityRealmClient>, DomainError> {
        let spec = RealmSpec::from_definition(definition, self.policy)?;
        self.add_spec(&spec).await
    }

    /// # Errors
    ///
    /// See [`SecurityRealms::add`].
    pub async fn add_spec(
        &self,
        spec: &RealmSpec,
    ) -> Result<ServiceHandle<dyn SecurityRealmClient>, DomainError> {
        let mut realms = self.realms.lock().await;
        if realms.contains_key(&spec.name) {
            return Err(DomainError::RealmExists(spec.name.clone()));
        }
        let installed = self.installer.install(&self.graph, spec).await?;
        let handle = installed.realm.clone();
        realms.insert(spec.name.clone(), installed);
        Ok(handle)
    }

    /// # Errors
    ///
    /// [`DomainError::RealmNotFound`] if no realm has that name.
    pub async fn remove(&self, name: &str) -> Result<(), DomainError> {
        let installed = self
            .realms
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| DomainError::RealmNotFound(name.to_owned()))?;
        RealmInstaller::remove(&self.graph, &installed).await;
        Ok(())
    }

    /// The realm capability.
    ///
    /// # Errors
    ///
    /// - [`DomainError::RealmNotFound`] if no realm has that name
    /// - [`DomainError::Activation`] if the realm node cannot be started
    pub async fn get(&self, name: &str) -> Result<Arc<dyn SecurityRealmClient>, DomainError> {
        let handle = self
            .realms
            .lock()
            .await
            .get(name)
            .map(|installed| installed.realm.clone())
            .ok_or_else(|| DomainError::RealmNotFound(name.to_owned()))?;
        Ok(handle.get().await?)
    }

    /// Installed realm names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.realms.lock().await.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}
