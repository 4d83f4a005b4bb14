//! Builds a realm into the service graph as one transaction.

use security_realm_sdk::SecurityRealmClient;
use service_graph::{ActivationMode, ServiceGraph, ServiceHandle, ServiceName, Transaction};
use tracing::{debug, info, warn};

use super::authentication;
use super::authorization;
use super::broker::share_ldap_connection;
use super::context::BuildContext;
use super::environment::RealmEnvironment;
use super::error::DomainError;
use super::names;
use super::plugin_loader;
use super::realm::{RealmCapabilities, RealmService};
use super::trust;
use crate::spec::RealmSpec;

/// A realm present in the graph.
#[derive(Debug, Clone)]
pub struct InstalledRealm {
    pub name: String,
    pub realm: ServiceHandle<dyn SecurityRealmClient>,
    /// Every node created for the realm, in registration order.
    pub services: Vec<ServiceName>,
}

#[derive(Debug, Clone, Default)]
pub struct RealmInstaller {
    env: RealmEnvironment,
}

impl RealmInstaller {
    #[must_use]
    pub fn new(env: RealmEnvironment) -> Self {
        Self { env }
    }

    #[must_use]
    pub fn env(&self) -> &RealmEnvironment {
        &self.env
    }

    /// Resolves every section of `spec`, registers the nodes and publishes
    /// them together. On any error nothing of the realm stays in the graph.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] if a dependency is missing, a value cannot
    /// be resolved, a file cannot be opened or the realm node fails to start.
    #[tracing::instrument(skip_all, fields(realm = %spec.name))]
    pub async fn install(
        &self,
        graph: &ServiceGraph,
        spec: &RealmSpec,
    ) -> Result<InstalledRealm, DomainError> {
        let mut tx = graph.transaction();
        let realm = match self.stage(&mut tx, spec).await {
            Ok(realm) => realm,
            Err(e) => {
                warn!(error = %e, staged = tx.len(), "Security realm resolution failed");
                tx.rollback();
                return Err(e);
            }
        };

        let services = tx.commit().await?;
        info!(services = services.len(), "Security realm installed");
        Ok(InstalledRealm {
            name: spec.name.clone(),
            realm,
            services,
        })
    }

    async fn stage(
        &self,
        tx: &mut Transaction<'_>,
        spec: &RealmSpec,
    ) -> Result<ServiceHandle<dyn SecurityRealmClient>, DomainError> {
        let mut cx = BuildContext::new(tx, &spec.name, &self.env);

        let share = share_ldap_connection(spec.authentication.as_ref(), spec.authorization.as_ref());
        if share {
            debug!("Authentication and authorization share an LDAP connection");
        }

        let loader = spec
            .plug_ins
            .as_deref()
            .map(|modules| plugin_loader::resolve(&mut cx, modules))
            .transpose()?;

        let mut capabilities = RealmCapabilities::default();
        if let Some(authentication) = &spec.authentication {
            capabilities.handlers =
                authentication::resolve(&mut cx, authentication, share, loader.as_ref())?;
        }
        if let Some(authorization) = &spec.authorization {
            capabilities.supplemental = Some(authorization::resolve(
                &mut cx,
                authorization,
                share,
                loader.as_ref(),
            )?);
        }
        let identities =
            trust::resolve(&mut cx, spec.server_identity.as_ref(), spec.truststore()).await?;
        capabilities.ssl = identities.ssl;
        capabilities.secret = identities.secret;

        let service = RealmService::new(&spec.name, spec.map_groups_to_roles, capabilities.clone());
        let mut builder = cx
            .tx
            .add_service(names::realm(&spec.name), service)
            .initial_mode(ActivationMode::Active);
        for handler in &capabilities.handlers {
            builder = builder.references(&handler.handle);
        }
        if let Some(supplemental) = &capabilities.supplemental {
            builder = builder.references(supplemental);
        }
        if let Some(ssl) = &capabilities.ssl {
            builder = builder.references(ssl);
        }
        if let Some(secret) = &capabilities.secret {
            builder = builder.references(secret);
        }
        Ok(builder.install()?)
    }

    /// Stops and removes every node of `realm`, dependents first.
    #[tracing::instrument(skip_all, fields(realm = %realm.name))]
    pub async fn remove(graph: &ServiceGraph, realm: &InstalledRealm) {
        let removed = graph.remove_all(&realm.services).await;
        info!(services = removed.len(), "Security realm removed");
    }
}
