//! The realm node: aggregates its capability nodes behind
//! [`SecurityRealmClient`].

use std::sync::Arc;

use async_trait::async_trait;
use security_realm_sdk::{
    AuthMechanism, AuthenticatedSubject, Credential, SecretIdentity, SecurityRealmClient,
    SecurityRealmError, SslIdentity, SubjectSupplemental, Supplemental,
};
use service_graph::{ActivationError, Service, ServiceHandle};
use tracing::debug;

use super::authentication::RegisteredHandler;
use super::error::unavailable;

/// Handles to everything a realm was built with. Nothing here is started
/// until first used.
#[derive(Debug, Clone, Default)]
pub struct RealmCapabilities {
    pub handlers: Vec<RegisteredHandler>,
    pub supplemental: Option<ServiceHandle<dyn SubjectSupplemental>>,
    pub ssl: Option<ServiceHandle<SslIdentity>>,
    pub secret: Option<ServiceHandle<SecretIdentity>>,
}

pub struct RealmService {
    name: String,
    map_groups_to_roles: bool,
    capabilities: RealmCapabilities,
}

impl RealmService {
    #[must_use]
    pub fn new(name: &str, map_groups_to_roles: bool, capabilities: RealmCapabilities) -> Self {
        Self {
            name: name.to_owned(),
            map_groups_to_roles,
            capabilities,
        }
    }
}

#[async_trait]
impl Service for RealmService {
    type Value = dyn SecurityRealmClient;

    async fn start(&self) -> Result<Arc<dyn SecurityRealmClient>, ActivationError> {
        debug!(realm = %self.name, "Security realm started");
        Ok(Arc::new(Realm {
            name: self.name.clone(),
            map_groups_to_roles: self.map_groups_to_roles,
            capabilities: self.capabilities.clone(),
        }))
    }
}

pub struct Realm {
    name: String,
    map_groups_to_roles: bool,
    capabilities: RealmCapabilities,
}

impl Realm {
    fn handler_for(&self, credential: &Credential) -> Option<&RegisteredHandler> {
        let serves = |mechanism: AuthMechanism| match credential {
            Credential::Password { .. } => {
                matches!(mechanism, AuthMechanism::Plain | AuthMechanism::Digest)
            }
            Credential::Local { .. } => mechanism == AuthMechanism::Local,
            Credential::ClientCertificate { .. } => mechanism == AuthMechanism::ClientCert,
        };
        self.capabilities.handlers.iter().find(|h| serves(h.mechanism))
    }
}

#[async_trait]
impl SecurityRealmClient for Realm {
    fn name(&self) -> &str {
        &self.name
    }

    fn mechanisms(&self) -> Vec<AuthMechanism> {
        let mut mechanisms: Vec<_> = self.capabilities.handlers.iter().map(|h| h.mechanism).collect();
        mechanisms.sort_unstable();
        mechanisms.dedup();
        mechanisms
    }

    async fn authenticate(
        &self,
        credential: &Credential,
    ) -> Result<AuthenticatedSubject, SecurityRealmError> {
        let registered = self.handler_for(credential).ok_or_else(|| {
            SecurityRealmError::NotConfigured(format!(
                "realm '{}' has no handler for this credential",
                self.name
            ))
        })?;
        let handler = registered.handle.get().await.map_err(|e| unavailable(&e))?;
        handler.authenticate(credential).await
    }

    async fn supplemental(
        &self,
        subject: &AuthenticatedSubject,
    ) -> Result<Supplemental, SecurityRealmError> {
        let Some(handle) = &self.capabilities.supplemental else {
            return Ok(Supplemental::default());
        };
        let supplemental = handle.get().await.map_err(|e| unavailable(&e))?;
        let mut result = supplemental.supplemental(subject).await?;
        if self.map_groups_to_roles {
            result.roles.extend(result.groups.iter().cloned());
        }
        Ok(result)
    }

    async fn ssl_identity(&self) -> Result<Option<Arc<SslIdentity>>, SecurityRealmError> {
        match &self.capabilities.ssl {
            Some(handle) => Ok(Some(handle.get().await.map_err(|e| unavailable(&e))?)),
            None => Ok(None),
        }
    }

    async fn secret(&self) -> Result<Option<Arc<SecretIdentity>>, SecurityRealmError> {
        match &self.capabilities.secret {
            Some(handle) => Ok(Some(handle.get().await.map_err(|e| unavailable(&e))?)),
            None => Ok(None),
        }
    }
}
