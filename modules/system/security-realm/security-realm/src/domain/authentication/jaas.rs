//! JAAS authentication: delegates to a named login-module chain.

use std::sync::Arc;

use async_trait::async_trait;
use security_realm_sdk::{
    AuthMechanism, AuthenticatedSubject, CallbackHandler, Credential, LoginContextFactory,
    SecurityRealmError, ServerSecurityManager,
};
use service_graph::{ActivationError, Service, ServiceHandle};

use super::{RegisteredHandler, password_credential, rejected};
use crate::domain::context::BuildContext;
use crate::domain::error::DomainError;
use crate::domain::names;
use crate::spec::JaasSpec;

/// Where the login-module chain runs.
#[derive(Clone)]
enum Backend {
    /// The full server's security manager, verifying against a domain.
    SecurityManager(ServiceHandle<dyn ServerSecurityManager>),
    /// A login context created for every attempt.
    LoginContext(Arc<dyn LoginContextFactory>),
}

enum Verifier {
    SecurityManager(Arc<dyn ServerSecurityManager>),
    LoginContext(Arc<dyn LoginContextFactory>),
}

pub struct JaasService {
    name: String,
    backend: Backend,
}

#[async_trait]
impl Service for JaasService {
    type Value = dyn CallbackHandler;

    async fn start(&self) -> Result<Arc<dyn CallbackHandler>, ActivationError> {
        let verifier = match &self.backend {
            Backend::SecurityManager(manager) => Verifier::SecurityManager(manager.get().await?),
            Backend::LoginContext(factory) => Verifier::LoginContext(Arc::clone(factory)),
        };
        Ok(Arc::new(JaasCallbackHandler {
            name: self.name.clone(),
            verifier,
        }))
    }
}

pub struct JaasCallbackHandler {
    name: String,
    verifier: Verifier,
}

#[async_trait]
impl CallbackHandler for JaasCallbackHandler {
    fn mechanism(&self) -> AuthMechanism {
        AuthMechanism::Plain
    }

    async fn authenticate(
        &self,
        credential: &Credential,
    ) -> Result<AuthenticatedSubject, SecurityRealmError> {
        let (username, password) = password_credential(credential)?;
        let verified = match &self.verifier {
            Verifier::SecurityManager(manager) => {
                manager.authenticate(&self.name, username, password).await?
            }
            Verifier::LoginContext(factory) => factory.login(&self.name, username, password).await?,
        };
        if verified {
            Ok(AuthenticatedSubject::new(username, AuthMechanism::Plain))
        } else {
            Err(rejected(username))
        }
    }
}

/// Registers the JAAS handler. In a full server it depends on the security
/// manager node; otherwise the environment must supply login contexts.
///
/// # Errors
///
/// - [`DomainError::Resolution`] if the security manager is not published
/// - [`DomainError::Configuration`] if no login context factory is available
pub fn resolve(
    cx: &mut BuildContext<'_, '_>,
    spec: &JaasSpec,
) -> Result<RegisteredHandler, DomainError> {
    let backend = if cx.env.normal_server {
        Backend::SecurityManager(cx.external::<dyn ServerSecurityManager>(&names::security_manager())?)
    } else {
        let factory = cx.env.login_contexts.clone().ok_or_else(|| {
            DomainError::configuration(cx.realm, "JAAS authentication needs a login context factory")
        })?;
        Backend::LoginContext(factory)
    };

    let name = cx.name(names::JAAS);
    let service = JaasService {
        name: spec.name.clone(),
        backend: backend.clone(),
    };
    let mut builder = cx.tx.add_service(name, service);
    if let Backend::SecurityManager(manager) = &backend {
        builder = builder.depends_on(manager);
    }
    Ok(RegisteredHandler {
        mechanism: AuthMechanism::Plain,
        handle: builder.install()?,
    })
}
