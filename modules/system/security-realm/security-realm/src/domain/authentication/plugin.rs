//! Authentication delegated to a plug-in found by the realm's loader.

use std::sync::Arc;

use async_trait::async_trait;
use security_realm_sdk::{
    AuthMechanism, AuthenticatedSubject, AuthenticationPlugIn, CallbackHandler, Credential,
    PlugInProperties, SecurityRealmError,
};
use service_graph::{ActivationError, Service, ServiceHandle};

use super::{RegisteredHandler, password_credential, rejected};
use crate::domain::context::BuildContext;
use crate::domain::error::DomainError;
use crate::domain::names;
use crate::domain::plugin_loader::PlugInLoader;
use crate::spec::PlugInAuthenticationSpec;

pub struct PlugInAuthenticationService {
    name: String,
    properties: PlugInProperties,
    mechanism: AuthMechanism,
    loader: ServiceHandle<PlugInLoader>,
}

#[async_trait]
impl Service for PlugInAuthenticationService {
    type Value = dyn CallbackHandler;

    async fn start(&self) -> Result<Arc<dyn CallbackHandler>, ActivationError> {
        let plug_in = self
            .loader
            .get()
            .await?
            .authentication_plugin(&self.name, &self.properties)
            .ok_or_else(|| {
                ActivationError::failed(format!("no authentication plug-in named '{}'", self.name))
            })?;
        Ok(Arc::new(PlugInCallbackHandler {
            plug_in,
            mechanism: self.mechanism,
        }))
    }
}

pub struct PlugInCallbackHandler {
    plug_in: Arc<dyn AuthenticationPlugIn>,
    mechanism: AuthMechanism,
}

#[async_trait]
impl CallbackHandler for PlugInCallbackHandler {
    fn mechanism(&self) -> AuthMechanism {
        self.mechanism
    }

    async fn authenticate(
        &self,
        credential: &Credential,
    ) -> Result<AuthenticatedSubject, SecurityRealmError> {
        let (username, password) = password_credential(credential)?;
        if self.plug_in.verify(username, password).await? {
            Ok(AuthenticatedSubject::new(username, self.mechanism))
        } else {
            Err(rejected(username))
        }
    }
}

/// # Errors
///
/// [`DomainError::Expression`] if a property cannot be resolved.
pub fn resolve(
    cx: &mut BuildContext<'_, '_>,
    spec: &PlugInAuthenticationSpec,
    loader: &ServiceHandle<PlugInLoader>,
) -> Result<RegisteredHandler, DomainError> {
    let service = PlugInAuthenticationService {
        name: spec.plug_in.name.clone(),
        properties: cx.plug_in_properties(&spec.plug_in)?,
        mechanism: spec.mechanism,
        loader: loader.clone(),
    };
    let name = cx.name(names::PLUG_IN_AUTHENTICATION);
    let handle = cx.tx.add_service(name, service).depends_on(loader).install()?;
    Ok(RegisteredHandler {
        mechanism: spec.mechanism,
        handle,
    })
}
