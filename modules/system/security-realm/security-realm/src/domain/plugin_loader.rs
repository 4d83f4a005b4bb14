//! Loads the plug-in modules a realm lists and indexes their providers.

use std::sync::Arc;

use async_trait::async_trait;
use security_realm_sdk::{
    AuthenticationPlugIn, AuthorizationPlugIn, PlugInModuleLoader, PlugInProperties, PlugInProvider,
};
use service_graph::{ActivationError, Service, ServiceHandle};
use tracing::debug;

use super::context::BuildContext;
use super::error::DomainError;
use super::names;

/// Providers of every listed module, in listing order.
pub struct PlugInLoader {
    providers: Vec<Arc<dyn PlugInProvider>>,
}

impl PlugInLoader {
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn PlugInProvider>>) -> Self {
        Self { providers }
    }

    /// First provider offering an authentication plug-in named `name`.
    #[must_use]
    pub fn authentication_plugin(
        &self,
        name: &str,
        properties: &PlugInProperties,
    ) -> Option<Arc<dyn AuthenticationPlugIn>> {
        self.providers
            .iter()
            .find_map(|p| p.authentication_plugin(name, properties))
    }

    #[must_use]
    pub fn authorization_plugin(
        &self,
        name: &str,
        properties: &PlugInProperties,
    ) -> Option<Arc<dyn AuthorizationPlugIn>> {
        self.providers
            .iter()
            .find_map(|p| p.authorization_plugin(name, properties))
    }
}

pub struct PlugInLoaderService {
    modules: Vec<String>,
    loader: Arc<dyn PlugInModuleLoader>,
}

#[async_trait]
impl Service for PlugInLoaderService {
    type Value = PlugInLoader;

    async fn start(&self) -> Result<Arc<PlugInLoader>, ActivationError> {
        let mut providers = Vec::new();
        for module in &self.modules {
            let loaded = self
                .loader
                .load(module)
                .map_err(|e| ActivationError::failed(format!("plug-in module '{module}': {e}")))?;
            debug!(module = %module, providers = loaded.len(), "Loaded plug-in module");
            providers.extend(loaded);
        }
        Ok(Arc::new(PlugInLoader::new(providers)))
    }
}

/// Registers the loader node for the realm's `plug-in` list.
///
/// # Errors
///
/// [`DomainError::Configuration`] if the environment has no module loader.
pub fn resolve(
    cx: &mut BuildContext<'_, '_>,
    modules: &[String],
) -> Result<ServiceHandle<PlugInLoader>, DomainError> {
    let loader = cx.env.plug_in_modules.clone().ok_or_else(|| {
        DomainError::configuration(cx.realm, "plug-ins are listed but no module loader is available")
    })?;
    let name = cx.name(names::PLUG_IN_LOADER);
    let service = PlugInLoaderService {
        modules: modules.to_vec(),
        loader,
    };
    Ok(cx.tx.add_service(name, service).install()?)
}
