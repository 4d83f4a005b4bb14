//! Collaborators the host hands to the installer directly.
//!
//! Everything else the realm needs (named paths, directory connections, the
//! server security manager) is published into the service graph.

use std::fmt;
use std::sync::Arc;

use security_realm_sdk::{ExpressionResolver, LoginContextFactory, PlugInModuleLoader};

#[derive(Clone, Default)]
pub struct RealmEnvironment {
    /// Running inside a full server rather than a bare management process.
    pub normal_server: bool,
    pub expressions: Option<Arc<dyn ExpressionResolver>>,
    pub login_contexts: Option<Arc<dyn LoginContextFactory>>,
    pub plug_in_modules: Option<Arc<dyn PlugInModuleLoader>>,
}

impl RealmEnvironment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_normal_server(mut self, normal_server: bool) -> Self {
        self.normal_server = normal_server;
        self
    }

    #[must_use]
    pub fn with_expressions(mut self, resolver: Arc<dyn ExpressionResolver>) -> Self {
        self.expressions = Some(resolver);
        self
    }

    #[must_use]
    pub fn with_login_contexts(mut self, factory: Arc<dyn LoginContextFactory>) -> Self {
        self.login_contexts = Some(factory);
        self
    }

    #[must_use]
    pub fn with_plug_in_modules(mut self, loader: Arc<dyn PlugInModuleLoader>) -> Self {
        self.plug_in_modules = Some(loader);
        self
    }
}

impl fmt::Debug for RealmEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmEnvironment")
            .field("normal_server", &self.normal_server)
            .field("expressions", &self.expressions.is_some())
            .field("login_contexts", &self.login_contexts.is_some())
            .field("plug_in_modules", &self.plug_in_modules.is_some())
            .finish()
    }
}
