#![allow(dead_code)]

//! Collaborators a host would publish, backed by memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use security_realm::SecurityRealmConfig;
use security_realm::domain::names;
use security_realm_sdk::{
    AuthenticationPlugIn, AuthorizationPlugIn, ExpressionResolver, LdapConnection,
    LdapConnectionManager, LdapEntry, LdapSearch, LoginContextFactory, NamedPath,
    PlugInModuleLoader, PlugInProperties, PlugInProvider, SearchScope, SecurityRealmError,
    ServerSecurityManager,
};
use service_graph::ServiceGraph;

pub struct FixedPath(pub PathBuf);

impl NamedPath for FixedPath {
    fn path(&self) -> &Path {
        &self.0
    }
}

/// Directory holding entries and the passwords of bindable DNs.
#[derive(Default)]
pub struct Directory {
    entries: Vec<LdapEntry>,
    passwords: HashMap<String, String>,
    pub connects: AtomicUsize,
    pub binds: AtomicUsize,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entry(mut self, entry: LdapEntry) -> Self {
        self.entries.push(entry);
        self
    }

    #[must_use]
    pub fn user(mut self, uid: &str, base: &str, password: &str, groups: &[&str]) -> Self {
        let dn = format!("uid={uid},{base}");
        self.passwords.insert(dn.clone(), password.to_owned());
        self.entries.push(
            LdapEntry::new(dn)
                .with_attribute("uid", &[uid])
                .with_attribute("memberOf", groups),
        );
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn find(&self, search: &LdapSearch) -> Vec<LdapEntry> {
        if search.scope == SearchScope::Base {
            return self
                .entries
                .iter()
                .filter(|e| e.dn.eq_ignore_ascii_case(&search.base_dn))
                .cloned()
                .collect();
        }
        let inner = search.filter.trim_start_matches('(').trim_end_matches(')');
        let (attr, value) = inner.split_once('=').unwrap();
        self.entries
            .iter()
            .filter(|e| e.dn.ends_with(&search.base_dn) && e.values(attr).contains(&value))
            .cloned()
            .collect()
    }
}

struct Connection(Arc<Directory>);

#[async_trait]
impl LdapConnection for Connection {
    async fn search(&self, search: &LdapSearch) -> Result<Vec<LdapEntry>, SecurityRealmError> {
        Ok(self.0.find(search))
    }
}

pub struct DirectoryManager(pub Arc<Directory>);

#[async_trait]
impl LdapConnectionManager for DirectoryManager {
    async fn connect(&self) -> Result<Arc<dyn LdapConnection>, SecurityRealmError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Connection(Arc::clone(&self.0))))
    }

    async fn bind(
        &self,
        dn: &str,
        password: &SecretString,
    ) -> Result<Arc<dyn LdapConnection>, SecurityRealmError> {
        self.0.binds.fetch_add(1, Ordering::SeqCst);
        match self.0.passwords.get(dn) {
            Some(expected) if expected == password.expose_secret() => {
                Ok(Arc::new(Connection(Arc::clone(&self.0))))
            }
            _ => Err(SecurityRealmError::Unauthorized(format!("bind failed for {dn}"))),
        }
    }
}

/// Security manager accepting one domain's fixed password.
pub struct StaticSecurityManager {
    pub domain: String,
    pub password: String,
}

#[async_trait]
impl ServerSecurityManager for StaticSecurityManager {
    async fn authenticate(
        &self,
        security_domain: &str,
        _username: &str,
        password: &SecretString,
    ) -> Result<bool, SecurityRealmError> {
        Ok(security_domain == self.domain && password.expose_secret() == self.password)
    }
}

/// Resolves expressions from a fixed table and counts every lookup.
#[derive(Default)]
pub struct TableExpressions {
    values: HashMap<String, String>,
    calls: AtomicUsize,
}

impl TableExpressions {
    pub fn new(values: &[(&str, &str)]) -> Self {
        Self {
            values: values
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExpressionResolver for TableExpressions {
    fn resolve(&self, expression: &str) -> Result<String, SecurityRealmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.values
            .get(expression)
            .cloned()
            .ok_or_else(|| SecurityRealmError::Internal(format!("no value for {expression}")))
    }
}

/// Login-module chains that each accept one password.
#[derive(Default)]
pub struct StaticLoginContexts {
    chains: HashMap<String, String>,
    pub logins: AtomicUsize,
}

impl StaticLoginContexts {
    #[must_use]
    pub fn chain(mut self, name: &str, password: &str) -> Self {
        self.chains.insert(name.to_owned(), password.to_owned());
        self
    }
}

#[async_trait]
impl LoginContextFactory for StaticLoginContexts {
    async fn login(
        &self,
        name: &str,
        _username: &str,
        password: &SecretString,
    ) -> Result<bool, SecurityRealmError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let expected = self
            .chains
            .get(name)
            .ok_or_else(|| SecurityRealmError::NotConfigured(format!("no login chain '{name}'")))?;
        Ok(expected == password.expose_secret())
    }
}

struct PasswordPlugIn(String);

#[async_trait]
impl AuthenticationPlugIn for PasswordPlugIn {
    async fn verify(
        &self,
        _username: &str,
        password: &SecretString,
    ) -> Result<bool, SecurityRealmError> {
        Ok(password.expose_secret() == self.0)
    }
}

struct GroupsPlugIn(Vec<String>);

#[async_trait]
impl AuthorizationPlugIn for GroupsPlugIn {
    async fn groups(&self, _principal: &str) -> Result<Vec<String>, SecurityRealmError> {
        Ok(self.0.clone())
    }
}

/// Provider offering one authentication and one authorization plug-in under
/// the same name. The password and groups come from the plug-in properties.
pub struct PropertyPlugIns {
    pub name: String,
    pub seen: Mutex<Vec<PlugInProperties>>,
}

impl PropertyPlugIns {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn property(properties: &PlugInProperties, key: &str) -> String {
        properties.get(key).cloned().flatten().unwrap_or_default()
    }
}

impl PlugInProvider for PropertyPlugIns {
    fn authentication_plugin(
        &self,
        name: &str,
        properties: &PlugInProperties,
    ) -> Option<Arc<dyn AuthenticationPlugIn>> {
        (name == self.name).then(|| {
            self.seen.lock().push(properties.clone());
            Arc::new(PasswordPlugIn(Self::property(properties, "password"))) as Arc<dyn AuthenticationPlugIn>
        })
    }

    fn authorization_plugin(
        &self,
        name: &str,
        properties: &PlugInProperties,
    ) -> Option<Arc<dyn AuthorizationPlugIn>> {
        (name == self.name).then(|| {
            self.seen.lock().push(properties.clone());
            let groups = Self::property(properties, "groups")
                .split(',')
                .filter(|g| !g.is_empty())
                .map(str::to_owned)
                .collect();
            Arc::new(GroupsPlugIn(groups)) as Arc<dyn AuthorizationPlugIn>
        })
    }
}

/// Plug-in modules held in memory; counts loads.
#[derive(Default)]
pub struct MemoryModules {
    modules: HashMap<String, Vec<Arc<dyn PlugInProvider>>>,
    loads: AtomicUsize,
}

impl MemoryModules {
    #[must_use]
    pub fn module(mut self, name: &str, provider: Arc<dyn PlugInProvider>) -> Self {
        self.modules.entry(name.to_owned()).or_default().push(provider);
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl PlugInModuleLoader for MemoryModules {
    fn load(&self, module: &str) -> Result<Vec<Arc<dyn PlugInProvider>>, SecurityRealmError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.modules
            .get(module)
            .cloned()
            .ok_or_else(|| SecurityRealmError::NotConfigured(format!("no module '{module}'")))
    }
}

pub async fn publish_directory(graph: &ServiceGraph, name: &str, directory: &Arc<Directory>) {
    let manager: Arc<dyn LdapConnectionManager> = Arc::new(DirectoryManager(Arc::clone(directory)));
    graph
        .publish_value(names::ldap_connection(name), manager)
        .await
        .unwrap();
}

pub async fn publish_path(graph: &ServiceGraph, token: &str, dir: &Path) {
    let path: Arc<dyn NamedPath> = Arc::new(FixedPath(dir.to_path_buf()));
    graph.publish_value(names::path(token), path).await.unwrap();
}

pub fn config(yaml: &str) -> SecurityRealmConfig {
    SecurityRealmConfig::from_yaml(yaml).unwrap()
}
