//! Domain models for the security realm module.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::collaborators::LdapConnection;

/// Mechanism a callback handler verifies credentials for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMechanism {
    /// Clear text username and password.
    Plain,
    /// Digest over `user:realm:password`; the handler may compare hashes.
    Digest,
    /// Client certificate validated against the realm truststore.
    ClientCert,
    /// Same-machine principal.
    Local,
}

/// How a group is identified, both when searching and when reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupName {
    /// The group entry's distinguished name.
    DistinguishedName,
    /// A plain name read from the group-name attribute.
    #[default]
    Simple,
}

/// A credential presented to a realm.
#[derive(Debug, Clone)]
pub enum Credential {
    Password {
        username: String,
        password: SecretString,
    },
    /// A same-machine caller, optionally naming the user it acts as.
    Local { username: Option<String> },
    /// A TLS client whose certificate chain was already validated against
    /// the realm truststore.
    ClientCertificate { subject_dn: String },
}

impl Credential {
    #[must_use]
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    #[must_use]
    pub fn local(username: Option<&str>) -> Self {
        Self::Local {
            username: username.map(str::to_owned),
        }
    }

    #[must_use]
    pub fn client_certificate(subject_dn: impl Into<String>) -> Self {
        Self::ClientCertificate {
            subject_dn: subject_dn.into(),
        }
    }

    /// Name the caller claims, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Password { username, .. } => Some(username),
            Self::Local { username } => username.as_deref(),
            Self::ClientCertificate { subject_dn } => Some(subject_dn),
        }
    }
}

/// Outcome of a successful credential verification.
///
/// When the realm shares one directory connection between authentication and
/// authorization, the connection that verified the user travels with the
/// subject so the group search reuses it.
#[derive(Clone)]
pub struct AuthenticatedSubject {
    principal: String,
    mechanism: AuthMechanism,
    user_dn: Option<String>,
    ldap_connection: Option<Arc<dyn LdapConnection>>,
}

impl AuthenticatedSubject {
    #[must_use]
    pub fn new(principal: impl Into<String>, mechanism: AuthMechanism) -> Self {
        Self {
            principal: principal.into(),
            mechanism,
            user_dn: None,
            ldap_connection: None,
        }
    }

    #[must_use]
    pub fn with_user_dn(mut self, user_dn: impl Into<String>) -> Self {
        self.user_dn = Some(user_dn.into());
        self
    }

    #[must_use]
    pub fn with_ldap_connection(mut self, connection: Arc<dyn LdapConnection>) -> Self {
        self.ldap_connection = Some(connection);
        self
    }

    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    #[must_use]
    pub fn mechanism(&self) -> AuthMechanism {
        self.mechanism
    }

    /// Directory DN of the user, when a directory verified it.
    #[must_use]
    pub fn user_dn(&self) -> Option<&str> {
        self.user_dn.as_deref()
    }

    #[must_use]
    pub fn ldap_connection(&self) -> Option<&Arc<dyn LdapConnection>> {
        self.ldap_connection.as_ref()
    }
}

impl fmt::Debug for AuthenticatedSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedSubject")
            .field("principal", &self.principal)
            .field("mechanism", &self.mechanism)
            .field("user_dn", &self.user_dn)
            .field("shared_connection", &self.ldap_connection.is_some())
            .finish()
    }
}

/// Group and role memberships supplied for a verified principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Supplemental {
    pub groups: BTreeSet<String>,
    pub roles: BTreeSet<String>,
}

impl Supplemental {
    #[must_use]
    pub fn from_groups<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: groups.into_iter().map(Into::into).collect(),
            roles: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchScope {
    /// Only the base entry itself.
    Base,
    /// Direct children of the base DN.
    #[default]
    OneLevel,
    /// The whole subtree below the base DN.
    Subtree,
}

impl SearchScope {
    #[must_use]
    pub fn from_recursive(recursive: bool) -> Self {
        if recursive {
            Self::Subtree
        } else {
            Self::OneLevel
        }
    }
}

/// A directory search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapSearch {
    pub base_dn: String,
    pub filter: String,
    pub scope: SearchScope,
    /// Attributes to return; empty means all.
    pub attributes: Vec<String>,
}

impl LdapSearch {
    /// Reads the single entry named `dn`.
    #[must_use]
    pub fn entry(dn: impl Into<String>, attributes: &[&str]) -> Self {
        Self {
            base_dn: dn.into(),
            filter: "(objectClass=*)".to_owned(),
            scope: SearchScope::Base,
            attributes: attributes.iter().map(|a| (*a).to_owned()).collect(),
        }
    }
}

/// Value of the leading RDN of `dn` (`cn=admins,ou=groups` gives `admins`).
#[must_use]
pub fn rdn_value(dn: &str) -> &str {
    let rdn = dn.split(',').next().unwrap_or(dn);
    rdn.split_once('=').map_or(rdn, |(_, value)| value).trim()
}

/// A directory entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapEntry {
    pub dn: String,
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: &str, values: &[&str]) -> Self {
        self.attributes
            .entry(name.to_owned())
            .or_default()
            .extend(values.iter().map(|v| (*v).to_owned()));
        self
    }

    /// Values of `name`. The pseudo attribute `dn` yields the entry DN.
    #[must_use]
    pub fn values(&self, name: &str) -> Vec<&str> {
        if name.eq_ignore_ascii_case("dn") {
            return vec![self.dn.as_str()];
        }
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map_or_else(Vec::new, |(_, v)| v.iter().map(String::as_str).collect())
    }

    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name).into_iter().next()
    }
}

/// A loaded keystore or truststore.
#[derive(Clone)]
pub struct KeystoreMaterial {
    path: PathBuf,
    bytes: Vec<u8>,
    password: SecretString,
    alias: Option<String>,
    key_password: Option<SecretString>,
}

impl KeystoreMaterial {
    #[must_use]
    pub fn new(path: PathBuf, bytes: Vec<u8>, password: SecretString) -> Self {
        Self {
            path,
            bytes,
            password,
            alias: None,
            key_password: None,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias;
        self
    }

    #[must_use]
    pub fn with_key_password(mut self, key_password: Option<SecretString>) -> Self {
        self.key_password = key_password;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn password(&self) -> &SecretString {
        &self.password
    }

    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Password of the key entry; the store password when none was set.
    #[must_use]
    pub fn key_password(&self) -> &SecretString {
        self.key_password.as_ref().unwrap_or(&self.password)
    }
}

impl fmt::Debug for KeystoreMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeystoreMaterial")
            .field("path", &self.path)
            .field("len", &self.bytes.len())
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

/// TLS identity of a realm: protocol plus key and trust material.
#[derive(Debug, Clone)]
pub struct SslIdentity {
    protocol: String,
    key_store: Option<KeystoreMaterial>,
    trust_store: Option<KeystoreMaterial>,
}

impl SslIdentity {
    #[must_use]
    pub fn new(
        protocol: impl Into<String>,
        key_store: Option<KeystoreMaterial>,
        trust_store: Option<KeystoreMaterial>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            key_store,
            trust_store,
        }
    }

    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    #[must_use]
    pub fn key_store(&self) -> Option<&KeystoreMaterial> {
        self.key_store.as_ref()
    }

    #[must_use]
    pub fn trust_store(&self) -> Option<&KeystoreMaterial> {
        self.trust_store.as_ref()
    }
}

/// Shared secret the server presents when it connects to another server.
#[derive(Debug, Clone)]
pub struct SecretIdentity {
    secret: SecretString,
}

impl SecretIdentity {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    /// Builds a password credential for `username` from the secret.
    #[must_use]
    pub fn credential(&self, username: &str) -> Credential {
        Credential::Password {
            username: username.to_owned(),
            password: self.secret.clone(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn group_name_uses_wire_values() {
        assert_eq!(
            serde_json::to_string(&GroupName::DistinguishedName).unwrap(),
            "\"DISTINGUISHED_NAME\""
        );
        let simple: GroupName = serde_json::from_str("\"SIMPLE\"").unwrap();
        assert_eq!(simple, GroupName::Simple);
        let mech: AuthMechanism = serde_json::from_str("\"CLIENT_CERT\"").unwrap();
        assert_eq!(mech, AuthMechanism::ClientCert);
    }

    #[test]
    fn rdn_value_takes_leading_component() {
        assert_eq!(rdn_value("cn=admins,ou=groups,dc=example"), "admins");
        assert_eq!(rdn_value("admins"), "admins");
    }

    #[test]
    fn entry_dn_pseudo_attribute() {
        let entry = LdapEntry::new("uid=alice,dc=example").with_attribute("memberOf", &["cn=a", "cn=b"]);
        assert_eq!(entry.first("dn"), Some("uid=alice,dc=example"));
        assert_eq!(entry.values("memberof"), vec!["cn=a", "cn=b"]);
        assert!(entry.first("cn").is_none());
    }

    #[test]
    fn key_password_falls_back_to_store_password() {
        use secrecy::ExposeSecret;

        let material = KeystoreMaterial::new(PathBuf::from("/k"), vec![1], SecretString::from("store".to_owned()));
        assert_eq!(material.key_password().expose_secret(), "store");

        let material = material.with_key_password(Some(SecretString::from("key".to_owned())));
        assert_eq!(material.key_password().expose_secret(), "key");
    }
}
