//! Typed, validated description of one realm.
//!
//! Mutually exclusive choices are sum types, so every resolver matches
//! exhaustively and an inconsistent realm cannot be represented.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use security_realm_sdk::{AuthMechanism, GroupName};

use crate::config::MechanismPolicy;
use crate::definition::{
    AuthenticationDefinition, AuthorizationDefinition, GroupSearchDefinition,
    LdapAuthenticationDefinition, LdapAuthorizationDefinition, LocalDefinition,
    PlugInAuthenticationDefinition, PlugInAuthorizationDefinition, RealmDefinition,
    ServerIdentityDefinition, SslDefinition, TruststoreDefinition, UsernameToDnDefinition,
};
use crate::domain::error::DomainError;

const DEFAULT_PROTOCOL: &str = "TLS";
const DEFAULT_DN_ATTRIBUTE: &str = "dn";
const DEFAULT_GROUP_NAME_ATTRIBUTE: &str = "uid";
const DEFAULT_PRINCIPAL_ATTRIBUTE: &str = "member";
const DEFAULT_GROUP_ATTRIBUTE: &str = "memberOf";

/// A configuration value that may be deferred.
///
/// Anything containing `${` is an expression and is resolved just before it
/// is baked into a node.
#[derive(Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Literal(String),
    Expression(String),
}

impl ConfigValue {
    #[must_use]
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.contains("${") {
            Self::Expression(raw)
        } else {
            Self::Literal(raw)
        }
    }

    #[must_use]
    pub fn is_expression(&self) -> bool {
        matches!(self, Self::Expression(_))
    }
}

impl std::fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Literals are often passwords.
        match self {
            Self::Literal(_) => f.write_str("Literal(***)"),
            Self::Expression(e) => f.debug_tuple("Expression").field(e).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RealmSpec {
    pub name: String,
    /// Plug-in modules; `Some` creates the realm's plug-in loader.
    pub plug_ins: Option<Vec<String>>,
    pub authentication: Option<AuthenticationSpec>,
    pub authorization: Option<AuthorizationSpec>,
    pub server_identity: Option<ServerIdentitySpec>,
    pub map_groups_to_roles: bool,
}

/// Independent authentication sub-configs.
#[derive(Debug, Clone, Default)]
pub struct AuthenticationSpec {
    /// Certificate fallback; coexists with everything else.
    pub truststore: Option<KeystoreSpec>,
    pub local: Option<LocalSpec>,
    pub primary: Option<PrimaryMechanism>,
}

#[derive(Debug, Clone)]
pub enum PrimaryMechanism {
    Jaas(JaasSpec),
    Ldap(LdapAuthenticationSpec),
    PlugIn(PlugInAuthenticationSpec),
    Properties(PropertiesAuthenticationSpec),
    Users(UsersSpec),
}

impl PrimaryMechanism {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Jaas(_) => "jaas",
            Self::Ldap(_) => "ldap",
            Self::PlugIn(_) => "plug-in",
            Self::Properties(_) => "properties",
            Self::Users(_) => "users",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSpec {
    pub default_user: Option<String>,
    pub allowed_users: AllowedUsers,
}

/// Local principals allowed in besides the default user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AllowedUsers {
    #[default]
    None,
    All,
    Listed(BTreeSet<String>),
}

impl AllowedUsers {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::None,
            Some("*") => Self::All,
            Some(list) => Self::Listed(
                list.split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_owned)
                    .collect(),
            ),
        }
    }

    #[must_use]
    pub fn allows(&self, user: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Listed(users) => users.contains(user),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JaasSpec {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapAuthenticationSpec {
    pub connection: String,
    pub base_dn: String,
    pub user_filter: UserFilter,
    pub recursive: bool,
    pub allow_empty_passwords: bool,
    pub user_dn: String,
}

/// How the login name is matched against directory entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFilter {
    /// `(attribute=<username>)`.
    UsernameAttribute(String),
    /// Custom filter with `{0}` standing for the username.
    Advanced(String),
}

impl UserFilter {
    /// Filter template with a `{0}` placeholder.
    #[must_use]
    pub fn template(&self) -> String {
        match self {
            Self::UsernameAttribute(attr) if attr.contains("{0}") => attr.clone(),
            Self::UsernameAttribute(attr) => format!("({attr}={{0}})"),
            Self::Advanced(filter) => filter.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlugInSpec {
    pub name: String,
    pub properties: BTreeMap<String, Option<ConfigValue>>,
}

#[derive(Debug, Clone)]
pub struct PlugInAuthenticationSpec {
    pub plug_in: PlugInSpec,
    pub mechanism: AuthMechanism,
}

/// A file, optionally relative to a named path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub path: String,
    pub relative_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertiesAuthenticationSpec {
    pub file: FileSpec,
    pub plain_text: bool,
}

#[derive(Debug, Clone)]
pub struct UsersSpec {
    pub users: BTreeMap<String, ConfigValue>,
}

#[derive(Debug, Clone)]
pub enum AuthorizationSpec {
    Properties(FileSpec),
    PlugIn(PlugInSpec),
    Ldap(LdapAuthorizationSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapAuthorizationSpec {
    pub connection: String,
    pub username_to_dn: Option<UsernameToDnSpec>,
    pub group_search: LdapGroupSearchSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsernameToDnSpec {
    UsernameIsDn { force: bool },
    UsernameFilter(UserSearchSpec),
    AdvancedFilter(AdvancedUserSearchSpec),
}

impl UsernameToDnSpec {
    #[must_use]
    pub fn force(&self) -> bool {
        match self {
            Self::UsernameIsDn { force } => *force,
            Self::UsernameFilter(s) => s.force,
            Self::AdvancedFilter(s) => s.force,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSearchSpec {
    pub base_dn: String,
    pub recursive: bool,
    pub user_dn_attribute: String,
    pub attribute: String,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvancedUserSearchSpec {
    pub base_dn: String,
    pub recursive: bool,
    pub user_dn_attribute: String,
    pub filter: String,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LdapGroupSearchSpec {
    GroupToPrincipal(GroupToPrincipalSpec),
    PrincipalToGroup(PrincipalToGroupSpec),
}

impl LdapGroupSearchSpec {
    #[must_use]
    pub fn group_name(&self) -> GroupName {
        match self {
            Self::GroupToPrincipal(s) => s.group_name,
            Self::PrincipalToGroup(s) => s.group_name,
        }
    }

    #[must_use]
    pub fn iterative(&self) -> bool {
        match self {
            Self::GroupToPrincipal(s) => s.iterative,
            Self::PrincipalToGroup(s) => s.iterative,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupToPrincipalSpec {
    pub base_dn: String,
    pub group_dn_attribute: String,
    pub group_name: GroupName,
    pub group_name_attribute: String,
    pub iterative: bool,
    pub principal_attribute: String,
    pub recursive: bool,
    /// How the principal is named in the search filter; independent of
    /// `group_name`.
    pub search_by: GroupName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalToGroupSpec {
    pub group_attribute: String,
    pub group_dn_attribute: String,
    pub group_name: GroupName,
    pub group_name_attribute: String,
    pub iterative: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ServerIdentitySpec {
    pub ssl: Option<SslSpec>,
    pub secret: Option<ConfigValue>,
}

#[derive(Debug, Clone)]
pub struct SslSpec {
    pub protocol: String,
    pub keystore: Option<KeystoreSpec>,
}

#[derive(Debug, Clone)]
pub struct KeystoreSpec {
    pub file: FileSpec,
    pub password: ConfigValue,
    pub key_password: Option<ConfigValue>,
    pub alias: Option<String>,
}

impl RealmSpec {
    /// Validates a definition and converts it to the typed form.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Configuration`] if a required field is missing
    /// or mutually exclusive sections are both present. Several primary
    /// authentication mechanisms are an error under
    /// [`MechanismPolicy::Strict`]; under [`MechanismPolicy::Precedence`] the
    /// first one wins and a warning is logged.
    pub fn from_definition(
        definition: RealmDefinition,
        policy: MechanismPolicy,
    ) -> Result<Self, DomainError> {
        let RealmDefinition {
            name,
            plug_in,
            authentication,
            authorization,
            server_identity,
            map_groups_to_roles,
        } = definition;

        if name.trim().is_empty() {
            return Err(DomainError::configuration("", "realm name is empty"));
        }
        let cx = Cx { realm: &name };

        let authentication = authentication
            .map(|a| cx.authentication(a, policy))
            .transpose()?;
        let authorization = authorization.map(|a| cx.authorization(a)).transpose()?.flatten();
        let server_identity = server_identity.map(|s| cx.server_identity(s)).transpose()?;

        Ok(Self {
            plug_ins: plug_in,
            authentication,
            authorization,
            server_identity,
            map_groups_to_roles: map_groups_to_roles.unwrap_or(true),
            name,
        })
    }

    /// Truststore reference of the certificate fallback, if any.
    #[must_use]
    pub fn truststore(&self) -> Option<&KeystoreSpec> {
        self.authentication.as_ref()?.truststore.as_ref()
    }
}

/// Conversion context; carries the realm name into error messages.
struct Cx<'a> {
    realm: &'a str,
}

impl Cx<'_> {
    fn err(&self, reason: impl Into<String>) -> DomainError {
        DomainError::configuration(self.realm, reason)
    }

    fn require(&self, value: Option<String>, field: &str) -> Result<String, DomainError> {
        value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| self.err(format!("'{field}' is required")))
    }

    fn authentication(
        &self,
        def: AuthenticationDefinition,
        policy: MechanismPolicy,
    ) -> Result<AuthenticationSpec, DomainError> {
        let AuthenticationDefinition {
            truststore,
            local,
            jaas,
            ldap,
            plug_in,
            properties,
            users,
        } = def;

        let truststore = truststore.map(|t| self.truststore(t)).transpose()?;
        let local = local.map(Self::local);

        // Precedence order.
        let present: Vec<&str> = [
            jaas.as_ref().map(|_| "jaas"),
            ldap.as_ref().map(|_| "ldap"),
            plug_in.as_ref().map(|_| "plug-in"),
            properties.as_ref().map(|_| "properties"),
            users.as_ref().map(|_| "users"),
        ]
        .into_iter()
        .flatten()
        .collect();
        if present.len() > 1 {
            match policy {
                MechanismPolicy::Strict => {
                    return Err(self.err(format!(
                        "only one authentication mechanism may be defined, found {}",
                        present.join(", ")
                    )));
                }
                MechanismPolicy::Precedence => {
                    warn!(
                        realm = self.realm,
                        selected = present[0],
                        ignored = ?&present[1..],
                        "Several authentication mechanisms defined, using the first"
                    );
                }
            }
        }

        // Only the selected section is validated; the others are ignored.
        let primary = if let Some(jaas) = jaas {
            Some(PrimaryMechanism::Jaas(JaasSpec {
                name: self.require(jaas.name, "authentication.jaas.name")?,
            }))
        } else if let Some(ldap) = ldap {
            Some(PrimaryMechanism::Ldap(self.ldap_authentication(ldap)?))
        } else if let Some(plug_in) = plug_in {
            Some(PrimaryMechanism::PlugIn(self.plug_in_authentication(plug_in)?))
        } else if let Some(props) = properties {
            Some(PrimaryMechanism::Properties(PropertiesAuthenticationSpec {
                file: FileSpec {
                    path: self.require(props.path, "authentication.properties.path")?,
                    relative_to: props.relative_to,
                },
                plain_text: props.plain_text.unwrap_or(false),
            }))
        } else if let Some(users) = users {
            Some(PrimaryMechanism::Users(UsersSpec {
                users: users
                    .user
                    .into_iter()
                    .map(|(name, user)| {
                        user.password
                            .map(|p| (name.clone(), ConfigValue::parse(p)))
                            .ok_or_else(|| self.err(format!("user '{name}' has no password")))
                    })
                    .collect::<Result<_, DomainError>>()?,
            }))
        } else {
            None
        };

        Ok(AuthenticationSpec {
            truststore,
            local,
            primary,
        })
    }

    fn truststore(&self, def: TruststoreDefinition) -> Result<KeystoreSpec, DomainError> {
        Ok(KeystoreSpec {
            file: FileSpec {
                path: self.require(def.keystore_path, "authentication.truststore.keystore-path")?,
                relative_to: def.relative_to,
            },
            password: ConfigValue::parse(
                self.require(def.keystore_password, "authentication.truststore.keystore-password")?,
            ),
            key_password: None,
            alias: None,
        })
    }

    fn local(def: LocalDefinition) -> LocalSpec {
        LocalSpec {
            allowed_users: AllowedUsers::parse(def.allowed_users.as_deref()),
            default_user: def.default_user,
        }
    }

    fn ldap_authentication(
        &self,
        def: LdapAuthenticationDefinition,
    ) -> Result<LdapAuthenticationSpec, DomainError> {
        let user_filter = match (def.username_attribute, def.advanced_filter) {
            (Some(attr), None) => UserFilter::UsernameAttribute(attr),
            (None, Some(filter)) => UserFilter::Advanced(filter),
            (Some(_), Some(_)) => {
                return Err(self.err(
                    "authentication.ldap defines both 'username-filter' and 'advanced-filter'",
                ));
            }
            (None, None) => {
                return Err(self.err(
                    "authentication.ldap requires one of 'username-filter' or 'advanced-filter'",
                ));
            }
        };

        Ok(LdapAuthenticationSpec {
            connection: self.require(def.connection, "authentication.ldap.connection")?,
            base_dn: self.require(def.base_dn, "authentication.ldap.base-dn")?,
            user_filter,
            recursive: def.recursive.unwrap_or(false),
            allow_empty_passwords: def.allow_empty_passwords.unwrap_or(false),
            user_dn: def.user_dn.unwrap_or_else(|| DEFAULT_DN_ATTRIBUTE.to_owned()),
        })
    }

    fn plug_in_authentication(
        &self,
        def: PlugInAuthenticationDefinition,
    ) -> Result<PlugInAuthenticationSpec, DomainError> {
        Ok(PlugInAuthenticationSpec {
            plug_in: PlugInSpec {
                name: self.require(def.name, "authentication.plug-in.name")?,
                properties: plug_in_properties(def.properties),
            },
            mechanism: def.mechanism.unwrap_or(AuthMechanism::Digest),
        })
    }

    fn authorization(
        &self,
        def: AuthorizationDefinition,
    ) -> Result<Option<AuthorizationSpec>, DomainError> {
        let AuthorizationDefinition {
            properties,
            plug_in,
            ldap,
        } = def;

        let defined = [properties.is_some(), plug_in.is_some(), ldap.is_some()]
            .into_iter()
            .filter(|d| *d)
            .count();
        if defined > 1 {
            return Err(self.err("only one authorization mechanism may be defined"));
        }

        if let Some(props) = properties {
            return Ok(Some(AuthorizationSpec::Properties(FileSpec {
                path: self.require(props.path, "authorization.properties.path")?,
                relative_to: props.relative_to,
            })));
        }
        if let Some(PlugInAuthorizationDefinition { name, properties }) = plug_in {
            return Ok(Some(AuthorizationSpec::PlugIn(PlugInSpec {
                name: self.require(name, "authorization.plug-in.name")?,
                properties: plug_in_properties(properties),
            })));
        }
        ldap.map(|l| self.ldap_authorization(l).map(AuthorizationSpec::Ldap))
            .transpose()
    }

    fn ldap_authorization(
        &self,
        def: LdapAuthorizationDefinition,
    ) -> Result<LdapAuthorizationSpec, DomainError> {
        let group_search = def
            .group_search
            .ok_or_else(|| self.err("authorization.ldap requires 'group-search'"))?;

        Ok(LdapAuthorizationSpec {
            connection: self.require(def.connection, "authorization.ldap.connection")?,
            username_to_dn: def
                .username_to_dn
                .map(|u| self.username_to_dn(u))
                .transpose()?,
            group_search: self.group_search(group_search)?,
        })
    }

    fn username_to_dn(&self, def: UsernameToDnDefinition) -> Result<UsernameToDnSpec, DomainError> {
        match (def.username_is_dn, def.username_filter, def.advanced_filter) {
            (Some(is_dn), None, None) => Ok(UsernameToDnSpec::UsernameIsDn {
                force: is_dn.force.unwrap_or(false),
            }),
            (None, Some(filter), None) => Ok(UsernameToDnSpec::UsernameFilter(UserSearchSpec {
                base_dn: self.require(filter.base_dn, "username-filter.base-dn")?,
                recursive: filter.recursive.unwrap_or(false),
                user_dn_attribute: filter
                    .user_dn_attribute
                    .unwrap_or_else(|| DEFAULT_DN_ATTRIBUTE.to_owned()),
                attribute: self.require(filter.attribute, "username-filter.attribute")?,
                force: filter.force.unwrap_or(false),
            })),
            (None, None, Some(advanced)) => {
                Ok(UsernameToDnSpec::AdvancedFilter(AdvancedUserSearchSpec {
                    base_dn: self.require(advanced.base_dn, "advanced-filter.base-dn")?,
                    recursive: advanced.recursive.unwrap_or(false),
                    user_dn_attribute: advanced
                        .user_dn_attribute
                        .unwrap_or_else(|| DEFAULT_DN_ATTRIBUTE.to_owned()),
                    filter: self.require(advanced.filter, "advanced-filter.filter")?,
                    force: advanced.force.unwrap_or(false),
                }))
            }
            (None, None, None) => Err(self.err("'username-to-dn' defines no mode")),
            _ => Err(self.err("'username-to-dn' defines more than one mode")),
        }
    }

    fn group_search(&self, def: GroupSearchDefinition) -> Result<LdapGroupSearchSpec, DomainError> {
        match (def.group_to_principal, def.principal_to_group) {
            (Some(g), None) => Ok(LdapGroupSearchSpec::GroupToPrincipal(GroupToPrincipalSpec {
                base_dn: self.require(g.base_dn, "group-to-principal.base-dn")?,
                group_dn_attribute: g
                    .group_dn_attribute
                    .unwrap_or_else(|| DEFAULT_DN_ATTRIBUTE.to_owned()),
                group_name: g.group_name.unwrap_or_default(),
                group_name_attribute: g
                    .group_name_attribute
                    .unwrap_or_else(|| DEFAULT_GROUP_NAME_ATTRIBUTE.to_owned()),
                iterative: g.iterative.unwrap_or(false),
                principal_attribute: g
                    .principal_attribute
                    .unwrap_or_else(|| DEFAULT_PRINCIPAL_ATTRIBUTE.to_owned()),
                recursive: g.recursive.unwrap_or(false),
                search_by: g.search_by.unwrap_or(GroupName::DistinguishedName),
            })),
            (None, Some(p)) => Ok(LdapGroupSearchSpec::PrincipalToGroup(PrincipalToGroupSpec {
                group_attribute: p
                    .group_attribute
                    .unwrap_or_else(|| DEFAULT_GROUP_ATTRIBUTE.to_owned()),
                group_dn_attribute: p
                    .group_dn_attribute
                    .unwrap_or_else(|| DEFAULT_DN_ATTRIBUTE.to_owned()),
                group_name: p.group_name.unwrap_or_default(),
                group_name_attribute: p
                    .group_name_attribute
                    .unwrap_or_else(|| DEFAULT_GROUP_NAME_ATTRIBUTE.to_owned()),
                iterative: p.iterative.unwrap_or(false),
            })),
            (Some(_), Some(_)) => Err(self.err(
                "'group-search' defines both 'group-to-principal' and 'principal-to-group'",
            )),
            (None, None) => Err(self.err("'group-search' defines no direction")),
        }
    }

    fn server_identity(
        &self,
        def: ServerIdentityDefinition,
    ) -> Result<ServerIdentitySpec, DomainError> {
        let secret = def
            .secret
            .map(|s| self.require(s.value, "server-identity.secret.value"))
            .transpose()?
            .map(ConfigValue::parse);
        let ssl = def.ssl.map(|s| self.ssl(s)).transpose()?;
        Ok(ServerIdentitySpec { ssl, secret })
    }

    fn ssl(&self, def: SslDefinition) -> Result<SslSpec, DomainError> {
        let SslDefinition {
            protocol,
            keystore_path,
            keystore_password,
            key_password,
            alias,
            relative_to,
        } = def;

        let keystore = match keystore_path {
            Some(path) => Some(KeystoreSpec {
                file: FileSpec { path, relative_to },
                password: ConfigValue::parse(
                    self.require(keystore_password, "server-identity.ssl.keystore-password")?,
                ),
                key_password: key_password.map(ConfigValue::parse),
                alias,
            }),
            None => None,
        };

        Ok(SslSpec {
            protocol: protocol.unwrap_or_else(|| DEFAULT_PROTOCOL.to_owned()),
            keystore,
        })
    }
}

fn plug_in_properties(raw: BTreeMap<String, Option<String>>) -> BTreeMap<String, Option<ConfigValue>> {
    raw.into_iter()
        .map(|(k, v)| (k, v.map(ConfigValue::parse)))
        .collect()
}
