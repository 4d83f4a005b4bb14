//! The validated attribute tree of a realm, as it arrives from management.
//!
//! Every child is optional here; [`RealmSpec::from_definition`] turns the
//! tree into the sum-typed [`RealmSpec`](crate::spec::RealmSpec) and rejects
//! inconsistent combinations.
//!
//! [`RealmSpec::from_definition`]: crate::spec::RealmSpec::from_definition

use std::collections::BTreeMap;

use serde::Deserialize;

use security_realm_sdk::{AuthMechanism, GroupName};

/// One security realm.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct RealmDefinition {
    /// Realm name, unique per registry.
    pub name: String,

    /// Plug-in modules the realm's loader searches for providers.
    pub plug_in: Option<Vec<String>>,

    pub authentication: Option<AuthenticationDefinition>,

    pub authorization: Option<AuthorizationDefinition>,

    pub server_identity: Option<ServerIdentityDefinition>,

    /// Report directory groups as roles too. Defaults to `true`.
    pub map_groups_to_roles: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct AuthenticationDefinition {
    pub truststore: Option<TruststoreDefinition>,
    pub local: Option<LocalDefinition>,
    pub jaas: Option<JaasDefinition>,
    pub ldap: Option<LdapAuthenticationDefinition>,
    pub plug_in: Option<PlugInAuthenticationDefinition>,
    pub properties: Option<PropertiesAuthenticationDefinition>,
    pub users: Option<UsersDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct TruststoreDefinition {
    pub keystore_path: Option<String>,
    pub keystore_password: Option<String>,
    #[serde(alias = "keystore-relative-to")]
    pub relative_to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct LocalDefinition {
    pub default_user: Option<String>,
    /// `*` or a comma separated list.
    pub allowed_users: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct JaasDefinition {
    /// Login-module chain.
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct LdapAuthenticationDefinition {
    pub connection: Option<String>,
    pub base_dn: Option<String>,
    /// Attribute matched against the username, or a filter template
    /// containing `{0}`.
    #[serde(alias = "username-filter")]
    pub username_attribute: Option<String>,
    pub advanced_filter: Option<String>,
    pub recursive: Option<bool>,
    pub allow_empty_passwords: Option<bool>,
    /// Attribute holding the DN to bind as; `dn` means the entry DN.
    pub user_dn: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct PlugInAuthenticationDefinition {
    pub name: Option<String>,
    pub mechanism: Option<AuthMechanism>,
    pub properties: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct PropertiesAuthenticationDefinition {
    pub path: Option<String>,
    pub relative_to: Option<String>,
    pub plain_text: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct UsersDefinition {
    pub user: BTreeMap<String, UserDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct UserDefinition {
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct AuthorizationDefinition {
    pub properties: Option<PropertiesAuthorizationDefinition>,
    pub plug_in: Option<PlugInAuthorizationDefinition>,
    pub ldap: Option<LdapAuthorizationDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct PropertiesAuthorizationDefinition {
    pub path: Option<String>,
    pub relative_to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct PlugInAuthorizationDefinition {
    pub name: Option<String>,
    pub properties: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct LdapAuthorizationDefinition {
    pub connection: Option<String>,
    pub username_to_dn: Option<UsernameToDnDefinition>,
    pub group_search: Option<GroupSearchDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct UsernameToDnDefinition {
    pub username_is_dn: Option<UsernameIsDnDefinition>,
    pub username_filter: Option<UsernameFilterDefinition>,
    pub advanced_filter: Option<AdvancedFilterDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct UsernameIsDnDefinition {
    pub force: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct UsernameFilterDefinition {
    pub base_dn: Option<String>,
    pub recursive: Option<bool>,
    pub user_dn_attribute: Option<String>,
    pub attribute: Option<String>,
    pub force: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct AdvancedFilterDefinition {
    pub base_dn: Option<String>,
    pub recursive: Option<bool>,
    pub user_dn_attribute: Option<String>,
    pub filter: Option<String>,
    pub force: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct GroupSearchDefinition {
    pub group_to_principal: Option<GroupToPrincipalDefinition>,
    pub principal_to_group: Option<PrincipalToGroupDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct GroupToPrincipalDefinition {
    pub base_dn: Option<String>,
    pub group_dn_attribute: Option<String>,
    pub group_name: Option<GroupName>,
    pub group_name_attribute: Option<String>,
    pub iterative: Option<bool>,
    pub principal_attribute: Option<String>,
    pub recursive: Option<bool>,
    pub search_by: Option<GroupName>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct PrincipalToGroupDefinition {
    pub group_attribute: Option<String>,
    pub group_dn_attribute: Option<String>,
    pub group_name: Option<GroupName>,
    pub group_name_attribute: Option<String>,
    pub iterative: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ServerIdentityDefinition {
    pub ssl: Option<SslDefinition>,
    pub secret: Option<SecretDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct SslDefinition {
    pub protocol: Option<String>,
    pub keystore_path: Option<String>,
    pub keystore_password: Option<String>,
    pub key_password: Option<String>,
    pub alias: Option<String>,
    #[serde(alias = "keystore-relative-to")]
    pub relative_to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct SecretDefinition {
    /// Base64 literal, or an expression resolving to the secret itself.
    pub value: Option<String>,
}
