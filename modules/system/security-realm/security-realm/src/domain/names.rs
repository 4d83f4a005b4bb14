//! Service names of realm nodes and of the external collaborators they use.

use service_graph::ServiceName;

const REALM: &str = "security-realm";

/// The realm node itself.
#[must_use]
pub fn realm(realm: &str) -> ServiceName {
    ServiceName::of([REALM, realm])
}

/// A node owned by `realm`.
#[must_use]
pub fn child(realm: &str, segment: &str) -> ServiceName {
    self::realm(realm).append(segment)
}

pub const CLIENT_CERT: &str = "client-cert";
pub const LOCAL: &str = "local";
pub const JAAS: &str = "jaas";
pub const LDAP_AUTHENTICATION: &str = "ldap-authentication";
pub const PLUG_IN_AUTHENTICATION: &str = "plug-in-authentication";
pub const PROPERTIES_AUTHENTICATION: &str = "properties-authentication";
pub const USERS: &str = "users";
pub const PROPERTIES_AUTHORIZATION: &str = "properties-authorization";
pub const PLUG_IN_AUTHORIZATION: &str = "plug-in-authorization";
pub const LDAP_AUTHORIZATION: &str = "ldap-authorization";
pub const USER_SEARCHER: &str = "ldap-authorization.user-searcher";
pub const GROUP_SEARCHER: &str = "ldap-authorization.group-searcher";
pub const PLUG_IN_LOADER: &str = "plug-in-loader";
pub const SSL: &str = "ssl";
pub const KEYSTORE: &str = "ssl.keystore";
pub const TRUSTSTORE: &str = "ssl.truststore";
pub const SECRET: &str = "secret";

/// A named filesystem path published by the host.
#[must_use]
pub fn path(token: &str) -> ServiceName {
    ServiceName::of(["path", token])
}

/// A directory connection manager published by the host.
#[must_use]
pub fn ldap_connection(connection: &str) -> ServiceName {
    ServiceName::of(["ldap-connection", connection])
}

/// The full server's security manager.
#[must_use]
pub fn security_manager() -> ServiceName {
    ServiceName::new("security.simple-security-manager")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn children_live_under_the_realm() {
        assert_eq!(realm("mgmt").as_str(), "security-realm.mgmt");
        assert_eq!(
            child("mgmt", USER_SEARCHER).as_str(),
            "security-realm.mgmt.ldap-authorization.user-searcher"
        );
        assert_eq!(ldap_connection("ldapConn").as_str(), "ldap-connection.ldapConn");
    }
}
