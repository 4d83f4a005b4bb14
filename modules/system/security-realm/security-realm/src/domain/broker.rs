//! Decides whether authentication and authorization share one directory
//! connection.

use crate::spec::{AuthenticationSpec, AuthorizationSpec, PrimaryMechanism};

/// `true` iff both sections use LDAP and name the same connection.
///
/// The comparison is textual: two names that resolve to the same server
/// but differ in spelling do not share.
#[must_use]
pub fn share_ldap_connection(
    authentication: Option<&AuthenticationSpec>,
    authorization: Option<&AuthorizationSpec>,
) -> bool {
    let Some(PrimaryMechanism::Ldap(authn)) = authentication.and_then(|a| a.primary.as_ref())
    else {
        return false;
    };
    let Some(AuthorizationSpec::Ldap(authz)) = authorization else {
        return false;
    };
    authn.connection == authz.connection
}
