//! LDAP group loading.
//!
//! Three nodes cooperate: an optional user searcher mapping the principal to
//! its entry DN, a group searcher walking memberships in one of two
//! directions, and the supplemental node holding both plus the connection
//! manager.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use security_realm_sdk::{
    AuthenticatedSubject, GroupName, LdapConnection, LdapConnectionManager, LdapSearch,
    SearchScope, SecurityRealmError, SubjectSupplemental, Supplemental, rdn_value,
};
use service_graph::{ActivationError, Service, ServiceHandle, ValueService};
use tracing::debug;

use crate::domain::context::BuildContext;
use crate::domain::error::DomainError;
use crate::domain::ldap_filter::{escape, expand};
use crate::domain::names;
use crate::spec::{
    GroupToPrincipalSpec, LdapAuthorizationSpec, LdapGroupSearchSpec, PrincipalToGroupSpec,
    UsernameToDnSpec,
};

enum UserLookup {
    UsernameIsDn,
    Search {
        base_dn: String,
        filter: String,
        scope: SearchScope,
        user_dn_attribute: String,
    },
}

/// Maps a principal to the DN of its directory entry.
pub struct UserSearcher {
    force: bool,
    lookup: UserLookup,
}

impl UserSearcher {
    #[must_use]
    pub fn new(spec: &UsernameToDnSpec) -> Self {
        let lookup = match spec {
            UsernameToDnSpec::UsernameIsDn { .. } => UserLookup::UsernameIsDn,
            UsernameToDnSpec::UsernameFilter(s) => UserLookup::Search {
                base_dn: s.base_dn.clone(),
                filter: format!("({}={{0}})", s.attribute),
                scope: SearchScope::from_recursive(s.recursive),
                user_dn_attribute: s.user_dn_attribute.clone(),
            },
            UsernameToDnSpec::AdvancedFilter(s) => UserLookup::Search {
                base_dn: s.base_dn.clone(),
                filter: s.filter.clone(),
                scope: SearchScope::from_recursive(s.recursive),
                user_dn_attribute: s.user_dn_attribute.clone(),
            },
        };
        Self {
            force: spec.force(),
            lookup,
        }
    }

    /// The DN found during authentication is reused unless `force` is set.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if the search does not find exactly one entry
    /// - `ServiceUnavailable` if the directory cannot be searched
    pub async fn user_dn(
        &self,
        connection: &dyn LdapConnection,
        subject: &AuthenticatedSubject,
    ) -> Result<String, SecurityRealmError> {
        if !self.force
            && let Some(dn) = subject.user_dn()
        {
            return Ok(dn.to_owned());
        }

        let principal = subject.principal();
        match &self.lookup {
            UserLookup::UsernameIsDn => Ok(principal.to_owned()),
            UserLookup::Search {
                base_dn,
                filter,
                scope,
                user_dn_attribute,
            } => {
                let search = LdapSearch {
                    base_dn: base_dn.clone(),
                    filter: expand(filter, principal),
                    scope: *scope,
                    attributes: vec![user_dn_attribute.clone()],
                };
                let entries = connection.search(&search).await?;
                match entries.as_slice() {
                    [entry] => Ok(entry.first(user_dn_attribute).unwrap_or(&entry.dn).to_owned()),
                    [] => Err(SecurityRealmError::Unauthorized(format!(
                        "no directory entry for '{principal}'"
                    ))),
                    _ => Err(SecurityRealmError::Unauthorized(format!(
                        "'{principal}' matches more than one directory entry"
                    ))),
                }
            }
        }
    }
}

/// A principal or group, by DN and by simple name.
#[derive(Debug, Clone)]
struct Member {
    dn: String,
    simple: String,
}

/// Finds the groups a member belongs to.
pub struct GroupSearcher {
    spec: LdapGroupSearchSpec,
}

impl GroupSearcher {
    #[must_use]
    pub fn new(spec: LdapGroupSearchSpec) -> Self {
        Self { spec }
    }

    /// Group names for a principal, reported as DNs or simple names. When
    /// iterative, memberships of groups are followed; cycles are visited
    /// once.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` if the directory cannot be searched.
    pub async fn groups(
        &self,
        connection: &dyn LdapConnection,
        principal: &str,
        user_dn: &str,
    ) -> Result<BTreeSet<String>, SecurityRealmError> {
        let mut reported = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut pending = VecDeque::from([Member {
            dn: user_dn.to_owned(),
            simple: principal.to_owned(),
        }]);

        while let Some(member) = pending.pop_front() {
            for group in self.direct_groups(connection, &member).await? {
                if !visited.insert(group.dn.to_ascii_lowercase()) {
                    continue;
                }
                reported.insert(match self.spec.group_name() {
                    GroupName::DistinguishedName => group.dn.clone(),
                    GroupName::Simple => group.simple.clone(),
                });
                if self.spec.iterative() {
                    pending.push_back(group);
                }
            }
        }
        Ok(reported)
    }

    async fn direct_groups(
        &self,
        connection: &dyn LdapConnection,
        member: &Member,
    ) -> Result<Vec<Member>, SecurityRealmError> {
        match &self.spec {
            LdapGroupSearchSpec::GroupToPrincipal(s) => group_to_principal(s, connection, member).await,
            LdapGroupSearchSpec::PrincipalToGroup(s) => principal_to_group(s, connection, member).await,
        }
    }
}

/// Searches group entries that name the member.
async fn group_to_principal(
    s: &GroupToPrincipalSpec,
    connection: &dyn LdapConnection,
    member: &Member,
) -> Result<Vec<Member>, SecurityRealmError> {
    let value = match s.search_by {
        GroupName::DistinguishedName => &member.dn,
        GroupName::Simple => &member.simple,
    };
    let search = LdapSearch {
        base_dn: s.base_dn.clone(),
        filter: format!("({}={})", s.principal_attribute, escape(value)),
        scope: SearchScope::from_recursive(s.recursive),
        attributes: vec![s.group_dn_attribute.clone(), s.group_name_attribute.clone()],
    };
    let entries = connection.search(&search).await?;
    Ok(entries
        .iter()
        .map(|entry| {
            let dn = entry.first(&s.group_dn_attribute).unwrap_or(&entry.dn).to_owned();
            let simple = entry
                .first(&s.group_name_attribute)
                .map_or_else(|| rdn_value(&dn).to_owned(), str::to_owned);
            Member { dn, simple }
        })
        .collect())
}

/// Reads the group references held on the member's own entry.
async fn principal_to_group(
    s: &PrincipalToGroupSpec,
    connection: &dyn LdapConnection,
    member: &Member,
) -> Result<Vec<Member>, SecurityRealmError> {
    let entries = connection
        .search(&LdapSearch::entry(&member.dn, &[s.group_attribute.as_str()]))
        .await?;
    let Some(entry) = entries.first() else {
        return Ok(Vec::new());
    };

    let mut groups = Vec::new();
    for reference in entry.values(&s.group_attribute) {
        let group = if s.group_name == GroupName::Simple {
            let found = connection
                .search(&LdapSearch::entry(
                    reference,
                    &[s.group_name_attribute.as_str(), s.group_dn_attribute.as_str()],
                ))
                .await?;
            let dn = found
                .first()
                .and_then(|e| e.first(&s.group_dn_attribute))
                .unwrap_or(reference)
                .to_owned();
            let simple = found
                .first()
                .and_then(|e| e.first(&s.group_name_attribute))
                .map_or_else(|| rdn_value(reference).to_owned(), str::to_owned);
            Member { dn, simple }
        } else {
            Member {
                dn: reference.to_owned(),
                simple: rdn_value(reference).to_owned(),
            }
        };
        groups.push(group);
    }
    Ok(groups)
}

pub struct LdapAuthorizationService {
    manager: ServiceHandle<dyn LdapConnectionManager>,
    user_searcher: Option<ServiceHandle<UserSearcher>>,
    group_searcher: ServiceHandle<GroupSearcher>,
    share_connection: bool,
}

#[async_trait]
impl Service for LdapAuthorizationService {
    type Value = dyn SubjectSupplemental;

    async fn start(&self) -> Result<Arc<dyn SubjectSupplemental>, ActivationError> {
        let user_searcher = match &self.user_searcher {
            Some(handle) => Some(handle.get().await?),
            None => None,
        };
        Ok(Arc::new(LdapSubjectSupplemental {
            manager: self.manager.get().await?,
            user_searcher,
            group_searcher: self.group_searcher.get().await?,
            share_connection: self.share_connection,
        }))
    }
}

pub struct LdapSubjectSupplemental {
    manager: Arc<dyn LdapConnectionManager>,
    user_searcher: Option<Arc<UserSearcher>>,
    group_searcher: Arc<GroupSearcher>,
    share_connection: bool,
}

#[async_trait]
impl SubjectSupplemental for LdapSubjectSupplemental {
    async fn supplemental(
        &self,
        subject: &AuthenticatedSubject,
    ) -> Result<Supplemental, SecurityRealmError> {
        let connection = match subject.ldap_connection() {
            Some(shared) if self.share_connection => Arc::clone(shared),
            _ => self.manager.connect().await?,
        };
        let user_dn = match &self.user_searcher {
            Some(searcher) => searcher.user_dn(connection.as_ref(), subject).await?,
            None => subject.user_dn().unwrap_or(subject.principal()).to_owned(),
        };
        let groups = self
            .group_searcher
            .groups(connection.as_ref(), subject.principal(), &user_dn)
            .await?;
        debug!(principal = subject.principal(), groups = groups.len(), "Loaded LDAP groups");
        Ok(Supplemental::from_groups(groups))
    }
}

/// Registers the user searcher (when a DN mapping needs one), the group
/// searcher and the supplemental node.
///
/// # Errors
///
/// Returns [`DomainError::Resolution`] if the connection manager is not
/// published.
pub fn resolve(
    cx: &mut BuildContext<'_, '_>,
    spec: &LdapAuthorizationSpec,
    share_connection: bool,
) -> Result<ServiceHandle<dyn SubjectSupplemental>, DomainError> {
    let manager =
        cx.external::<dyn LdapConnectionManager>(&names::ldap_connection(&spec.connection))?;

    let user_searcher = match &spec.username_to_dn {
        None | Some(UsernameToDnSpec::UsernameIsDn { force: false }) => None,
        Some(mapping) => {
            let name = cx.name(names::USER_SEARCHER);
            let searcher = Arc::new(UserSearcher::new(mapping));
            Some(cx.tx.add_service(name, ValueService::new(searcher)).install()?)
        }
    };

    let name = cx.name(names::GROUP_SEARCHER);
    let searcher = Arc::new(GroupSearcher::new(spec.group_search.clone()));
    let group_searcher = cx.tx.add_service(name, ValueService::new(searcher)).install()?;

    let service = LdapAuthorizationService {
        manager: manager.clone(),
        user_searcher: user_searcher.clone(),
        group_searcher: group_searcher.clone(),
        share_connection,
    };
    let name = cx.name(names::LDAP_AUTHORIZATION);
    let mut builder = cx
        .tx
        .add_service(name, service)
        .depends_on(&manager)
        .depends_on(&group_searcher);
    if let Some(user_searcher) = &user_searcher {
        builder = builder.depends_on(user_searcher);
    }
    Ok(builder.install()?)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use parking_lot::Mutex;
    use security_realm_sdk::{AuthMechanism, LdapEntry};

    use super::*;

    /// In-memory directory answering base reads and `(attr=value)` filters.
    struct Directory {
        entries: Vec<LdapEntry>,
        filters: Mutex<Vec<String>>,
    }

    impl Directory {
        fn new(entries: Vec<LdapEntry>) -> Self {
            Self {
                entries,
                filters: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LdapConnection for Directory {
        async fn search(&self, search: &LdapSearch) -> Result<Vec<LdapEntry>, SecurityRealmError> {
            self.filters.lock().push(search.filter.clone());
            if search.scope == SearchScope::Base {
                return Ok(self
                    .entries
                    .iter()
                    .filter(|e| e.dn.eq_ignore_ascii_case(&search.base_dn))
                    .cloned()
                    .collect());
            }
            let inner = search.filter.trim_start_matches('(').trim_end_matches(')');
            let (attr, value) = inner.split_once('=').unwrap();
            Ok(self
                .entries
                .iter()
                .filter(|e| e.dn.ends_with(&search.base_dn) && e.values(attr).contains(&value))
                .cloned()
                .collect())
        }
    }

    fn by_member(search_by: GroupName, group_name: GroupName, iterative: bool) -> GroupSearcher {
        GroupSearcher::new(LdapGroupSearchSpec::GroupToPrincipal(GroupToPrincipalSpec {
            base_dn: "ou=groups,dc=example".to_owned(),
            group_dn_attribute: "dn".to_owned(),
            group_name,
            group_name_attribute: "cn".to_owned(),
            iterative,
            principal_attribute: "member".to_owned(),
            recursive: false,
            search_by,
        }))
    }

    #[tokio::test]
    async fn search_by_simple_name_reports_dns() {
        let directory = Directory::new(vec![
            LdapEntry::new("cn=ops,ou=groups,dc=example")
                .with_attribute("cn", &["ops"])
                .with_attribute("member", &["alice"]),
            LdapEntry::new("cn=dev,ou=groups,dc=example")
                .with_attribute("cn", &["dev"])
                .with_attribute("member", &["uid=alice,ou=people,dc=example"]),
        ]);
        let searcher = by_member(GroupName::Simple, GroupName::DistinguishedName, false);

        let groups = searcher
            .groups(&directory, "alice", "uid=alice,ou=people,dc=example")
            .await
            .unwrap();
        assert_eq!(
            groups.into_iter().collect::<Vec<_>>(),
            vec!["cn=ops,ou=groups,dc=example".to_owned()]
        );
        assert_eq!(directory.filters.lock().as_slice(), ["(member=alice)"]);
    }

    #[tokio::test]
    async fn iterative_search_follows_nested_groups_once() {
        let directory = Directory::new(vec![
            LdapEntry::new("cn=a,ou=groups,dc=example")
                .with_attribute("cn", &["a"])
                .with_attribute("member", &["uid=bob,dc=example", "cn=b,ou=groups,dc=example"]),
            LdapEntry::new("cn=b,ou=groups,dc=example")
                .with_attribute("cn", &["b"])
                .with_attribute("member", &["cn=a,ou=groups,dc=example"]),
        ]);
        let searcher = by_member(GroupName::DistinguishedName, GroupName::Simple, true);

        let groups = searcher.groups(&directory, "bob", "uid=bob,dc=example").await.unwrap();
        assert_eq!(groups.into_iter().collect::<Vec<_>>(), vec!["a".to_owned(), "b".to_owned()]);
    }

    #[tokio::test]
    async fn principal_to_group_reads_member_of() {
        let directory = Directory::new(vec![
            LdapEntry::new("uid=carol,dc=example")
                .with_attribute("memberOf", &["cn=admins,ou=groups,dc=example", "cn=gone,dc=example"]),
            LdapEntry::new("cn=admins,ou=groups,dc=example").with_attribute("uid", &["Administrators"]),
        ]);
        let searcher = GroupSearcher::new(LdapGroupSearchSpec::PrincipalToGroup(PrincipalToGroupSpec {
            group_attribute: "memberOf".to_owned(),
            group_dn_attribute: "dn".to_owned(),
            group_name: GroupName::Simple,
            group_name_attribute: "uid".to_owned(),
            iterative: false,
        }));

        let groups = searcher.groups(&directory, "carol", "uid=carol,dc=example").await.unwrap();
        assert_eq!(
            groups.into_iter().collect::<Vec<_>>(),
            vec!["Administrators".to_owned(), "gone".to_owned()]
        );
    }

    #[tokio::test]
    async fn user_searcher_reuses_known_dn_unless_forced() {
        let directory = Directory::new(vec![
            LdapEntry::new("uid=dave,ou=people,dc=example").with_attribute("uid", &["dave"]),
        ]);
        let spec = |force| {
            UsernameToDnSpec::UsernameFilter(crate::spec::UserSearchSpec {
                base_dn: "dc=example".to_owned(),
                recursive: true,
                user_dn_attribute: "dn".to_owned(),
                attribute: "uid".to_owned(),
                force,
            })
        };
        let subject = AuthenticatedSubject::new("dave", AuthMechanism::Plain).with_user_dn("cached");

        let lazy = UserSearcher::new(&spec(false));
        assert_eq!(lazy.user_dn(&directory, &subject).await.unwrap(), "cached");
        assert!(directory.filters.lock().is_empty());

        let forced = UserSearcher::new(&spec(true));
        assert_eq!(
            forced.user_dn(&directory, &subject).await.unwrap(),
            "uid=dave,ou=people,dc=example"
        );
        assert_eq!(directory.filters.lock().as_slice(), ["(uid=dave)"]);
    }
}
