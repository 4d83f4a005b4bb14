use std::fmt;
use std::sync::Arc;

/// Dotted, hierarchical name of a node in the graph.
///
/// Cheap to clone; the segments are joined once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceName(Arc<str>);

impl ServiceName {
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Builds a name from segments, e.g. `["security-realm", "mgmt", "ldap"]`
    /// becomes `security-realm.mgmt.ldap`.
    #[must_use]
    pub fn of<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = segments
            .into_iter()
            .map(|s| s.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(".");
        Self(Arc::from(joined))
    }

    #[must_use]
    pub fn append(&self, segment: impl AsRef<str>) -> Self {
        Self(Arc::from(format!("{}.{}", self.0, segment.as_ref())))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ServiceName {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}
