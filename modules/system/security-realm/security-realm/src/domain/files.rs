//! Files referenced by realm nodes, and the properties format they use.

use std::collections::HashMap;
use std::path::PathBuf;

use security_realm_sdk::NamedPath;
use service_graph::{ActivationError, ServiceHandle};

use super::error::DomainError;

/// A configured file path, optionally relative to a named path.
///
/// The named path is only known once its node starts, so the final location
/// is computed at activation.
#[derive(Clone)]
pub struct ConfiguredFile {
    path: PathBuf,
    relative_to: Option<ServiceHandle<dyn NamedPath>>,
}

impl ConfiguredFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, relative_to: Option<ServiceHandle<dyn NamedPath>>) -> Self {
        Self {
            path: path.into(),
            relative_to,
        }
    }

    /// The named-path node this file depends on.
    #[must_use]
    pub fn relative_to(&self) -> Option<&ServiceHandle<dyn NamedPath>> {
        self.relative_to.as_ref()
    }

    /// The configured path when it needs no named path to locate.
    #[must_use]
    pub fn absolute(&self) -> Option<&std::path::Path> {
        (self.relative_to.is_none() && self.path.is_absolute()).then_some(self.path.as_path())
    }

    /// # Errors
    ///
    /// Returns an [`ActivationError`] if the named path cannot be started.
    pub async fn resolve(&self) -> Result<PathBuf, ActivationError> {
        match &self.relative_to {
            Some(base) => Ok(base.get().await?.path().join(&self.path)),
            None => Ok(self.path.clone()),
        }
    }

    /// Resolves the path and reads the file.
    ///
    /// # Errors
    ///
    /// Returns an [`ActivationError`] if the path cannot be resolved or the
    /// file cannot be read.
    pub async fn read_to_string(&self) -> Result<(PathBuf, String), ActivationError> {
        let path = self.resolve().await?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ActivationError::failed(format!("cannot read {}: {e}", path.display())))?;
        Ok((path, text))
    }
}

/// Fails early when a file that needs no named path cannot be opened.
///
/// # Errors
///
/// [`DomainError::Io`] with the underlying error.
pub async fn check_readable(file: &ConfiguredFile) -> Result<(), DomainError> {
    let Some(path) = file.absolute() else {
        return Ok(());
    };
    tokio::fs::File::open(path)
        .await
        .map(drop)
        .map_err(|source| DomainError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Parses `key=value` lines. Blank lines and lines starting with `#` or `!`
/// are skipped; `:` also separates; the last duplicate wins.
#[must_use]
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let (key, value) = line.split_at(split);
            Some((key.trim().to_owned(), value[1..].trim().to_owned()))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn properties_lines_are_parsed() {
        let props = parse_properties(
            "# users\n\
             admin=2a0923285184943425d1f53ddd58ec7a\n\
             ! legacy comment\n\
             \n\
             bob : secret\n\
             alice=a=b\n\
             =orphan\n\
             novalue\n",
        );
        assert_eq!(props.len(), 3);
        assert_eq!(props["admin"], "2a0923285184943425d1f53ddd58ec7a");
        assert_eq!(props["bob"], "secret");
        assert_eq!(props["alice"], "a=b");
    }

    #[tokio::test]
    async fn absolute_file_resolves_to_itself() {
        let file = ConfiguredFile::new("/etc/realm/users.properties", None);
        assert!(file.absolute().is_some());
        assert_eq!(
            file.resolve().await.unwrap(),
            PathBuf::from("/etc/realm/users.properties")
        );

        let relative = ConfiguredFile::new("users.properties", None);
        assert!(relative.absolute().is_none());
    }

    #[tokio::test]
    async fn missing_absolute_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ConfiguredFile::new(dir.path().join("absent.jks"), None);
        let err = check_readable(&missing).await.unwrap_err();
        assert!(matches!(err, DomainError::Io { path, .. } if path.ends_with("absent.jks")));

        check_readable(&ConfiguredFile::new("relative.jks", None)).await.unwrap();
    }
}
