//! Server identities: the TLS identity built from keystore and truststore
//! files, and the shared secret.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use secrecy::SecretString;
use security_realm_sdk::{KeystoreMaterial, SecretIdentity, SslIdentity};
use service_graph::{ActivationError, Service, ServiceHandle, ValueService};
use tracing::debug;

use super::context::BuildContext;
use super::error::DomainError;
use super::files::{ConfiguredFile, check_readable};
use super::names;
use crate::spec::{ConfigValue, KeystoreSpec, ServerIdentitySpec};

const DEFAULT_PROTOCOL: &str = "TLS";

/// Loads one keystore file when started.
pub struct FileKeystoreService {
    file: ConfiguredFile,
    password: SecretString,
    key_password: Option<SecretString>,
    alias: Option<String>,
}

#[async_trait]
impl Service for FileKeystoreService {
    type Value = KeystoreMaterial;

    async fn start(&self) -> Result<Arc<KeystoreMaterial>, ActivationError> {
        let path = self.file.resolve().await?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ActivationError::failed(format!("cannot read {}: {e}", path.display())))?;
        debug!(path = %path.display(), len = bytes.len(), "Loaded keystore");
        Ok(Arc::new(
            KeystoreMaterial::new(path, bytes, self.password.clone())
                .with_alias(self.alias.clone())
                .with_key_password(self.key_password.clone()),
        ))
    }
}

pub struct SslIdentityService {
    protocol: String,
    keystore: Option<ServiceHandle<KeystoreMaterial>>,
    truststore: Option<ServiceHandle<KeystoreMaterial>>,
}

#[async_trait]
impl Service for SslIdentityService {
    type Value = SslIdentity;

    async fn start(&self) -> Result<Arc<SslIdentity>, ActivationError> {
        let keystore = match &self.keystore {
            Some(handle) => Some(handle.get().await?.as_ref().clone()),
            None => None,
        };
        let truststore = match &self.truststore {
            Some(handle) => Some(handle.get().await?.as_ref().clone()),
            None => None,
        };
        Ok(Arc::new(SslIdentity::new(&self.protocol, keystore, truststore)))
    }
}

/// Identity nodes registered for a realm.
#[derive(Debug, Default)]
pub struct Identities {
    pub ssl: Option<ServiceHandle<SslIdentity>>,
    pub secret: Option<ServiceHandle<SecretIdentity>>,
}

/// Registers the SSL identity (with its keystore and truststore loaders)
/// when either store is configured, and the secret identity when a secret
/// is set.
///
/// # Errors
///
/// - [`DomainError::Io`] if an absolute keystore path cannot be opened
/// - [`DomainError::Configuration`] if a literal secret is not base64
/// - [`DomainError::Expression`] if a password or secret cannot be resolved
/// - [`DomainError::Resolution`] if a named path is not published
pub async fn resolve(
    cx: &mut BuildContext<'_, '_>,
    identity: Option<&ServerIdentitySpec>,
    truststore: Option<&KeystoreSpec>,
) -> Result<Identities, DomainError> {
    let ssl = identity.and_then(|i| i.ssl.as_ref());
    let keystore = ssl.and_then(|s| s.keystore.as_ref());

    let mut identities = Identities::default();
    if keystore.is_some() || truststore.is_some() {
        let keystore = match keystore {
            Some(spec) => Some(keystore_loader(cx, names::KEYSTORE, spec).await?),
            None => None,
        };
        let truststore = match truststore {
            Some(spec) => Some(keystore_loader(cx, names::TRUSTSTORE, spec).await?),
            None => None,
        };
        let service = SslIdentityService {
            protocol: ssl.map_or(DEFAULT_PROTOCOL, |s| s.protocol.as_str()).to_owned(),
            keystore: keystore.clone(),
            truststore: truststore.clone(),
        };

        let name = cx.name(names::SSL);
        let mut builder = cx.tx.add_service(name, service);
        for loader in keystore.iter().chain(truststore.iter()) {
            builder = builder.depends_on(loader);
        }
        identities.ssl = Some(builder.install()?);
    }

    if let Some(secret) = identity.and_then(|i| i.secret.as_ref()) {
        let secret = SecretIdentity::new(decode_secret(cx, secret)?);
        let name = cx.name(names::SECRET);
        identities.secret = Some(cx.tx.add_service(name, ValueService::new(Arc::new(secret))).install()?);
    }

    Ok(identities)
}

async fn keystore_loader(
    cx: &mut BuildContext<'_, '_>,
    segment: &str,
    spec: &KeystoreSpec,
) -> Result<ServiceHandle<KeystoreMaterial>, DomainError> {
    let file = cx.file(&spec.file)?;
    check_readable(&file).await?;
    let relative_to = file.relative_to().cloned();
    let service = FileKeystoreService {
        file,
        password: cx.resolve_secret(&spec.password)?,
        key_password: spec
            .key_password
            .as_ref()
            .map(|p| cx.resolve_secret(p))
            .transpose()?,
        alias: spec.alias.clone(),
    };

    let name = cx.name(segment);
    let mut builder = cx.tx.add_service(name, service);
    if let Some(base) = &relative_to {
        builder = builder.depends_on(base);
    }
    Ok(builder.install()?)
}

/// Literal secrets are stored base64-encoded; expressions resolve to the
/// secret itself.
fn decode_secret(cx: &BuildContext<'_, '_>, value: &ConfigValue) -> Result<SecretString, DomainError> {
    match value {
        ConfigValue::Expression(_) => cx.resolve_secret(value),
        ConfigValue::Literal(encoded) => {
            let bytes = STANDARD
                .decode(encoded.trim())
                .map_err(|e| DomainError::configuration(cx.realm, format!("secret is not valid base64: {e}")))?;
            let text = String::from_utf8(bytes)
                .map_err(|_| DomainError::configuration(cx.realm, "secret is not valid UTF-8"))?;
            Ok(SecretString::from(text))
        }
    }
}
