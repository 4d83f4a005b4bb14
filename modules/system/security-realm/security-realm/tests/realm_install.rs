#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Building realms into the graph: which nodes appear, rollback on failure,
//! teardown and lazy activation.

mod common;

use std::sync::Arc;

use secrecy::ExposeSecret;
use security_realm::domain::names;
use security_realm::{DomainError, RealmEnvironment, SecurityRealms};
use security_realm_sdk::{AuthMechanism, Credential, SecurityRealmError, ServerSecurityManager};
use service_graph::{GraphError, ServiceGraph};

use common::{
    Directory, StaticSecurityManager, TableExpressions, config, publish_directory, publish_path,
};

fn realm_nodes(graph: &ServiceGraph, realm: &str) -> Vec<String> {
    let prefix = names::realm(realm);
    graph
        .names()
        .into_iter()
        .filter(|n| n.as_str().starts_with(prefix.as_str()))
        .map(|n| n.as_str().to_owned())
        .collect()
}

async fn registry(yaml: &str) -> (Arc<ServiceGraph>, Result<SecurityRealms, DomainError>) {
    let graph = Arc::new(ServiceGraph::new());
    let realms = SecurityRealms::from_config(Arc::clone(&graph), RealmEnvironment::new(), config(yaml)).await;
    (graph, realms)
}

#[tokio::test]
async fn truststore_only_creates_certificate_and_ssl_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let truststore = dir.path().join("trust.jks");
    std::fs::write(&truststore, b"trust-bytes").unwrap();

    let (graph, realms) = registry(&format!(
        r#"
realms:
  - name: CertRealm
    authentication:
      truststore:
        keystore-path: "{}"
        keystore-password: changeit
"#,
        truststore.display()
    ))
    .await;
    let realms = realms.unwrap();

    assert_eq!(
        realm_nodes(&graph, "CertRealm"),
        vec![
            "security-realm.CertRealm",
            "security-realm.CertRealm.client-cert",
            "security-realm.CertRealm.ssl",
            "security-realm.CertRealm.ssl.truststore",
        ]
    );

    let realm = realms.get("CertRealm").await.unwrap();
    assert_eq!(realm.mechanisms(), vec![AuthMechanism::ClientCert]);
    let subject = realm
        .authenticate(&Credential::client_certificate("CN=client,O=example"))
        .await
        .unwrap();
    assert_eq!(subject.mechanism(), AuthMechanism::ClientCert);

    let ssl = realm.ssl_identity().await.unwrap().unwrap();
    assert_eq!(ssl.protocol(), "TLS");
    assert!(ssl.key_store().is_none());
    assert_eq!(ssl.trust_store().unwrap().bytes(), b"trust-bytes");

    let err = realm.authenticate(&Credential::password("a", "b")).await.unwrap_err();
    assert!(matches!(err, SecurityRealmError::NotConfigured(_)));
}

#[tokio::test]
async fn precedence_keeps_only_the_first_mechanism() {
    let graph = Arc::new(ServiceGraph::new());
    let directory = Arc::new(Directory::new().user("alice", "ou=people,dc=example", "pw", &[]));
    publish_directory(&graph, "ldapConn", &directory).await;

    let yaml = r#"
mechanism_policy: precedence
realms:
  - name: Mixed
    authentication:
      ldap:
        connection: ldapConn
        base-dn: "ou=people,dc=example"
        username-attribute: uid
      users:
        user:
          bob:
            password: secret
"#;
    SecurityRealms::from_config(Arc::clone(&graph), RealmEnvironment::new(), config(yaml))
        .await
        .unwrap();

    assert_eq!(
        realm_nodes(&graph, "Mixed"),
        vec!["security-realm.Mixed", "security-realm.Mixed.ldap-authentication"]
    );
}

#[tokio::test]
async fn several_mechanisms_are_rejected_before_any_node_exists() {
    let (graph, realms) = registry(
        r#"
realms:
  - name: Mixed
    authentication:
      properties:
        path: /nonexistent/users.properties
      users:
        user:
          bob:
            password: secret
"#,
    )
    .await;

    let err = realms.err().unwrap();
    assert!(matches!(err, DomainError::Configuration { ref reason, .. } if reason.contains("properties, users")));
    assert!(graph.is_empty());
}

#[tokio::test]
async fn install_then_remove_leaves_no_realm_nodes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("roles.properties"), "admin=ops,dev\n").unwrap();

    let graph = Arc::new(ServiceGraph::new());
    publish_path(&graph, "config.dir", dir.path()).await;
    let before = graph.names();

    let yaml = r#"
realms:
  - name: Temp
    authentication:
      local:
        default-user: "$local"
      users:
        user:
          admin:
            password: s3cret
    authorization:
      properties:
        path: roles.properties
        relative-to: config.dir
    server-identity:
      secret:
        value: c2VjcmV0
"#;
    let realms = SecurityRealms::from_config(Arc::clone(&graph), RealmEnvironment::new(), config(yaml))
        .await
        .unwrap();
    assert_eq!(realm_nodes(&graph, "Temp").len(), 5);

    let realm = realms.get("Temp").await.unwrap();
    assert_eq!(realm.mechanisms(), vec![AuthMechanism::Digest, AuthMechanism::Local]);
    let subject = realm.authenticate(&Credential::password("admin", "s3cret")).await.unwrap();
    let supplemental = realm.supplemental(&subject).await.unwrap();
    assert_eq!(supplemental.groups.len(), 2);
    assert_eq!(supplemental.roles, supplemental.groups);
    let local = realm.authenticate(&Credential::local(None)).await.unwrap();
    assert_eq!(local.principal(), "$local");

    let secret = realm.secret().await.unwrap().unwrap();
    assert_eq!(secret.secret().expose_secret(), "secret");

    realms.remove("Temp").await.unwrap();
    assert_eq!(graph.names(), before);
    assert!(realms.names().await.is_empty());
    assert!(matches!(realms.remove("Temp").await, Err(DomainError::RealmNotFound(_))));
}

#[tokio::test]
async fn authorization_failure_discards_authentication_nodes() {
    let (graph, realms) = registry(
        r#"
realms:
  - name: Broken
    authentication:
      local:
        default-user: "$local"
      users:
        user:
          admin:
            password: pw
    authorization:
      ldap:
        connection: missing
        group-search:
          principal-to-group:
            group-attribute: memberOf
"#,
    )
    .await;

    let err = realms.err().unwrap();
    assert!(matches!(err, DomainError::Resolution(GraphError::NotFound(ref n)) if n.as_str() == "ldap-connection.missing"));
    assert!(graph.is_empty());
}

#[tokio::test]
async fn unreadable_keystore_fails_installation() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("server.jks");
    let (graph, realms) = registry(&format!(
        r#"
realms:
  - name: Tls
    server-identity:
      ssl:
        keystore-path: "{}"
        keystore-password: changeit
"#,
        missing.display()
    ))
    .await;

    assert!(matches!(realms.err().unwrap(), DomainError::Io { .. }));
    assert!(graph.is_empty());
}

#[tokio::test]
async fn relative_keystore_is_loaded_on_first_use() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("server.jks"), b"key-bytes").unwrap();
    let graph = Arc::new(ServiceGraph::new());
    publish_path(&graph, "config.dir", dir.path()).await;

    let yaml = r#"
realms:
  - name: Tls
    server-identity:
      ssl:
        protocol: TLSv1.3
        keystore-path: server.jks
        relative-to: config.dir
        keystore-password: changeit
        alias: server
"#;
    let realms = SecurityRealms::from_config(Arc::clone(&graph), RealmEnvironment::new(), config(yaml))
        .await
        .unwrap();
    let keystore = names::child("Tls", names::KEYSTORE);
    assert!(!graph.is_active(&keystore));

    let ssl = realms.get("Tls").await.unwrap().ssl_identity().await.unwrap().unwrap();
    assert!(graph.is_active(&keystore));
    assert_eq!(ssl.protocol(), "TLSv1.3");
    let key = ssl.key_store().unwrap();
    assert_eq!(key.bytes(), b"key-bytes");
    assert_eq!(key.alias(), Some("server"));
    assert!(key.path().ends_with("server.jks"));
}

#[tokio::test]
async fn secret_must_be_base64_unless_expression() {
    let (_, realms) = registry(
        r#"
realms:
  - name: Bad
    server-identity:
      secret:
        value: "not base64!"
"#,
    )
    .await;
    assert!(matches!(realms.err().unwrap(), DomainError::Configuration { .. }));
}

#[tokio::test]
async fn duplicate_realm_is_rejected() {
    let graph = Arc::new(ServiceGraph::new());
    let realms = SecurityRealms::new(
        Arc::clone(&graph),
        RealmEnvironment::new(),
        security_realm::MechanismPolicy::Strict,
    );
    let cfg = config("realms:\n  - name: One\n    authentication:\n      local:\n        default-user: me\n");
    realms.add(cfg.realms[0].clone()).await.unwrap();
    let count = graph.len();

    let err = realms.add(cfg.realms[0].clone()).await.unwrap_err();
    assert!(matches!(err, DomainError::RealmExists(ref name) if name == "One"));
    assert_eq!(graph.len(), count);
}

#[tokio::test]
async fn concurrent_lookups_share_one_realm() {
    let (_, realms) = registry(
        "realms:\n  - name: Busy\n    authentication:\n      users:\n        user:\n          u:\n            password: p\n",
    )
    .await;
    let realms = Arc::new(realms.unwrap());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let realms = Arc::clone(&realms);
            tokio::spawn(async move { realms.get("Busy").await.unwrap() })
        })
        .collect();
    let mut resolved = Vec::new();
    for task in tasks {
        resolved.push(task.await.unwrap());
    }

    let first = &resolved[0];
    assert!(resolved.iter().all(|r| Arc::ptr_eq(r, first)));
    assert!(first.authenticate(&Credential::password("u", "p")).await.is_ok());
}

#[tokio::test]
async fn jaas_in_full_server_uses_security_manager() {
    let graph = Arc::new(ServiceGraph::new());
    let manager: Arc<dyn ServerSecurityManager> = Arc::new(StaticSecurityManager {
        domain: "other".to_owned(),
        password: "pw".to_owned(),
    });
    graph.publish_value(names::security_manager(), manager).await.unwrap();

    let yaml = "normal_server: true\nrealms:\n  - name: J\n    authentication:\n      jaas:\n        name: other\n";
    let realms = SecurityRealms::from_config(Arc::clone(&graph), RealmEnvironment::new(), config(yaml))
        .await
        .unwrap();

    assert_eq!(
        graph.dependents_of(&names::security_manager()),
        vec![names::child("J", names::JAAS)]
    );
    let realm = realms.get("J").await.unwrap();
    assert!(realm.authenticate(&Credential::password("anyone", "pw")).await.is_ok());
    assert!(realm.authenticate(&Credential::password("anyone", "no")).await.is_err());
}

#[tokio::test]
async fn jaas_outside_full_server_needs_login_contexts() {
    let (graph, realms) =
        registry("realms:\n  - name: J\n    authentication:\n      jaas:\n        name: other\n").await;
    assert!(matches!(realms.err().unwrap(), DomainError::Configuration { .. }));
    assert!(graph.is_empty());
}

#[tokio::test]
async fn plug_in_authentication_needs_a_plug_in_list() {
    let (graph, realms) = registry(
        "realms:\n  - name: P\n    authentication:\n      plug-in:\n        name: custom\n",
    )
    .await;
    assert!(matches!(
        realms.err().unwrap(),
        DomainError::Resolution(GraphError::NotFound(_))
    ));
    assert!(graph.is_empty());
}

const EXPRESSIONS: &str = r#"
realms:
  - name: Expr
    authentication:
      users:
        user:
          admin:
            password: "${admin.password}"
    server-identity:
      ssl:
        keystore-path: server.jks
        relative-to: config.dir
        keystore-password: "${keystore.password}"
        key-password: "${key.password}"
      secret:
        value: "${shared.secret}"
"#;

#[tokio::test]
async fn expressions_are_resolved_once_while_building() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("server.jks"), b"key-bytes").unwrap();
    let graph = Arc::new(ServiceGraph::new());
    publish_path(&graph, "config.dir", dir.path()).await;

    let expressions = Arc::new(TableExpressions::new(&[
        ("${admin.password}", "resolved"),
        ("${keystore.password}", "store-pass"),
        ("${key.password}", "key-pass"),
        ("${shared.secret}", "not base64!"),
    ]));
    let env = RealmEnvironment::new().with_expressions(expressions.clone());
    let realms = SecurityRealms::from_config(Arc::clone(&graph), env, config(EXPRESSIONS))
        .await
        .unwrap();
    assert_eq!(expressions.calls(), 4);

    let realm = realms.get("Expr").await.unwrap();
    assert!(realm.authenticate(&Credential::password("admin", "resolved")).await.is_ok());
    assert!(
        realm
            .authenticate(&Credential::password("admin", "${admin.password}"))
            .await
            .is_err()
    );

    let ssl = realm.ssl_identity().await.unwrap().unwrap();
    let key = ssl.key_store().unwrap();
    assert_eq!(key.password().expose_secret(), "store-pass");
    assert_eq!(key.key_password().expose_secret(), "key-pass");

    // Expression secrets are taken as they resolve, not base64-decoded.
    let secret = realm.secret().await.unwrap().unwrap();
    assert_eq!(secret.secret().expose_secret(), "not base64!");

    assert_eq!(expressions.calls(), 4);
}

#[tokio::test]
async fn unresolvable_expression_rolls_the_realm_back() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("server.jks"), b"key-bytes").unwrap();
    let graph = Arc::new(ServiceGraph::new());
    publish_path(&graph, "config.dir", dir.path()).await;
    let before = graph.names();

    // Everything resolves except the secret, which is staged last.
    let expressions = Arc::new(TableExpressions::new(&[
        ("${admin.password}", "resolved"),
        ("${keystore.password}", "store-pass"),
        ("${key.password}", "key-pass"),
    ]));
    let env = RealmEnvironment::new().with_expressions(expressions.clone());
    let err = SecurityRealms::from_config(Arc::clone(&graph), env, config(EXPRESSIONS))
        .await
        .err()
        .unwrap();

    assert!(
        matches!(err, DomainError::Expression { ref expression, .. } if expression == "${shared.secret}")
    );
    assert_eq!(expressions.calls(), 4);
    assert_eq!(graph.names(), before);

    let (graph, realms) = registry(EXPRESSIONS).await;
    assert!(matches!(realms.err().unwrap(), DomainError::Expression { .. }));
    assert!(graph.is_empty());
}
