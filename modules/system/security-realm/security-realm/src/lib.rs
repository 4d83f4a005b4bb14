//! Security Realm Module
//!
//! Turns a realm definition (authentication, authorization and server
//! identity sections) into a set of lazily activated nodes in a
//! [`service_graph::ServiceGraph`], installed or discarded as a unit.
//!
//! Provides the `SecurityRealmClient` capability of each installed realm
//! through [`SecurityRealms`].
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
pub mod definition;
pub mod domain;
pub mod spec;

pub use config::{MechanismPolicy, SecurityRealmConfig};
pub use definition::RealmDefinition;
pub use domain::environment::RealmEnvironment;
pub use domain::error::DomainError;
pub use domain::installer::{InstalledRealm, RealmInstaller};
pub use domain::registry::SecurityRealms;
pub use spec::RealmSpec;
