#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Service Graph
//!
//! A registry of named, typed, lazily activated services:
//!
//! - [`ServiceGraph`] - the registry; owns published nodes and their edges
//! - [`Transaction`] - stages nodes privately and publishes them atomically
//! - [`ServiceBuilder`] - declares one node's dependencies and activation mode
//! - [`ServiceHandle`] - typed reference to a node; activates it on first use
//! - [`Service`] - implemented by every node
//!
//! ## Usage
//!
//! ```ignore
//! let graph = ServiceGraph::new();
//! let mut tx = graph.transaction();
//!
//! let conn = tx.lookup::<dyn ConnectionManager>(&ServiceName::new("ldap-connection.main"))?;
//! let handler = tx
//!     .add_service(ServiceName::new("realm.ldap"), LdapHandler::new(conn.clone()))
//!     .depends_on(&conn)
//!     .install()?;
//!
//! tx.commit().await?;
//! let ready = handler.get().await?;
//! ```

mod activation;
pub mod error;
pub mod graph;
pub mod name;
pub mod service;

pub use error::{ActivationError, GraphError};
pub use graph::{ServiceBuilder, ServiceGraph, ServiceHandle, Transaction};
pub use name::ServiceName;
pub use service::{ActivationMode, Service, ValueService};
