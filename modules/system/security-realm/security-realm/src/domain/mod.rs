pub mod authentication;
pub mod authorization;
pub mod broker;
pub mod context;
pub mod environment;
pub mod error;
pub mod files;
pub mod installer;
pub mod ldap_filter;
pub mod names;
pub mod plugin_loader;
pub mod realm;
pub mod registry;
pub mod trust;
