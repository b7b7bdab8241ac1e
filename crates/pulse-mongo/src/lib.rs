//! MongoDB driver adapter: a [`pulse_core::target::ClusterTarget`] backed by
//! a live deployment.

pub mod config;
pub mod connection;
pub mod convert;
pub mod target;

pub use config::MongoTargetConfig;
pub use target::MongoTarget;
