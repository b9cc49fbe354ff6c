//! # Configuration
//!
//! Process configuration. The cluster connection profile is not part of it: that
//! record is written through the operation surface and lives in
//! [`crate::connection`].

mod service;

pub use service::ServiceConfig;
