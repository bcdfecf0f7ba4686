//! clusterlet-api: REST API server for clusterlet
//!
//! This crate maps HTTP requests onto scheduler operations:
//! - Node registration, heartbeats, stop/resume/recover
//! - Pod launch and listing
//! - Cluster status

pub mod rest;

pub use rest::create_router;
