//! clusterlet-core: Core types for the clusterlet scheduler
//!
//! This crate provides the fundamental types used throughout clusterlet:
//! - Node and pod records with their status enums
//! - The opaque execution handle a node holds for its backing resource
//! - Configuration types
//! - Error handling

pub mod config;
pub mod error;
pub mod model;

pub use config::*;
pub use error::*;
pub use model::*;
