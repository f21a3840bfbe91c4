//! Core domain types and shared logic for the depot archive.
//!
//! This crate defines the data model used across all other crates:
//! - Containers, versions and blobs as returned by the metadata repository
//! - Catalog statistics consumed by the exporter
//! - Version name generation
//! - Process configuration

pub mod config;
pub mod error;
pub mod models;
pub mod version;

pub use error::{Error, Result};
pub use models::{Blob, Container, Stats, Version};
pub use version::{VersionName, next_version_name};

/// Name of the namespace that always exists.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default page size for list operations.
pub const DEFAULT_PAGE_SIZE: u64 = 1000;
