//! Service layer for the depot archive.
//!
//! This crate provides:
//! - The manager service (upload handshake, object and version lifecycle)
//! - The garbage collector for expired versions and orphaned blobs
//! - The catalog statistics exporter
//! - Prometheus metrics and the health endpoint served by `depotd`

pub mod error;
pub mod exporter;
pub mod gc;
pub mod manager;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::{ServiceError, ServiceResult};
pub use exporter::StatsExporter;
pub use gc::{GarbageCollector, GcError, GcStats};
pub use manager::{AccessService, ManageService, Manager};
pub use routes::create_router;
pub use state::AppState;
