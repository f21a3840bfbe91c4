//! Repository traits for metadata operations.

pub mod blobs;
pub mod containers;
pub mod namespaces;
pub mod objects;
pub mod stats;
pub mod versions;

pub use blobs::BlobRepo;
pub use containers::ContainerRepo;
pub use namespaces::NamespaceRepo;
pub use objects::ObjectRepo;
pub use stats::StatsRepo;
pub use versions::VersionRepo;
