//! Common test utilities and fixtures.

pub mod blobs;
pub mod cache;
pub mod faulty;
pub mod fixtures;
pub mod metadata;

#[allow(unused_imports)]
pub use blobs::*;
#[allow(unused_imports)]
pub use cache::*;
#[allow(unused_imports)]
pub use faulty::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use metadata::*;
