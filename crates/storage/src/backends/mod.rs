//! Blob store backends.

pub mod s3;
