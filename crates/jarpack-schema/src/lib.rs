//! Shared data model for jarpack.
//!
//! Everything in this crate is plain data: artifact coordinates, the bundle
//! manifest read by the launcher, and platform (fraction) descriptors. No I/O
//! happens here so the types can be shared by the assembler and by tooling
//! that only inspects finished bundles.

pub mod artifact;
pub mod fraction;
pub mod manifest;

// Re-exports
pub use artifact::*;
pub use fraction::{FractionDescriptor, FractionManifest};
pub use manifest::BundleManifest;

/// Root directory of the embedded artifact repository inside a bundle.
pub const REPOSITORY_ROOT: &str = "m2repo";
