#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Linear algebra utilities.
pub mod linalg;

/// Trajectory scale estimation and coordinate normalization.
pub mod normalize;

/// Point set container.
pub mod pointset;

/// Skeleton bone tables shared by the capture rigs.
pub mod skeleton;
