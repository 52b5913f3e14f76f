#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod affine;
pub use affine::*;

mod cost;
pub use cost::*;

mod engine;
pub use engine::*;

mod error;
pub use error::IcpError;

mod rigid;
pub use rigid::*;

mod spatial_index;
pub use spatial_index::*;

/// Temporal offset search driven by registration cost.
pub mod sweep;

mod transform;
pub use transform::*;
