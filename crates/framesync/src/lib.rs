#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use framesync_3d as k3d;

#[doc(inline)]
pub use framesync_icp as icp;
