#[cfg(feature = "nn")]
pub mod nn;
pub mod ops;
pub mod utils;
