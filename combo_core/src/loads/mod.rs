//! Load types and the load-type registry
//!
//! - [`LoadType`] - The closed set of load categories (DL, LL, WL, EQ, ...)
//! - [`LoadTypeRegistry`] - The vocabulary a formula parser resolves against

pub mod load_types;

pub use load_types::{LoadType, LoadTypeRegistry};
