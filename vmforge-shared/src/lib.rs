//! vmforge shared - types used by the builder library and its hosts.
//!
//! Kept dependency-light so plugin hosts can match on build errors without
//! pulling in the async stack.

pub mod constants;
pub mod errors;

pub use errors::{VmforgeError, VmforgeResult};
