//! Type aliases shared across the grblstream crates.
//!
//! - [`aliases`]: `Arc<Mutex<T>>` and `Arc<RwLock<T>>` wrappers with constructors.

pub mod aliases;

pub use aliases::*;
