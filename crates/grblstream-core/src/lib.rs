//! # grblstream Core
//!
//! Core types shared by the grblstream crates.
//! Provides the error taxonomy used across the protocol engine and the
//! thread-safe type aliases the link handle is built from.

pub mod error;
pub mod types;

pub use error::{ConnectionError, Error, ProtocolError, Result};

pub use types::{
    thread_safe_deque, thread_safe_rw, ThreadSafe, ThreadSafeDeque, ThreadSafeRw,
};
