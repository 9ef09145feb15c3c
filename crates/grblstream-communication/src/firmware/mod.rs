//! Firmware protocol implementations
//!
//! Supported controllers:
//! - GRBL 1.1

pub mod grbl;
