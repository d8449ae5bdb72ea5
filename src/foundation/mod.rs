//! Shared foundation: error/warning types and small machine value types.

pub mod core;
pub mod error;
