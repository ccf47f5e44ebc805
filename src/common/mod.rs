//! Common types and utilities shared across the crate.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`IndexConfig`]
//! - Error types
//! - The [`BlockId`] identifier

mod block_id;
pub mod config;
pub mod error;

pub use block_id::BlockId;
pub use config::IndexConfig;
pub use error::{Error, Result};
