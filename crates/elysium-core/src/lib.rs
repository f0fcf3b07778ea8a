//! Elysium Core Library
//!
//! Shared domain models and persistence for the Elysium IaC platform.

pub mod db;
pub mod error;
pub mod models;

pub use error::{ElysiumError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
