//! keepsake-core: record shapes exchanged with persistence and trustees,
//! the `keepsake.toml` schema, and the top-level error type.

pub mod config;
pub mod error;
pub mod types;

pub use error::{KeepsakeError, KeepsakeResult};
