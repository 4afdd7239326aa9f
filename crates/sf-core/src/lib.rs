//! showfest/crates/sf-core/src/lib.rs
//!
//! The central domain logic and interface definitions for Showfest.

pub mod config;
pub mod error;
pub mod models;
pub mod policies;
pub mod traits;

// Re-exporting for easier access in other crates
pub use config::*;
pub use error::*;
pub use models::*;
pub use policies::*;
pub use traits::*;
