//! # flashdeck-core
//!
//! Core types, traits, and abstractions for flashdeck.
//!
//! This crate provides the job model and its state machine, the pipeline
//! output types, and the store/queue interfaces that the other crates
//! implement and consume.

pub mod defaults;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
