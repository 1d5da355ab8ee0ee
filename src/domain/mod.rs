//! Core domain types
//!
//! Pure types with no I/O dependencies. These represent the core concepts
//! shared by the synthesizer and the recognizer.

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;
