//! # Moonarch Common Library
//!
//! Shared code for the Moonarch audio services including:
//! - Error types
//! - Configuration loading (TOML file, environment, compiled defaults)
//! - Event types and the broadcast EventBus
//! - Server-Sent Events helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
