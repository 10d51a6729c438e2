//! Data models for the splitter service

pub mod stem_config;
pub mod task;

pub use stem_config::StemConfig;
pub use task::{Task, TaskStatus};
