//! HTTP API handlers for the splitter
//!
//! Upload, status, download, health and SSE endpoints.

pub mod download;
pub mod health;
pub mod process;
pub mod sse;
pub mod status;

pub use download::download_routes;
pub use health::health_routes;
pub use process::process_routes;
pub use sse::event_stream;
pub use status::status_routes;
