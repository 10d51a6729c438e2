//! Service layer for the splitter
//!
//! Upload ingestion, job scheduling and execution, the separation engine
//! adapter, path normalization and artifact serving.

pub mod artifact_server;
pub mod job_runner;
pub mod job_scheduler;
pub mod path_normalizer;
pub mod staging;
pub mod stem_engine;
pub mod upload_ingestor;

pub use artifact_server::{ArchiveFile, ArtifactServer};
pub use job_runner::{JobError, JobRunner};
pub use job_scheduler::{JobHandle, JobScheduler};
pub use staging::StagingUpload;
pub use stem_engine::{EngineError, SpleeterEngine, StemEngine};
pub use upload_ingestor::{IngestReceipt, StagedUpload, UploadIngestor};
