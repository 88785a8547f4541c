// Audit event ingestion

pub mod pipeline;

pub use pipeline::{AuditPipeline, PipelineConfig, PipelineStats};
