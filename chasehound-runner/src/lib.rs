//! ChaseHound Runner: screening pipeline orchestration and its outputs.
//!
//! This crate builds on `chasehound-core` to provide:
//! - TOML run configuration
//! - The backward-iterating screening pipeline
//! - Per-date CSV recording and the run manifest
//! - Cross-date performance distribution
//! - The request/response run service

pub mod config;
pub mod manifest;
pub mod pipeline;
pub mod post_analysis;
pub mod recorder;
pub mod service;

pub use config::{RunConfig, RunSettings};
pub use manifest::{read_manifest, write_manifest, RunManifest, MANIFEST_FILE};
pub use pipeline::{
    IterationReport, PipelineError, PipelineState, RunSummary, ScreeningPipeline, StageCount,
};
pub use post_analysis::{summarize, write_distribution, DistributionRow, DISTRIBUTION_FILE};
pub use recorder::{ArtifactKind, ResultRecorder};
pub use service::{
    handle_run_request, ArtifactContent, RunCompleted, RunRequest, RunResponse, ServiceContext,
};
