pub mod cleanup;
pub mod orchestrator;

pub use cleanup::CleanupScheduler;
pub use orchestrator::{CompressionOutcome, FailureKind, JobFailure, TranscodeOrchestrator};
