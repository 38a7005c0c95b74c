pub mod models;
pub mod profile;
pub mod registry;

// Re-export commonly used types
pub use models::{Job, JobId, JobSnapshot, JobState, NewJob};
pub use profile::{EngineParameters, QualityProfile};
pub use registry::{JobRegistry, ProgressUpdate, RegistryError};
