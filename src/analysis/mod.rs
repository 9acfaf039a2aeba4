//! Meal resolution: photo or text in, one nutrition estimate or one error out.

pub mod dto;
pub mod errors;
pub mod local;
pub mod pipeline;
mod prompt;
pub mod provider;
pub mod race;
pub mod remote;

pub use dto::{AnalysisInput, AnalysisResult, InputKind, Stage};
pub use errors::{AnalysisError, ProviderError, RaceError};
pub use local::LocalProvider;
pub use pipeline::{PipelineSettings, ResolutionPipeline};
pub use provider::InferenceProvider;
pub use race::race;
pub use remote::RemoteProvider;
