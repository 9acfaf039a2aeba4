use async_trait::async_trait;

use super::dto::{AnalysisInput, AnalysisResult, Stage};
use super::errors::ProviderError;

/// One inference backend. Implementations issue a single call per `infer` and
/// never retry; deadlines are applied by the caller.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    fn stage(&self) -> Stage;

    /// False when the provider can never succeed (missing credential).
    fn is_configured(&self) -> bool {
        true
    }

    async fn infer(&self, input: &AnalysisInput) -> Result<AnalysisResult, ProviderError>;
}
