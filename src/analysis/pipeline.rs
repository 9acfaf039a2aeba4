use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use super::dto::{AnalysisInput, AnalysisResult, InputKind, Stage};
use super::errors::AnalysisError;
use super::provider::InferenceProvider;
use super::race::race;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 40.0;

/// Deadlines per stage and input kind, plus the confidence gate.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub remote_image_deadline: Duration,
    pub remote_text_deadline: Duration,
    pub local_image_deadline: Duration,
    pub local_text_deadline: Duration,
    pub confidence_threshold: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            remote_image_deadline: Duration::from_secs(20),
            remote_text_deadline: Duration::from_secs(10),
            local_image_deadline: Duration::from_secs(15),
            local_text_deadline: Duration::from_secs(10),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl PipelineSettings {
    fn deadline(&self, stage: Stage, kind: InputKind) -> Duration {
        match (stage, kind) {
            (Stage::Remote, InputKind::Image) => self.remote_image_deadline,
            (Stage::Remote, InputKind::Text) => self.remote_text_deadline,
            (Stage::Local, InputKind::Image) => self.local_image_deadline,
            (Stage::Local, InputKind::Text) => self.local_text_deadline,
        }
    }
}

/// Remote first, then the direct provider as a fallback, each under its own
/// deadline. Stateless apart from configuration; safe to share.
pub struct ResolutionPipeline {
    remote: Arc<dyn InferenceProvider>,
    local: Option<Arc<dyn InferenceProvider>>,
    settings: PipelineSettings,
}

impl ResolutionPipeline {
    /// An unconfigured fallback is dropped here, once, and never attempted.
    pub fn new(
        remote: Arc<dyn InferenceProvider>,
        local: Option<Arc<dyn InferenceProvider>>,
        settings: PipelineSettings,
    ) -> Self {
        let local = local.filter(|provider| {
            let configured = provider.is_configured();
            if !configured {
                warn!("local inference credential missing; fallback disabled");
            }
            configured
        });
        Self {
            remote,
            local,
            settings,
        }
    }

    pub fn has_fallback(&self) -> bool {
        self.local.is_some()
    }

    #[instrument(skip(self, input), fields(kind = %input.kind()))]
    pub async fn resolve(&self, input: &AnalysisInput) -> Result<AnalysisResult, AnalysisError> {
        if input.is_empty() {
            warn!("rejecting empty analysis input");
            return Err(AnalysisError::EmptyInput);
        }

        let primary = match self.attempt(self.remote.as_ref(), input).await {
            Ok(result) => return self.gate(Stage::Remote, result),
            Err(e) => e,
        };

        let Some(local) = self.local.as_deref() else {
            warn!(error = %primary, "remote analysis failed and no fallback is configured");
            return Err(primary);
        };

        info!(error = %primary, "remote analysis failed; trying local fallback");
        match self.attempt(local, input).await {
            Ok(result) => self.gate(Stage::Local, result),
            Err(secondary) => {
                warn!(primary = %primary, secondary = %secondary, "all analysis sources exhausted");
                Err(AnalysisError::AllSourcesExhausted {
                    primary: Box::new(primary),
                    secondary: Box::new(secondary),
                })
            }
        }
    }

    async fn attempt(
        &self,
        provider: &dyn InferenceProvider,
        input: &AnalysisInput,
    ) -> Result<AnalysisResult, AnalysisError> {
        let stage = provider.stage();
        let deadline = self.settings.deadline(stage, input.kind());
        race(provider.infer(input), deadline)
            .await
            .map_err(|e| AnalysisError::from_race(stage, e))
    }

    fn gate(&self, stage: Stage, result: AnalysisResult) -> Result<AnalysisResult, AnalysisError> {
        if result.confidence < self.settings.confidence_threshold {
            warn!(
                %stage,
                confidence = result.confidence,
                threshold = self.settings.confidence_threshold,
                "discarding low-confidence analysis"
            );
            return Err(AnalysisError::LowConfidence { result });
        }
        info!(%stage, name = %result.name, confidence = result.confidence, "analysis accepted");
        Ok(result)
    }
}
