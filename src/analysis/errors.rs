use std::time::Duration;

use thiserror::Error;

use super::dto::{AnalysisResult, Stage};

/// Failure of one provider call, before the pipeline folds it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("provider is not configured: {0}")]
    Unconfigured(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("inference endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed inference response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Outcome of a deadline race that did not produce a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RaceError<E> {
    #[error("operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("{0}")]
    Failed(E),
}

/// Unified failure returned by `ResolutionPipeline::resolve`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("nothing to analyse: input is empty")]
    EmptyInput,
    #[error("{stage} analysis timed out after {}ms", .after.as_millis())]
    Timeout { stage: Stage, after: Duration },
    #[error("{stage} analysis failed: {cause}")]
    ProviderFailure { stage: Stage, cause: ProviderError },
    #[error("analysis confidence {} is below the acceptance threshold", .result.confidence)]
    LowConfidence { result: AnalysisResult },
    #[error("all analysis sources failed; primary: {primary}; secondary: {secondary}")]
    AllSourcesExhausted {
        primary: Box<AnalysisError>,
        secondary: Box<AnalysisError>,
    },
}

impl AnalysisError {
    pub(crate) fn from_race(stage: Stage, err: RaceError<ProviderError>) -> Self {
        match err {
            RaceError::Timeout(after) => Self::Timeout { stage, after },
            RaceError::Failed(cause) => Self::ProviderFailure { stage, cause },
        }
    }

    /// True when the UI should show "could not identify this food".
    pub fn is_unidentified(&self) -> bool {
        matches!(
            self,
            Self::LowConfidence { .. } | Self::AllSourcesExhausted { .. }
        )
    }

    /// Message for the manual-entry fallback screen.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyInput => "Take a photo or describe your meal first.",
            Self::LowConfidence { .. } | Self::AllSourcesExhausted { .. } => {
                "We could not identify this food. You can enter it manually."
            }
            Self::Timeout { .. } | Self::ProviderFailure { .. } => {
                "Analysis is unavailable right now. You can enter the meal manually."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_errors_map_to_stage_variants() {
        let timeout = AnalysisError::from_race(
            Stage::Remote,
            RaceError::Timeout(Duration::from_millis(20_000)),
        );
        assert_eq!(
            timeout,
            AnalysisError::Timeout {
                stage: Stage::Remote,
                after: Duration::from_secs(20)
            }
        );
        assert_eq!(timeout.to_string(), "remote analysis timed out after 20000ms");

        let failed = AnalysisError::from_race(
            Stage::Local,
            RaceError::Failed(ProviderError::Transport("connection reset".into())),
        );
        assert!(matches!(
            failed,
            AnalysisError::ProviderFailure { stage: Stage::Local, .. }
        ));
        assert!(failed.to_string().contains("connection reset"));
    }

    #[test]
    fn unidentified_covers_low_confidence_and_exhaustion() {
        let exhausted = AnalysisError::AllSourcesExhausted {
            primary: Box::new(AnalysisError::Timeout {
                stage: Stage::Remote,
                after: Duration::from_secs(20),
            }),
            secondary: Box::new(AnalysisError::ProviderFailure {
                stage: Stage::Local,
                cause: ProviderError::Status { status: 503, body: "busy".into() },
            }),
        };
        assert!(exhausted.is_unidentified());
        assert_eq!(
            exhausted.user_message(),
            "We could not identify this food. You can enter it manually."
        );
        assert!(!AnalysisError::EmptyInput.is_unidentified());
    }
}
