use std::time::Duration;

use serde::Deserialize;

use crate::analysis::{local, pipeline::DEFAULT_CONFIDENCE_THRESHOLD, PipelineSettings};
use crate::diary::NutritionGoals;

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
}

#[derive(Clone, Deserialize)]
pub struct LocalConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for LocalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    pub remote_image_ms: u64,
    pub remote_text_ms: u64,
    pub local_image_ms: u64,
    pub local_text_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            remote_image_ms: 20_000,
            remote_text_ms: 10_000,
            local_image_ms: 15_000,
            local_text_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub local: LocalConfig,
    pub timeouts: TimeoutConfig,
    pub confidence_threshold: f64,
    pub database_url: Option<String>,
    pub goals: NutritionGoals,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = TimeoutConfig::default();
        let timeouts = TimeoutConfig {
            remote_image_ms: env_parse("MEALMIND_IMAGE_REMOTE_TIMEOUT_MS")
                .unwrap_or(defaults.remote_image_ms),
            remote_text_ms: env_parse("MEALMIND_TEXT_REMOTE_TIMEOUT_MS")
                .unwrap_or(defaults.remote_text_ms),
            local_image_ms: env_parse("MEALMIND_IMAGE_LOCAL_TIMEOUT_MS")
                .unwrap_or(defaults.local_image_ms),
            local_text_ms: env_parse("MEALMIND_TEXT_LOCAL_TIMEOUT_MS")
                .unwrap_or(defaults.local_text_ms),
        };

        let remote = RemoteConfig {
            base_url: std::env::var("MEALMIND_REMOTE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
        };

        let local = LocalConfig {
            endpoint: std::env::var("MEALMIND_LOCAL_ENDPOINT")
                .unwrap_or_else(|_| local::DEFAULT_ENDPOINT.into()),
            model: std::env::var("MEALMIND_LOCAL_MODEL")
                .unwrap_or_else(|_| local::DEFAULT_MODEL.into()),
            api_key: env_non_empty("MEALMIND_LOCAL_API_KEY")
                .or_else(|| local::BUILD_TIME_API_KEY.map(str::to_string)),
        };

        let confidence_threshold = env_parse::<f64>("MEALMIND_CONFIDENCE_THRESHOLD")
            .filter(|t| (0.0..=100.0).contains(t))
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);

        let goals = NutritionGoals {
            calories: env_parse::<f64>("MEALMIND_CALORIE_GOAL")
                .filter(|c| *c > 0.0)
                .unwrap_or(NutritionGoals::default().calories),
            protein: env_parse("MEALMIND_PROTEIN_GOAL"),
            sugar: env_parse("MEALMIND_SUGAR_GOAL"),
        };

        if let Ok(url) = std::env::var("MEALMIND_REMOTE_URL") {
            anyhow::ensure!(
                url.starts_with("http://") || url.starts_with("https://"),
                "MEALMIND_REMOTE_URL must be an http(s) URL, got {url:?}"
            );
        }

        Ok(Self {
            remote,
            local,
            timeouts,
            confidence_threshold,
            database_url: env_non_empty("DATABASE_URL"),
            goals,
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            remote_image_deadline: Duration::from_millis(self.timeouts.remote_image_ms),
            remote_text_deadline: Duration::from_millis(self.timeouts.remote_text_ms),
            local_image_deadline: Duration::from_millis(self.timeouts.local_image_ms),
            local_text_deadline: Duration::from_millis(self.timeouts.local_text_ms),
            confidence_threshold: self.confidence_threshold,
        }
    }
}
