use std::sync::Arc;

use anyhow::Context;
use reqwest::Client;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::analysis::{InferenceProvider, LocalProvider, RemoteProvider, ResolutionPipeline};
use crate::config::{AppConfig, LocalConfig, RemoteConfig, TimeoutConfig};
use crate::diary::{MutationStore, NutritionGoals, PgPersistence, StoreError, UserScope};
use crate::storage::{LocalStoragePersistence, PersistenceAdapter};

/// Everything a UI event handler needs: the resolution pipeline and the
/// persistence backend diaries are opened against.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<ResolutionPipeline>,
    pub persistence: Arc<dyn PersistenceAdapter>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Arc::new(AppConfig::from_env().context("load configuration")?);

        // Deadlines are enforced per stage by the pipeline, not by the client.
        let client = Client::builder()
            .user_agent(concat!("mealmind/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;

        let pipeline = Arc::new(Self::build_pipeline(&config, client));

        let persistence = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                let pg = PgPersistence::new(db);
                if let Err(e) = pg.migrate().await {
                    warn!(error = %e, "diary migration failed; continuing");
                }
                info!("diary persistence: postgres");
                Arc::new(pg) as Arc<dyn PersistenceAdapter>
            }
            None => {
                info!("diary persistence: local storage");
                Arc::new(LocalStoragePersistence::new()) as Arc<dyn PersistenceAdapter>
            }
        };

        Ok(Self {
            config,
            pipeline,
            persistence,
        })
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        pipeline: Arc<ResolutionPipeline>,
        persistence: Arc<dyn PersistenceAdapter>,
    ) -> Self {
        Self {
            config,
            pipeline,
            persistence,
        }
    }

    fn build_pipeline(config: &AppConfig, client: Client) -> ResolutionPipeline {
        let remote = Arc::new(RemoteProvider::new(client.clone(), &config.remote.base_url));
        let local = LocalProvider::new(
            client,
            &config.local.endpoint,
            &config.local.model,
            config.local.api_key.clone(),
        );
        ResolutionPipeline::new(
            remote,
            Some(Arc::new(local) as Arc<dyn InferenceProvider>),
            config.pipeline_settings(),
        )
    }

    /// Loads the diary for `scope`. Opening another scope means dropping the
    /// store returned here and calling this again.
    pub async fn open_diary(&self, scope: UserScope) -> Result<MutationStore, StoreError> {
        MutationStore::load(self.persistence.clone(), scope, self.config.goals).await
    }

    /// In-memory state with no fallback credential and an unreachable remote.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            remote: RemoteConfig {
                base_url: "http://127.0.0.1:9".into(),
            },
            local: LocalConfig {
                endpoint: "http://127.0.0.1:9".into(),
                model: crate::analysis::local::DEFAULT_MODEL.into(),
                api_key: None,
            },
            timeouts: TimeoutConfig::default(),
            confidence_threshold: crate::analysis::pipeline::DEFAULT_CONFIDENCE_THRESHOLD,
            database_url: None,
            goals: NutritionGoals::default(),
        });
        let pipeline = Arc::new(Self::build_pipeline(&config, Client::new()));
        let persistence = Arc::new(LocalStoragePersistence::new()) as Arc<dyn PersistenceAdapter>;
        Self {
            config,
            pipeline,
            persistence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, AnalysisInput, AnalysisResult, Stage};
    use crate::diary::{DiaryRecord, MealType};
    use time::macros::date;

    #[test]
    fn fake_state_has_no_fallback() {
        let state = AppState::fake();
        assert!(!state.pipeline.has_fallback());
        assert_eq!(state.config.goals, NutritionGoals::default());
    }

    #[tokio::test]
    async fn unreachable_remote_without_fallback_is_a_provider_failure() {
        let state = AppState::fake();
        let err = state
            .pipeline
            .resolve(&AnalysisInput::text("porridge with berries"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ProviderFailure { stage: Stage::Remote, .. }
        ));
        assert!(!err.user_message().is_empty());
    }

    #[tokio::test]
    async fn analysed_meal_lands_in_the_opened_diary() {
        let state = AppState::fake();
        let diary = state.open_diary(UserScope::Guest).await.unwrap();
        let result = AnalysisResult {
            name: "Chicken wrap".into(),
            calories: 480.0,
            protein: 32.0,
            carbs: 41.0,
            fat: 18.0,
            sugar: 4.0,
            confidence: 94.0,
        };
        let day = date!(2024 - 06 - 12);
        let record = DiaryRecord::from_analysis(&result, day, "13:10", MealType::Lunch, None);

        diary.add(record.clone()).unwrap().confirmed().await.unwrap();
        drop(diary);

        let reopened = state.open_diary(UserScope::Guest).await.unwrap();
        assert_eq!(reopened.records(), vec![record]);
        assert_eq!(reopened.totals(day).protein, 32.0);
    }
}
