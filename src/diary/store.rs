use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use time::{Date, OffsetDateTime};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::dto::{DiaryRecord, MealId, UserScope};
use super::mutation::{Mutation, MutationKind};
use super::nutrition::{totals_for, NutritionGoals, Targets, Totals};
use crate::storage::{PersistenceAdapter, PersistenceError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("invalid diary record: {0}")]
    InvalidRecord(String),
    #[error("no record with id {0}")]
    UnknownRecord(MealId),
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Pending confirmation of one optimistic mutation.
///
/// Persistence runs on its own task; dropping this handle does not cancel it.
#[must_use = "await `confirmed()` to learn whether the change was persisted"]
pub struct Reconciliation {
    kind: MutationKind,
    id: MealId,
    task: JoinHandle<Result<(), PersistenceError>>,
}

impl Reconciliation {
    /// Resolves once the backing call settled and any rollback was applied.
    pub async fn confirmed(self) -> Result<(), StoreError> {
        match self.task.await {
            Ok(outcome) => outcome.map_err(StoreError::from),
            Err(e) => {
                error!(
                    kind = %self.kind, record_id = %self.id, error = %e,
                    "reconciliation task failed"
                );
                Err(StoreError::Persistence(PersistenceError::Backend(format!(
                    "{} of {} did not finish: {e}",
                    self.kind, self.id
                ))))
            }
        }
    }
}

/// Canonical in-memory diary for one user scope.
///
/// Mutations apply to memory synchronously and are then mirrored to the
/// adapter on a spawned task, so the mutating methods must be called from
/// within a tokio runtime. One store per scope; switch scopes by opening a new
/// store.
pub struct MutationStore {
    scope: UserScope,
    records: Arc<Mutex<Vec<DiaryRecord>>>,
    adapter: Arc<dyn PersistenceAdapter>,
    goals: NutritionGoals,
}

impl MutationStore {
    #[instrument(skip(adapter, goals), fields(scope = %scope))]
    pub async fn load(
        adapter: Arc<dyn PersistenceAdapter>,
        scope: UserScope,
        goals: NutritionGoals,
    ) -> Result<Self, StoreError> {
        let records = adapter.get_all(&scope).await.map_err(|e| {
            error!(error = %e, "failed to load diary");
            e
        })?;
        info!(count = records.len(), "diary loaded");
        Ok(Self {
            scope,
            records: Arc::new(Mutex::new(records)),
            adapter,
            goals,
        })
    }

    /// Discards this store and loads `scope` from scratch.
    pub async fn switch_scope(self, scope: UserScope) -> Result<Self, StoreError> {
        Self::load(self.adapter, scope, self.goals).await
    }

    pub fn scope(&self) -> &UserScope {
        &self.scope
    }

    pub fn records(&self) -> Vec<DiaryRecord> {
        self.lock().clone()
    }

    pub fn get(&self, id: &MealId) -> Option<DiaryRecord> {
        self.lock().iter().find(|r| &r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn goals(&self) -> NutritionGoals {
        self.goals
    }

    pub fn set_goals(&mut self, goals: NutritionGoals) {
        self.goals = goals;
    }

    pub fn targets(&self) -> Targets {
        Targets::from_goals(&self.goals)
    }

    pub fn totals(&self, date: Date) -> Totals {
        totals_for(self.lock().iter(), date)
    }

    /// Totals for the device's current local date.
    pub fn today_totals(&self) -> Totals {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        self.totals(now.date())
    }

    /// Prepends `record` now; removes it again if the adapter rejects it.
    pub fn add(&self, record: DiaryRecord) -> Result<Reconciliation, StoreError> {
        record.validate().map_err(StoreError::InvalidRecord)?;
        let mutation = {
            let mut records = self.lock();
            if records.iter().any(|r| r.id == record.id) {
                return Err(StoreError::InvalidRecord(format!(
                    "duplicate record id {}",
                    record.id
                )));
            }
            Mutation::add(&mut records, record.clone())
        };
        let adapter = self.adapter.clone();
        let scope = self.scope.clone();
        Ok(self.reconcile(mutation, async move {
            adapter.add(&scope, &record).await.map(|_| ())
        }))
    }

    /// Replaces the record with the same id now. A rejected write is reported
    /// through the returned handle; the in-memory value is kept.
    pub fn update(&self, record: DiaryRecord) -> Result<Reconciliation, StoreError> {
        record.validate().map_err(StoreError::InvalidRecord)?;
        let mutation = Mutation::update(&mut self.lock(), record.clone())
            .ok_or_else(|| StoreError::UnknownRecord(record.id.clone()))?;
        let adapter = self.adapter.clone();
        let scope = self.scope.clone();
        Ok(self.reconcile(mutation, async move {
            adapter.update(&scope, &record).await.map(|_| ())
        }))
    }

    /// Drops the record now; puts it back if the adapter rejects the delete.
    pub fn remove(&self, id: &MealId) -> Result<Reconciliation, StoreError> {
        let mutation = Mutation::remove(&mut self.lock(), id)
            .ok_or_else(|| StoreError::UnknownRecord(id.clone()))?;
        let adapter = self.adapter.clone();
        let scope = self.scope.clone();
        let id = id.clone();
        Ok(self.reconcile(mutation, async move { adapter.delete(&scope, &id).await }))
    }

    fn reconcile<F>(&self, mutation: Mutation, persist: F) -> Reconciliation
    where
        F: Future<Output = Result<(), PersistenceError>> + Send + 'static,
    {
        let kind = mutation.kind;
        let id = mutation.id.clone();
        let records = self.records.clone();
        let scope = self.scope.clone();
        debug!(%kind, record_id = %id, scope = %scope, "applied optimistic mutation");

        let task = tokio::spawn(async move {
            let outcome = persist.await;
            match &outcome {
                Ok(()) => debug!(%kind, record_id = %mutation.id, "mutation persisted"),
                Err(e) => {
                    let record_id = mutation.id.clone();
                    let mut guard = records.lock().unwrap_or_else(PoisonError::into_inner);
                    if mutation.compensate(&mut guard) {
                        warn!(
                            %kind, %record_id, %scope, error = %e,
                            "persistence failed; rolled back"
                        );
                    } else {
                        warn!(
                            %kind, %record_id, %scope, error = %e,
                            "persistence failed; local change kept"
                        );
                    }
                }
            }
            outcome
        });

        Reconciliation { kind, id, task }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DiaryRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
