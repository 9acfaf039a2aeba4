use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::diary::dto::{DiaryRecord, MealId, UserScope};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PersistenceError {
    #[error("record {0} not found")]
    NotFound(MealId),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
    #[error("persistence backend error: {0}")]
    Backend(String),
}

impl From<anyhow::Error> for PersistenceError {
    fn from(e: anyhow::Error) -> Self {
        Self::Backend(format!("{e:#}"))
    }
}

/// Backing mirror of a user's diary. Every call either resolves or fails;
/// callers own retry and rollback.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn get_all(&self, scope: &UserScope) -> Result<Vec<DiaryRecord>, PersistenceError>;
    async fn add(
        &self,
        scope: &UserScope,
        record: &DiaryRecord,
    ) -> Result<DiaryRecord, PersistenceError>;
    async fn update(
        &self,
        scope: &UserScope,
        record: &DiaryRecord,
    ) -> Result<DiaryRecord, PersistenceError>;
    async fn delete(&self, scope: &UserScope, id: &MealId) -> Result<(), PersistenceError>;
}

/// Key-value storage holding one JSON array per scope under `meals_<scope>`,
/// newest first, the way device-local storage keeps it.
#[derive(Default)]
pub struct LocalStoragePersistence {
    entries: Mutex<HashMap<String, String>>,
}

impl LocalStoragePersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn storage_key(scope: &UserScope) -> String {
        format!("meals_{}", scope.storage_key())
    }

    /// Raw stored value, as the device would see it.
    pub fn raw(&self, scope: &UserScope) -> Option<String> {
        self.entries().get(&Self::storage_key(scope)).cloned()
    }

    /// Overwrites a raw stored value.
    pub fn set_raw(&self, scope: &UserScope, value: impl Into<String>) {
        self.entries().insert(Self::storage_key(scope), value.into());
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn decode(json: Option<&String>) -> Result<Vec<DiaryRecord>, PersistenceError> {
        match json {
            Some(json) => {
                serde_json::from_str(json).map_err(|e| PersistenceError::Corrupt(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Read-modify-write of one scope's array under a single lock.
    fn modify<T>(
        &self,
        scope: &UserScope,
        change: impl FnOnce(&mut Vec<DiaryRecord>) -> Result<T, PersistenceError>,
    ) -> Result<T, PersistenceError> {
        let key = Self::storage_key(scope);
        let mut entries = self.entries();
        let mut records = Self::decode(entries.get(&key))?;
        let out = change(&mut records)?;
        let json =
            serde_json::to_string(&records).map_err(|e| PersistenceError::Backend(e.to_string()))?;
        entries.insert(key, json);
        Ok(out)
    }
}

#[async_trait]
impl PersistenceAdapter for LocalStoragePersistence {
    #[instrument(skip(self), fields(scope = %scope))]
    async fn get_all(&self, scope: &UserScope) -> Result<Vec<DiaryRecord>, PersistenceError> {
        let records = Self::decode(self.entries().get(&Self::storage_key(scope)))?;
        debug!(count = records.len(), "loaded records from local storage");
        Ok(records)
    }

    #[instrument(skip(self, record), fields(scope = %scope, record_id = %record.id))]
    async fn add(
        &self,
        scope: &UserScope,
        record: &DiaryRecord,
    ) -> Result<DiaryRecord, PersistenceError> {
        self.modify(scope, |records| {
            records.insert(0, record.clone());
            Ok(record.clone())
        })
    }

    #[instrument(skip(self, record), fields(scope = %scope, record_id = %record.id))]
    async fn update(
        &self,
        scope: &UserScope,
        record: &DiaryRecord,
    ) -> Result<DiaryRecord, PersistenceError> {
        self.modify(scope, |records| {
            let slot = records
                .iter_mut()
                .find(|r| r.id == record.id)
                .ok_or_else(|| PersistenceError::NotFound(record.id.clone()))?;
            *slot = record.clone();
            Ok(record.clone())
        })
    }

    /// Deleting an id that is not stored is not an error.
    #[instrument(skip(self), fields(scope = %scope))]
    async fn delete(&self, scope: &UserScope, id: &MealId) -> Result<(), PersistenceError> {
        self.modify(scope, |records| {
            records.retain(|r| &r.id != id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diary::dto::MealType;
    use time::macros::date;
    use uuid::Uuid;

    fn record(id: &str, calories: f64) -> DiaryRecord {
        DiaryRecord::new(
            MealId::from(id),
            date!(2024 - 05 - 01),
            "19:00",
            "Pasta",
            calories,
            MealType::Dinner,
        )
    }

    #[tokio::test]
    async fn crud_is_scoped_per_user() {
        let storage = LocalStoragePersistence::new();
        let alice = UserScope::User(Uuid::new_v4());

        storage.add(&alice, &record("1", 600.0)).await.unwrap();
        storage.add(&alice, &record("2", 300.0)).await.unwrap();
        storage.add(&UserScope::Guest, &record("9", 100.0)).await.unwrap();

        let ids: Vec<_> = storage
            .get_all(&alice)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.0)
            .collect();
        assert_eq!(ids, vec!["2", "1"]);

        let mut edited = record("1", 650.0);
        edited.name = "Pasta carbonara".into();
        storage.update(&alice, &edited).await.unwrap();
        storage.delete(&alice, &MealId::from("2")).await.unwrap();

        let left = storage.get_all(&alice).await.unwrap();
        assert_eq!(left, vec![edited]);
        assert_eq!(storage.get_all(&UserScope::Guest).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_of_unknown_record_is_not_found() {
        let storage = LocalStoragePersistence::new();
        let err = storage
            .update(&UserScope::Guest, &record("404", 1.0))
            .await
            .unwrap_err();
        assert_eq!(err, PersistenceError::NotFound(MealId::from("404")));
    }

    #[tokio::test]
    async fn corrupt_payload_is_reported() {
        let storage = LocalStoragePersistence::new();
        storage.set_raw(&UserScope::Guest, "{not json");
        let err = storage.get_all(&UserScope::Guest).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt(_)));
    }

    #[tokio::test]
    async fn stored_json_lives_under_meals_key() {
        let storage = LocalStoragePersistence::new();
        storage.add(&UserScope::Guest, &record("1", 200.0)).await.unwrap();
        assert_eq!(LocalStoragePersistence::storage_key(&UserScope::Guest), "meals_guest");
        let raw = storage.raw(&UserScope::Guest).unwrap();
        assert!(raw.contains("\"type\":\"Dinner\""));
        assert!(raw.contains("\"date\":\"2024-05-01\""));
    }
}
