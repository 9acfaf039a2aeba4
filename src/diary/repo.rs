use anyhow::Context;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::Date;
use tracing::{debug, instrument};

use super::dto::{DiaryRecord, MealId, MealType, UserScope};
use crate::storage::{PersistenceAdapter, PersistenceError};

/// Row in `diary_records`.
#[derive(Debug, Clone, FromRow)]
pub struct DiaryRow {
    pub id: String,
    pub date: Date,
    pub time: String,
    pub name: String,
    pub calories: f64,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub sugar: Option<f64>,
    pub image_url: Option<String>,
    pub meal_type: String,
}

impl TryFrom<DiaryRow> for DiaryRecord {
    type Error = PersistenceError;

    fn try_from(r: DiaryRow) -> Result<Self, Self::Error> {
        let meal_type: MealType = r.meal_type.parse().map_err(PersistenceError::Corrupt)?;
        Ok(Self {
            id: MealId(r.id),
            date: r.date,
            time: r.time,
            name: r.name,
            calories: r.calories,
            protein: r.protein,
            carbs: r.carbs,
            fat: r.fat,
            sugar: r.sugar,
            image_url: r.image_url,
            meal_type,
        })
    }
}

const COLUMNS: &str =
    "id, date, time, name, calories, protein, carbs, fat, sugar, image_url, meal_type";

/// Newest first.
pub async fn list_by_scope(db: &PgPool, scope: &str) -> anyhow::Result<Vec<DiaryRow>> {
    let rows = sqlx::query_as::<_, DiaryRow>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM diary_records
        WHERE scope = $1
        ORDER BY created_at DESC, id DESC
        "#
    ))
    .bind(scope)
    .fetch_all(db)
    .await
    .context("list diary records")?;
    Ok(rows)
}

pub async fn insert_record(db: &PgPool, scope: &str, r: &DiaryRecord) -> anyhow::Result<DiaryRow> {
    let row = sqlx::query_as::<_, DiaryRow>(&format!(
        r#"
        INSERT INTO diary_records
            (scope, id, date, time, name, calories, protein, carbs, fat, sugar,
             image_url, meal_type)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(scope)
    .bind(r.id.as_str())
    .bind(r.date)
    .bind(&r.time)
    .bind(&r.name)
    .bind(r.calories)
    .bind(r.protein)
    .bind(r.carbs)
    .bind(r.fat)
    .bind(r.sugar)
    .bind(r.image_url.as_deref())
    .bind(r.meal_type.as_str())
    .fetch_one(db)
    .await
    .with_context(|| format!("insert diary record {}", r.id))?;
    Ok(row)
}

/// `None` when no row matched.
pub async fn update_record(
    db: &PgPool,
    scope: &str,
    r: &DiaryRecord,
) -> anyhow::Result<Option<DiaryRow>> {
    let row = sqlx::query_as::<_, DiaryRow>(&format!(
        r#"
        UPDATE diary_records
           SET date = $3, time = $4, name = $5, calories = $6, protein = $7,
               carbs = $8, fat = $9, sugar = $10, image_url = $11, meal_type = $12
         WHERE scope = $1 AND id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(scope)
    .bind(r.id.as_str())
    .bind(r.date)
    .bind(&r.time)
    .bind(&r.name)
    .bind(r.calories)
    .bind(r.protein)
    .bind(r.carbs)
    .bind(r.fat)
    .bind(r.sugar)
    .bind(r.image_url.as_deref())
    .bind(r.meal_type.as_str())
    .fetch_optional(db)
    .await
    .with_context(|| format!("update diary record {}", r.id))?;
    Ok(row)
}

/// Returns the number of rows removed.
pub async fn delete_record(db: &PgPool, scope: &str, id: &MealId) -> anyhow::Result<u64> {
    let done = sqlx::query("DELETE FROM diary_records WHERE scope = $1 AND id = $2")
        .bind(scope)
        .bind(id.as_str())
        .execute(db)
        .await
        .with_context(|| format!("delete diary record {}", id))?;
    Ok(done.rows_affected())
}

/// Remote-database mirror of the diary.
#[derive(Clone)]
pub struct PgPersistence {
    db: PgPool,
}

impl PgPersistence {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run diary migrations")?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceAdapter for PgPersistence {
    #[instrument(skip(self), fields(scope = %scope))]
    async fn get_all(&self, scope: &UserScope) -> Result<Vec<DiaryRecord>, PersistenceError> {
        let rows = list_by_scope(&self.db, &scope.storage_key()).await?;
        debug!(count = rows.len(), "loaded diary rows");
        rows.into_iter().map(DiaryRecord::try_from).collect()
    }

    #[instrument(skip(self, record), fields(scope = %scope, record_id = %record.id))]
    async fn add(
        &self,
        scope: &UserScope,
        record: &DiaryRecord,
    ) -> Result<DiaryRecord, PersistenceError> {
        insert_record(&self.db, &scope.storage_key(), record).await?.try_into()
    }

    #[instrument(skip(self, record), fields(scope = %scope, record_id = %record.id))]
    async fn update(
        &self,
        scope: &UserScope,
        record: &DiaryRecord,
    ) -> Result<DiaryRecord, PersistenceError> {
        update_record(&self.db, &scope.storage_key(), record)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(record.id.clone()))?
            .try_into()
    }

    #[instrument(skip(self), fields(scope = %scope))]
    async fn delete(&self, scope: &UserScope, id: &MealId) -> Result<(), PersistenceError> {
        let removed = delete_record(&self.db, &scope.storage_key(), id).await?;
        debug!(removed, "deleted diary rows");
        Ok(())
    }
}
