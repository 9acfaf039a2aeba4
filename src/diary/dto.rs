use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::analysis::AnalysisResult;

/// Caller-generated, time-based record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MealId(pub String);

impl MealId {
    /// Unix milliseconds, bumped when two ids are minted within the same ms.
    pub fn generate() -> Self {
        static LAST: AtomicI64 = AtomicI64::new(0);
        let now = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let mut prev = LAST.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match LAST.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return Self(next.to_string()),
                Err(actual) => prev = actual,
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MealId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealType {
    pub const ALL: [MealType; 4] = [Self::Breakfast, Self::Lunch, Self::Dinner, Self::Snack];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakfast => "Breakfast",
            Self::Lunch => "Lunch",
            Self::Dinner => "Dinner",
            Self::Snack => "Snack",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown meal type {s:?}"))
    }
}

/// Partition under which a user's records are stored and loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserScope {
    Guest,
    User(Uuid),
}

impl UserScope {
    pub fn storage_key(&self) -> String {
        match self {
            Self::Guest => "guest".to_string(),
            Self::User(id) => id.to_string(),
        }
    }
}

impl fmt::Display for UserScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

pub(crate) mod iso_date {
    use serde::{de::Error as _, ser::Error as _, Deserialize, Deserializer, Serializer};
    use time::{format_description::FormatItem, macros::format_description, Date};

    pub const FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        let text = date.format(FORMAT).map_err(S::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_date(&text).map_err(D::Error::custom)
    }
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(text: &str) -> Result<Date, time::error::Parse> {
    Date::parse(text, iso_date::FORMAT)
}

/// One diary entry (a meal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiaryRecord {
    pub id: MealId,
    #[serde(with = "iso_date")]
    pub date: Date, // partition key for daily totals
    pub time: String, // display only, e.g. "12:30"
    pub name: String,
    pub calories: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sugar: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(rename = "type")]
    pub meal_type: MealType,
}

impl DiaryRecord {
    /// Manual entry with calories only.
    pub fn new(
        id: MealId,
        date: Date,
        time: impl Into<String>,
        name: impl Into<String>,
        calories: f64,
        meal_type: MealType,
    ) -> Self {
        Self {
            id,
            date,
            time: time.into(),
            name: name.into(),
            calories,
            protein: None,
            carbs: None,
            fat: None,
            sugar: None,
            image_url: None,
            meal_type,
        }
    }

    /// Record for an accepted analysis, with a freshly generated id.
    pub fn from_analysis(
        result: &AnalysisResult,
        date: Date,
        time: impl Into<String>,
        meal_type: MealType,
        image_url: Option<String>,
    ) -> Self {
        Self {
            id: MealId::generate(),
            date,
            time: time.into(),
            name: result.name.clone(),
            calories: result.calories,
            protein: Some(result.protein),
            carbs: Some(result.carbs),
            fat: Some(result.fat),
            sugar: Some(result.sugar),
            image_url,
            meal_type,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.0.trim().is_empty() {
            return Err("record id must not be empty".into());
        }
        if !self.calories.is_finite() || self.calories < 0.0 {
            return Err(format!(
                "calories must be a non-negative number, got {}",
                self.calories
            ));
        }
        let macros = [
            ("protein", self.protein),
            ("carbs", self.carbs),
            ("fat", self.fat),
            ("sugar", self.sugar),
        ];
        for (field, value) in macros {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(format!("{field} must be a non-negative number, got {v}"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::date;

    #[test]
    fn record_json_uses_app_field_names() {
        let mut record = DiaryRecord::new(
            MealId::from("1"),
            date!(2024 - 01 - 01),
            "12:30",
            "Burrito",
            500.0,
            MealType::Lunch,
        );
        record.image_url = Some("file://burrito.jpg".into());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "1",
                "date": "2024-01-01",
                "time": "12:30",
                "name": "Burrito",
                "calories": 500.0,
                "imageUrl": "file://burrito.jpg",
                "type": "Lunch"
            })
        );
    }

    #[test]
    fn invalid_dates_and_types_are_rejected_on_decode() {
        let bad_date = json!({
            "id": "1", "date": "2024-02-30", "time": "", "name": "x",
            "calories": 1, "type": "Lunch"
        });
        assert!(serde_json::from_value::<DiaryRecord>(bad_date).is_err());

        let bad_type = json!({
            "id": "1", "date": "2024-02-01", "time": "", "name": "x",
            "calories": 1, "type": "Brunch"
        });
        assert!(serde_json::from_value::<DiaryRecord>(bad_type).is_err());
    }

    #[test]
    fn validate_rejects_negative_calories_and_macros() {
        let mut record = DiaryRecord::new(
            MealId::from("1"),
            date!(2024 - 01 - 01),
            "08:00",
            "Oats",
            -5.0,
            MealType::Breakfast,
        );
        assert!(record.validate().unwrap_err().contains("calories"));

        record.calories = 300.0;
        record.sugar = Some(-1.0);
        assert!(record.validate().unwrap_err().contains("sugar"));

        record.sugar = Some(4.0);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn generated_ids_are_unique_and_increasing() {
        let a: i64 = MealId::generate().0.parse().unwrap();
        let b: i64 = MealId::generate().0.parse().unwrap();
        assert!(b > a);
    }

    #[test]
    fn meal_type_parses_case_insensitively() {
        assert_eq!("snack".parse::<MealType>(), Ok(MealType::Snack));
        assert!("supper".parse::<MealType>().is_err());
    }

    #[test]
    fn parse_date_accepts_only_calendar_dates() {
        assert_eq!(parse_date("2024-01-01").unwrap(), date!(2024 - 01 - 01));
        assert!(parse_date("2024-13-01").is_err());
        assert!(parse_date("01/01/2024").is_err());
    }

    #[test]
    fn scope_keys_separate_guest_and_users() {
        let user = Uuid::new_v4();
        assert_eq!(UserScope::Guest.storage_key(), "guest");
        assert_eq!(UserScope::User(user).storage_key(), user.to_string());
    }
}
