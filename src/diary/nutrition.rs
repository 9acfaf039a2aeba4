use serde::{Deserialize, Serialize};
use time::Date;

use super::dto::DiaryRecord;

const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

pub const DEFAULT_CALORIE_GOAL: f64 = 2000.0;
pub const DEFAULT_SUGAR_TARGET: f64 = 50.0;

/// Daily goal as set on the profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutritionGoals {
    pub calories: f64,
    pub protein: Option<f64>,
    pub sugar: Option<f64>,
}

impl Default for NutritionGoals {
    fn default() -> Self {
        Self {
            calories: DEFAULT_CALORIE_GOAL,
            protein: None,
            sugar: None,
        }
    }
}

/// Per-nutrient daily targets, derived from the calorie goal on every read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Targets {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub sugar: f64,
}

impl Targets {
    /// Splits the calorie goal 30% protein / 45% carbs / 25% fat.
    pub fn from_goals(goals: &NutritionGoals) -> Self {
        let calories = goals.calories;
        Self {
            calories,
            protein: goals
                .protein
                .unwrap_or_else(|| (calories * 0.30 / KCAL_PER_G_PROTEIN).round()),
            carbs: (calories * 0.45 / KCAL_PER_G_CARBS).round(),
            fat: (calories * 0.25 / KCAL_PER_G_FAT).round(),
            sugar: goals.sugar.unwrap_or(DEFAULT_SUGAR_TARGET),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub sugar: f64,
}

/// Macro estimate for a record without explicit values:
/// 25% protein / 30% fat / 45% carbs of its calories, rounded per field.
fn estimated_macros(calories: f64) -> (f64, f64, f64) {
    (
        (calories * 0.25 / KCAL_PER_G_PROTEIN).round(),
        (calories * 0.45 / KCAL_PER_G_CARBS).round(),
        (calories * 0.30 / KCAL_PER_G_FAT).round(),
    )
}

/// Sums the records dated `date`. Missing macros fall back to the estimate;
/// missing sugar counts as zero.
pub fn totals_for<'a, I>(records: I, date: Date) -> Totals
where
    I: IntoIterator<Item = &'a DiaryRecord>,
{
    records
        .into_iter()
        .filter(|r| r.date == date)
        .fold(Totals::default(), |mut acc, r| {
            let (protein, carbs, fat) = estimated_macros(r.calories);
            acc.calories += r.calories;
            acc.protein += r.protein.unwrap_or(protein);
            acc.carbs += r.carbs.unwrap_or(carbs);
            acc.fat += r.fat.unwrap_or(fat);
            acc.sugar += r.sugar.unwrap_or(0.0);
            acc
        })
}
