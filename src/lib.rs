//! Meal-resolution pipeline and optimistic diary store behind the MealMind app.

pub mod analysis;
pub mod config;
pub mod diary;
pub mod logging;
pub mod state;
pub mod storage;

pub use state::AppState;
