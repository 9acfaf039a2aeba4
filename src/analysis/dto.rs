use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// What the user handed us: a captured photo or a free-text description.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisInput {
    Image(Bytes),
    Text(String),
}

impl AnalysisInput {
    pub fn image(bytes: impl Into<Bytes>) -> Self {
        Self::Image(bytes.into())
    }

    pub fn text(description: impl Into<String>) -> Self {
        Self::Text(description.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Image(bytes) => bytes.is_empty(),
            Self::Text(text) => text.trim().is_empty(),
        }
    }

    pub fn kind(&self) -> InputKind {
        match self {
            Self::Image(_) => InputKind::Image,
            Self::Text(_) => InputKind::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Image,
    Text,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Text => f.write_str("text"),
        }
    }
}

/// Which provider produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Remote,
    Local,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => f.write_str("remote"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// Nutrition estimate for one inference call. Fields match the oracle's JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub name: String,
    pub calories: f64,   // kcal
    pub protein: f64,    // g
    pub carbs: f64,      // g
    pub fat: f64,        // g
    pub sugar: f64,      // g
    pub confidence: f64, // 0..=100
}

impl AnalysisResult {
    /// Checks the ranges the oracle is supposed to respect.
    pub fn validate(&self) -> Result<(), String> {
        let nutrients = [
            ("calories", self.calories),
            ("protein", self.protein),
            ("carbs", self.carbs),
            ("fat", self.fat),
            ("sugar", self.sugar),
        ];
        for (field, value) in nutrients {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{field} must be a non-negative number, got {value}"));
            }
        }
        if !(0.0..=100.0).contains(&self.confidence) {
            return Err(format!(
                "confidence must be within 0..=100, got {}",
                self.confidence
            ));
        }
        Ok(())
    }
}
