//! evaluation.rs — Result types for the four-pillar cognitive-load score.

use serde::{Deserialize, Serialize};

/// Fixed pillar weights (30/40/20/10). These define the scoring method; the
/// model is told about them in the prompt but they are authored here.
pub const WEIGHT_AMBIGUITY: f64 = 0.30;
pub const WEIGHT_TECHNICAL_COMPLEXITY: f64 = 0.40;
pub const WEIGHT_CONTEXT_SWITCHING: f64 = 0.20;
pub const WEIGHT_TECHNICAL_DEBT: f64 = 0.10;

/// Per-pillar integer scores. 1-10 when reported by the model; 0 marks a
/// pillar the model left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PillarBreakdown {
    pub ambiguity: u8,
    pub technical_complexity: u8,
    pub context_switching: u8,
    pub technical_debt: u8,
}

/// The weight labels attached to every evaluation. Serialized shape matches
/// the breakdown keys so the UI can zip them together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PillarWeights {
    pub ambiguity: f64,
    pub technical_complexity: f64,
    pub context_switching: f64,
    pub technical_debt: f64,
}

impl PillarWeights {
    pub const fn fixed() -> Self {
        Self {
            ambiguity: WEIGHT_AMBIGUITY,
            technical_complexity: WEIGHT_TECHNICAL_COMPLEXITY,
            context_switching: WEIGHT_CONTEXT_SWITCHING,
            technical_debt: WEIGHT_TECHNICAL_DEBT,
        }
    }
}

impl Default for PillarWeights {
    fn default() -> Self {
        Self::fixed()
    }
}

/// One finished evaluation: overall score in [1,10], the model's short
/// reasoning, and the normalized per-pillar breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: u8,
    pub reason: String,
    pub breakdown: PillarBreakdown,
    pub weights: PillarWeights,
}

impl Evaluation {
    pub fn new(score: u8, reason: impl Into<String>, breakdown: PillarBreakdown) -> Self {
        Self {
            score,
            reason: reason.into(),
            breakdown,
            weights: PillarWeights::fixed(),
        }
    }
}
