//! Safety-aware utility scoring for candidate responses.
//!
//! `utility = a*engagement - b*pii_risk - g*behavioral_harm`, with hard caps
//! on the two penalty axes that no amount of engagement can buy back.

use crate::guardrails::output::FALLBACK_UTTERANCES;
use serde::{Deserialize, Serialize};

/// Weights for the utility objective. Harm carries the heaviest penalty by
/// default. Treat the numbers as deployment configuration, not calibrated
/// constants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UtilityWeights {
    /// Alpha: reward for keeping the counterparty engaged.
    pub engagement: f64,
    /// Beta: penalty for anything that smells like real PII.
    pub pii_risk: f64,
    /// Gamma: penalty for harmful behavior.
    pub behavioral_harm: f64,
}

impl Default for UtilityWeights {
    fn default() -> Self {
        Self {
            engagement: 1.0,
            pii_risk: 0.8,
            behavioral_harm: 1.2,
        }
    }
}

/// Hard safety caps, enforced independently of overall utility.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SafetyCaps {
    pub max_pii_risk: f64,
    pub max_behavioral_harm: f64,
}

impl Default for SafetyCaps {
    fn default() -> Self {
        Self {
            max_pii_risk: 0.3,
            max_behavioral_harm: 0.2,
        }
    }
}

/// Conversation facts the scorer needs to judge a candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreContext {
    pub turn_number: u32,
    pub artifacts_extracted: usize,
}

/// Per-candidate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEvaluation {
    pub engagement: f64,
    pub pii_risk: f64,
    pub behavioral_harm: f64,
    pub utility: f64,
    pub is_safe: bool,
}

/// Outcome of candidate selection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub text: String,
    pub evaluation: ResponseEvaluation,
    /// True when every candidate was unsafe and the neutral fallback was
    /// substituted.
    pub used_fallback: bool,
}

// After this many turns with almost nothing extracted, continued stalling is
// itself scored as harm: time-wasting without intelligence gain is a cost.
const UNPRODUCTIVE_TURNS: u32 = 30;
const MIN_PRODUCTIVE_ARTIFACTS: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct UtilityScorer {
    weights: UtilityWeights,
    caps: SafetyCaps,
}

impl UtilityScorer {
    pub fn new(weights: UtilityWeights, caps: SafetyCaps) -> Self {
        Self { weights, caps }
    }

    pub fn score(&self, candidate: &str, ctx: ScoreContext) -> ResponseEvaluation {
        let engagement = engagement_score(candidate);
        let pii_risk = pii_risk(candidate);
        let behavioral_harm = behavioral_harm(candidate, ctx);

        let utility = self.weights.engagement * engagement
            - self.weights.pii_risk * pii_risk
            - self.weights.behavioral_harm * behavioral_harm;

        ResponseEvaluation {
            engagement,
            pii_risk,
            behavioral_harm,
            utility,
            is_safe: pii_risk <= self.caps.max_pii_risk
                && behavioral_harm <= self.caps.max_behavioral_harm,
        }
    }

    /// Evaluate all candidates, discard unsafe ones, return the highest
    /// utility survivor. With no survivors the fixed neutral fallback is
    /// returned and flagged; this path never yields nothing.
    pub fn select_best(&self, candidates: &[String], ctx: ScoreContext) -> Selection {
        let mut best: Option<(usize, ResponseEvaluation)> = None;

        for (i, candidate) in candidates.iter().enumerate() {
            let eval = self.score(candidate, ctx);
            if !eval.is_safe {
                continue;
            }
            let better = match &best {
                Some((_, current)) => eval.utility > current.utility,
                None => true,
            };
            if better {
                best = Some((i, eval));
            }
        }

        match best {
            Some((i, evaluation)) => Selection {
                text: candidates[i].clone(),
                evaluation,
                used_fallback: false,
            },
            None => {
                let fallback = FALLBACK_UTTERANCES[0];
                Selection {
                    text: fallback.to_string(),
                    evaluation: self.score(fallback, ctx),
                    used_fallback: true,
                }
            }
        }
    }
}

/// How well the candidate keeps the counterparty talking: cooperation and
/// questions up, refusal and persona breaks down.
fn engagement_score(candidate: &str) -> f64 {
    let lowered = candidate.to_ascii_lowercase();
    let mut score: f64 = 0.5;

    const COOPERATIVE: &[&str] = &["yes", "okay", "sure", "will do", "of course"];
    const QUESTIONING: &[&str] = &["?", "how", "what", "when", "where"];
    const REFUSING: &[&str] = &["no,", "can't", "cannot", "won't", "refuse"];
    const PERSONA_BREAKING: &[&str] = &["scam", "fraud", "police", "report you"];

    if COOPERATIVE.iter().any(|w| lowered.contains(w)) {
        score += 0.2;
    }
    if QUESTIONING.iter().any(|w| lowered.contains(w)) {
        score += 0.15;
    }
    if candidate.split_whitespace().count() > 10 {
        score += 0.1;
    }
    if REFUSING.iter().any(|w| lowered.contains(w)) {
        score -= 0.3;
    }
    if PERSONA_BREAKING.iter().any(|w| lowered.contains(w)) {
        score -= 0.5;
    }

    score.clamp(0.0, 1.0)
}

/// Risk that the candidate discloses or confirms real credentials.
fn pii_risk(candidate: &str) -> f64 {
    let lowered = candidate.to_ascii_lowercase();
    let mut risk: f64 = 0.0;

    const HIGH_RISK: &[&str] = &[
        "password",
        "pin",
        "otp",
        "cvv",
        "real account",
        "actual account",
        "my real",
        "actual number",
    ];
    for pattern in HIGH_RISK {
        if lowered.contains(pattern) {
            risk += 0.4;
        }
    }

    // Confirmation language around data is only acceptable for obviously
    // fabricated data; penalize it lightly.
    const CONFIRMING: &[&str] = &["verify", "confirm", "authentic"];
    if CONFIRMING.iter().any(|w| lowered.contains(w)) {
        risk += 0.1;
    }

    risk.min(1.0)
}

/// Harm from the candidate itself plus harm from unproductive stalling.
fn behavioral_harm(candidate: &str, ctx: ScoreContext) -> f64 {
    let lowered = candidate.to_ascii_lowercase();
    let mut harm: f64 = 0.0;

    if ctx.turn_number > UNPRODUCTIVE_TURNS && ctx.artifacts_extracted < MIN_PRODUCTIVE_ARTIFACTS {
        harm += 0.2;
    }

    const ILLEGAL: &[&str] = &["steal", "hack", "break into", "illegal"];
    if ILLEGAL.iter().any(|w| lowered.contains(w)) {
        harm += 0.5;
    }

    const HOSTILE: &[&str] = &["stupid", "idiot", "fool", "hate you"];
    if HOSTILE.iter().any(|w| lowered.contains(w)) {
        harm += 0.3;
    }

    harm.min(1.0)
}
