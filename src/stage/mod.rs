use serde::{Deserialize, Serialize};
use strum::Display;

/// Phases of a canonical scam script, in the order they typically unfold.
///
/// `Resolution` is absorbing: once a conversation reaches it the model never
/// predicts a transition back out.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScamStage {
    #[default]
    InitialContact,
    TrustBuilding,
    InformationGathering,
    UrgencyCreation,
    PaymentRequest,
    Escalation,
    Resolution,
}

impl ScamStage {
    /// Fixed catalogue order. Matrix rows and columns index into this.
    pub const ALL: [ScamStage; 7] = [
        ScamStage::InitialContact,
        ScamStage::TrustBuilding,
        ScamStage::InformationGathering,
        ScamStage::UrgencyCreation,
        ScamStage::PaymentRequest,
        ScamStage::Escalation,
        ScamStage::Resolution,
    ];

    fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    /// Stages where a wrong automated response is most costly. Responses in
    /// these stages are always routed through human review.
    pub fn is_critical(self) -> bool {
        matches!(self, ScamStage::PaymentRequest | ScamStage::Escalation)
    }

    /// Coarse risk label surfaced to the review interface.
    pub fn risk_level(self) -> &'static str {
        match self {
            ScamStage::InitialContact | ScamStage::Resolution => "low",
            ScamStage::TrustBuilding => "medium",
            ScamStage::InformationGathering => "medium-high",
            ScamStage::UrgencyCreation => "high",
            ScamStage::PaymentRequest | ScamStage::Escalation => "critical",
        }
    }
}

/// One prediction step: full posterior over the stage catalogue plus the
/// arg-max stage and its probability mass.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePrediction {
    pub stage: ScamStage,
    pub confidence: f64,
    pub distribution: [f64; 7],
}

impl StagePrediction {
    pub fn probability_of(&self, stage: ScamStage) -> f64 {
        self.distribution[stage.index()]
    }
}

// Row-stochastic transition matrix P(next | current). Mass concentrates on
// the diagonal and the immediately following stage; the final row is the
// identity row so Resolution absorbs.
const TRANSITIONS: [[f64; 7]; 7] = [
    // from:        IC    TB    IG    UC    PR    ES    RS
    /* IC */ [0.30, 0.50, 0.10, 0.05, 0.03, 0.01, 0.01],
    /* TB */ [0.05, 0.35, 0.45, 0.10, 0.03, 0.01, 0.01],
    /* IG */ [0.02, 0.10, 0.40, 0.35, 0.10, 0.02, 0.01],
    /* UC */ [0.01, 0.05, 0.10, 0.35, 0.40, 0.08, 0.01],
    /* PR */ [0.01, 0.02, 0.05, 0.15, 0.40, 0.30, 0.07],
    /* ES */ [0.01, 0.01, 0.03, 0.10, 0.30, 0.40, 0.15],
    /* RS */ [0.00, 0.00, 0.00, 0.00, 0.00, 0.00, 1.00],
];

// First-turn prior, weighted heavily toward initial contact.
const INITIAL: [f64; 7] = [0.70, 0.20, 0.05, 0.03, 0.01, 0.01, 0.00];

const STAGE_INDICATORS: [&[&str]; 7] = [
    &[
        "hello", "hi", "greetings", "dear", "sir", "madam", "need help", "opportunity", "winner",
        "selected",
    ],
    &[
        "trust",
        "legitimate",
        "verified",
        "official",
        "registered",
        "government",
        "company",
        "organization",
        "certificate",
    ],
    &[
        "name", "address", "details", "information", "confirm", "verify", "account", "number",
        "email", "phone",
    ],
    &[
        "urgent",
        "immediately",
        "now",
        "today",
        "hurry",
        "limited time",
        "expire",
        "deadline",
        "quick",
        "fast",
        "asap",
    ],
    &[
        "pay", "payment", "money", "transfer", "send", "amount", "fee", "charge", "cost", "price",
        "upi", "bank",
    ],
    &[
        "final",
        "last chance",
        "warning",
        "consequences",
        "legal",
        "police",
        "arrest",
        "penalty",
        "fine",
        "action",
    ],
    &[
        "thank you",
        "goodbye",
        "completed",
        "done",
        "received",
        "confirmed",
        "bye",
        "take care",
    ],
];

/// Markov-chain stage model with lexical emission weights.
///
/// Stateless across calls: the only carried context is the caller-supplied
/// previous stage, which the dialogue state tracker stores between turns.
#[derive(Debug, Clone, Default)]
pub struct StagePredictor;

impl StagePredictor {
    pub fn new() -> Self {
        Self
    }

    /// Predict the stage the conversation occupies after observing `text`.
    ///
    /// The posterior is the elementwise product of the transition row for
    /// `previous` (or the initial prior on the first turn) and the emission
    /// vector for `text`, renormalized. When the message carries no lexical
    /// signal at all, the transition row is returned unmodified so the
    /// prediction degrades gracefully instead of to NaN or uniform noise.
    pub fn predict(&self, previous: Option<ScamStage>, text: &str) -> StagePrediction {
        let prior = match previous {
            Some(stage) => TRANSITIONS[stage.index()],
            None => INITIAL,
        };

        let emissions = emission_weights(text);
        let mut posterior = [0.0_f64; 7];
        let mut total = 0.0;

        if emissions.iter().all(|w| *w == 0.0) {
            posterior = prior;
            total = prior.iter().sum();
        } else {
            for i in 0..7 {
                posterior[i] = prior[i] * emissions[i];
                total += posterior[i];
            }
            // Emissions can zero out every reachable stage (signal only for
            // stages the prior excludes); fall back to the prior there too.
            if total <= f64::EPSILON {
                posterior = prior;
                total = prior.iter().sum();
            }
        }

        for p in &mut posterior {
            *p /= total;
        }

        let (best_idx, best_mass) = posterior
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, p)| (i, *p))
            .unwrap_or((0, 1.0));

        StagePrediction {
            stage: ScamStage::ALL[best_idx],
            confidence: best_mass,
            distribution: posterior,
        }
    }

    /// Transition probability between two stages, exposed for diagnostics.
    pub fn transition_probability(&self, from: ScamStage, to: ScamStage) -> f64 {
        TRANSITIONS[from.index()][to.index()]
    }
}

/// Keyword-density emission weight per stage: matched indicators over
/// indicator count. Zero when nothing matches.
fn emission_weights(text: &str) -> [f64; 7] {
    let lowered = text.to_lowercase();
    let mut weights = [0.0_f64; 7];
    for (i, indicators) in STAGE_INDICATORS.iter().enumerate() {
        let matches = indicators.iter().filter(|kw| lowered.contains(**kw)).count();
        weights[i] = matches as f64 / indicators.len() as f64;
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn transition_rows_sum_to_one() {
        for (i, row) in TRANSITIONS.iter().enumerate() {
            let sum: f64 = row.iter().sum();
            assert!(
                (sum - 1.0).abs() < TOLERANCE,
                "row {i} sums to {sum}, expected 1.0"
            );
        }
    }

    #[test]
    fn resolution_row_is_identity() {
        let row = TRANSITIONS[6];
        assert_eq!(row[6], 1.0);
        assert!(row[..6].iter().all(|p| *p == 0.0));
    }

    #[test]
    fn initial_prior_sums_to_one() {
        let sum: f64 = INITIAL.iter().sum();
        assert!((sum - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn prediction_is_a_valid_distribution() {
        let predictor = StagePredictor::new();
        let inputs = [
            "hello dear sir, you are a winner",
            "pay the fee immediately via upi",
            "",
            "%%%%$$$$",
            "final warning, police action today",
        ];
        for input in inputs {
            for previous in [None, Some(ScamStage::TrustBuilding), Some(ScamStage::Resolution)] {
                let prediction = predictor.predict(previous, input);
                let sum: f64 = prediction.distribution.iter().sum();
                assert!((sum - 1.0).abs() < 1e-6, "distribution sums to {sum}");
                for p in prediction.distribution {
                    assert!(p.is_finite());
                    assert!((0.0..=1.0).contains(&p), "probability {p} out of range");
                }
            }
        }
    }

    #[test]
    fn first_turn_defaults_toward_initial_contact() {
        let predictor = StagePredictor::new();
        let prediction = predictor.predict(None, "hello sir, great opportunity for you");
        assert_eq!(prediction.stage, ScamStage::InitialContact);
        assert!(prediction.confidence > 0.5);
    }

    #[test]
    fn payment_language_pulls_prediction_forward() {
        let predictor = StagePredictor::new();
        let prediction = predictor.predict(
            Some(ScamStage::UrgencyCreation),
            "send the payment now, transfer the amount to my upi",
        );
        assert_eq!(prediction.stage, ScamStage::PaymentRequest);
    }

    #[test]
    fn no_lexical_signal_falls_back_to_transition_row() {
        let predictor = StagePredictor::new();
        let prediction = predictor.predict(Some(ScamStage::TrustBuilding), "zzz qqq xxx");
        let row = TRANSITIONS[1];
        for i in 0..7 {
            assert!((prediction.distribution[i] - row[i]).abs() < TOLERANCE);
        }
    }

    #[test]
    fn resolution_is_absorbing() {
        let predictor = StagePredictor::new();
        let prediction = predictor.predict(
            Some(ScamStage::Resolution),
            "urgent payment needed immediately",
        );
        assert_eq!(prediction.stage, ScamStage::Resolution);
        assert!((prediction.confidence - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn critical_stages_are_payment_and_escalation() {
        assert!(ScamStage::PaymentRequest.is_critical());
        assert!(ScamStage::Escalation.is_critical());
        assert!(!ScamStage::TrustBuilding.is_critical());
        assert!(!ScamStage::Resolution.is_critical());
        assert_eq!(ScamStage::PaymentRequest.risk_level(), "critical");
        assert_eq!(ScamStage::InitialContact.risk_level(), "low");
    }

    #[test]
    fn stage_display_is_snake_case() {
        assert_eq!(ScamStage::InitialContact.to_string(), "initial_contact");
        assert_eq!(ScamStage::PaymentRequest.to_string(), "payment_request");
    }
}
