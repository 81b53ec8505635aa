use super::state::{ConversationState, ConversationStatus};
use crate::signals::ArtifactKind;
use crate::stage::ScamStage;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Per-turn response posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Strategy {
    /// Build rapport, keep them talking.
    Engage,
    /// Actively probe for the next extraction goal.
    Extract,
    /// Delay with excuses while the clock runs.
    Stall,
    /// Politely disengage and close out.
    Exit,
}

impl Strategy {
    /// The lifecycle status a turn ends in under this strategy.
    pub fn next_status(self) -> ConversationStatus {
        match self {
            Strategy::Engage | Strategy::Extract => ConversationStatus::Active,
            Strategy::Stall => ConversationStatus::Stalling,
            Strategy::Exit => ConversationStatus::Completed,
        }
    }
}

// Financial artifacts already in hand drive the shift from probing to
// stalling.
fn critical_artifacts(state: &ConversationState) -> usize {
    state.artifacts(ArtifactKind::PaymentHandle).count()
        + state.artifacts(ArtifactKind::BankAccount).count()
}

/// Choose the turn's strategy from goal state, turn count, and the predicted
/// stage.
pub fn decide(state: &ConversationState, stage: ScamStage) -> Strategy {
    if !state.dialogue.should_continue_engagement() {
        return Strategy::Exit;
    }

    // A critical stage means the counterparty is pushing payment details at
    // us; probe for them while the window is open.
    if stage.is_critical() && state.dialogue.next_goal_topic().is_some() {
        return Strategy::Extract;
    }

    // Low confidence: engage cautiously until detection firms up.
    if state.detection_confidence < 0.5 {
        return Strategy::Engage;
    }

    // Early turns build trust before probing.
    if state.turn() < 5 {
        return Strategy::Engage;
    }

    let critical = critical_artifacts(state);
    if critical < 2 && state.turn() < 15 {
        return Strategy::Extract;
    }
    if critical >= 1 {
        return Strategy::Stall;
    }

    Strategy::Engage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::PersonaRoster;

    fn confident_state(turns: u32) -> ConversationState {
        let mut state =
            ConversationState::new("scammer", PersonaRoster::new().for_scam_type("unknown"));
        state.merge_detection("bank_kyc_fraud", 0.9);
        for _ in 0..turns {
            state.begin_turn();
        }
        state
    }

    #[test]
    fn exhausted_engagement_exits() {
        let mut state = confident_state(51);
        // All default goals still open at turn 51 => completion rate 0.
        state.dialogue.complete_goal(crate::dst::ExtractionGoal::PhoneNumber);
        state.dialogue.add_goal(crate::dst::ExtractionGoal::Email);
        assert!(!state.dialogue.should_continue_engagement());
        assert_eq!(decide(&state, ScamStage::TrustBuilding), Strategy::Exit);
    }

    #[test]
    fn critical_stage_with_open_goals_extracts() {
        let state = confident_state(2);
        assert_eq!(decide(&state, ScamStage::PaymentRequest), Strategy::Extract);
    }

    #[test]
    fn low_confidence_engages_cautiously() {
        let mut state =
            ConversationState::new("maybe", PersonaRoster::new().for_scam_type("unknown"));
        state.merge_detection("unknown", 0.3);
        state.begin_turn();
        assert_eq!(decide(&state, ScamStage::InitialContact), Strategy::Engage);
    }

    #[test]
    fn early_confident_turns_engage() {
        let state = confident_state(3);
        assert_eq!(decide(&state, ScamStage::TrustBuilding), Strategy::Engage);
    }

    #[test]
    fn mid_conversation_without_financials_extracts() {
        let state = confident_state(7);
        assert_eq!(decide(&state, ScamStage::InformationGathering), Strategy::Extract);
    }

    #[test]
    fn with_financials_in_hand_stalls() {
        let mut state = confident_state(16);
        state.add_artifact(ArtifactKind::PaymentHandle, "x@ybl");
        assert_eq!(decide(&state, ScamStage::InformationGathering), Strategy::Stall);
    }

    #[test]
    fn strategies_map_to_statuses() {
        assert_eq!(Strategy::Exit.next_status(), ConversationStatus::Completed);
        assert_eq!(Strategy::Stall.next_status(), ConversationStatus::Stalling);
        assert_eq!(Strategy::Engage.next_status(), ConversationStatus::Active);
    }
}
