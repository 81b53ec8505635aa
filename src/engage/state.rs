use crate::dst::DialogueState;
use crate::persona::PersonaRef;
use crate::signals::ArtifactKind;
use crate::stage::ScamStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::Display;
use uuid::Uuid;

/// Conversation lifecycle. `Completed` and `Abandoned` are terminal; once
/// there a conversation accepts no further turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Active,
    Stalling,
    Completed,
    Abandoned,
}

impl ConversationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConversationStatus::Completed | ConversationStatus::Abandoned)
    }
}

/// Everything the engine remembers about one engaged sender.
///
/// Owned and mutated exclusively by the orchestration loop for that
/// conversation; the status setter is crate-private so no other component
/// can move the lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: Uuid,
    /// Channel-level identity of the counterparty (address, number, handle).
    pub counterpart: String,
    status: ConversationStatus,
    pub scam_type: String,
    pub detection_confidence: f64,
    turn: u32,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Harvested artifacts, deduplicated per kind.
    artifacts: BTreeMap<ArtifactKind, BTreeSet<String>>,
    pub persona: PersonaRef,
    pub last_stage: Option<ScamStage>,
    pub dialogue: DialogueState,
}

impl ConversationState {
    pub fn new(counterpart: impl Into<String>, persona: PersonaRef) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            counterpart: counterpart.into(),
            status: ConversationStatus::Active,
            scam_type: "unknown".into(),
            detection_confidence: 0.0,
            turn: 0,
            started_at: now,
            last_activity: now,
            artifacts: BTreeMap::new(),
            persona,
            last_stage: None,
            dialogue: DialogueState::new(),
        }
    }

    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    /// Move the lifecycle. Terminal states are sticky: any transition out of
    /// them is ignored. Only the orchestration loop (and the manager's
    /// abandon path) can reach this.
    pub(crate) fn set_status(&mut self, status: ConversationStatus) {
        if self.status.is_terminal() {
            return;
        }
        if self.status != status {
            tracing::info!(
                conversation = %self.id,
                from = %self.status,
                to = %status,
                "Conversation status transition"
            );
            self.status = status;
        }
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Advance the turn counter and activity clock. The counter never moves
    /// backwards; `last_activity` never precedes `started_at`.
    pub(crate) fn begin_turn(&mut self) {
        self.turn += 1;
        self.dialogue.increment_turn();
        let now = Utc::now();
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Merge an untrusted scam-type/confidence reading: confidence only ever
    /// rises, and the label follows whichever reading was most confident.
    pub(crate) fn merge_detection(&mut self, scam_type: &str, confidence: f64) {
        let confidence = confidence.clamp(0.0, 1.0);
        if confidence > self.detection_confidence {
            self.detection_confidence = confidence;
            if scam_type != "unknown" {
                self.scam_type = scam_type.to_string();
            }
        }
        self.dialogue.merge_confidence(confidence);
    }

    /// Record a harvested artifact. Returns true when the value is new.
    pub(crate) fn add_artifact(&mut self, kind: ArtifactKind, value: impl Into<String>) -> bool {
        self.artifacts.entry(kind).or_default().insert(value.into())
    }

    pub fn artifacts(&self, kind: ArtifactKind) -> impl Iterator<Item = &str> {
        self.artifacts
            .get(&kind)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn artifact_count(&self) -> usize {
        self.artifacts.values().map(BTreeSet::len).sum()
    }

    pub fn duration_secs(&self) -> i64 {
        (self.last_activity - self.started_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::PersonaRoster;

    fn state() -> ConversationState {
        ConversationState::new("+91-9000000000", PersonaRoster::new().for_scam_type("unknown"))
    }

    #[test]
    fn new_state_starts_active_with_consistent_clocks() {
        let state = state();
        assert_eq!(state.status(), ConversationStatus::Active);
        assert_eq!(state.turn(), 0);
        assert!(state.last_activity >= state.started_at);
    }

    #[test]
    fn turn_counter_is_monotonic() {
        let mut state = state();
        state.begin_turn();
        state.begin_turn();
        assert_eq!(state.turn(), 2);
        assert!(state.last_activity >= state.started_at);
    }

    #[test]
    fn terminal_status_is_sticky() {
        let mut state = state();
        state.set_status(ConversationStatus::Completed);
        state.set_status(ConversationStatus::Active);
        assert_eq!(state.status(), ConversationStatus::Completed);

        let mut state = state;
        state.set_status(ConversationStatus::Abandoned);
        assert_eq!(state.status(), ConversationStatus::Completed);
    }

    #[test]
    fn detection_merges_by_max_confidence() {
        let mut state = state();
        state.merge_detection("bank_kyc_fraud", 0.8);
        state.merge_detection("lottery_prize", 0.4);
        assert_eq!(state.scam_type, "bank_kyc_fraud");
        assert_eq!(state.detection_confidence, 0.8);

        state.merge_detection("tech_support", 0.9);
        assert_eq!(state.scam_type, "tech_support");
        assert_eq!(state.detection_confidence, 0.9);
    }

    #[test]
    fn unknown_label_never_overwrites_known_type() {
        let mut state = state();
        state.merge_detection("job_scam", 0.6);
        state.merge_detection("unknown", 0.9);
        assert_eq!(state.scam_type, "job_scam");
        assert_eq!(state.detection_confidence, 0.9);
    }

    #[test]
    fn artifacts_deduplicate_per_kind() {
        let mut state = state();
        assert!(state.add_artifact(ArtifactKind::PhoneNumber, "+91-9876543210"));
        assert!(!state.add_artifact(ArtifactKind::PhoneNumber, "+91-9876543210"));
        assert!(state.add_artifact(ArtifactKind::PaymentHandle, "x@ybl"));
        assert_eq!(state.artifact_count(), 2);
        assert_eq!(
            state.artifacts(ArtifactKind::PhoneNumber).collect::<Vec<_>>(),
            vec!["+91-9876543210"]
        );
    }

    #[test]
    fn state_round_trips_through_serde() {
        let mut state = state();
        state.begin_turn();
        state.merge_detection("lottery_prize", 0.7);
        state.add_artifact(ArtifactKind::Url, "https://bad.example/");

        let json = serde_json::to_string(&state).unwrap();
        let decoded: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.id, state.id);
        assert_eq!(decoded.turn(), 1);
        assert_eq!(decoded.status(), ConversationStatus::Active);
        assert_eq!(decoded.artifact_count(), 1);
    }
}
