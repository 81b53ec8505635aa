use crate::stage::ScamStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::Display;

// Stopping-policy constants. These mirror the engagement economics the rest
// of the loop assumes: a confident scam with thin extraction is still worth
// probing, a long conversation with nothing to show is not.
const HIGH_CONFIDENCE: f64 = 0.7;
const MIN_SLOTS_AT_HIGH_CONFIDENCE: usize = 5;
const MAX_UNPRODUCTIVE_TURNS: u32 = 50;
const MIN_COMPLETION_RATE: f64 = 0.3;

/// What the engine is trying to pry out of the counterparty.
///
/// Priority order is the declaration order: financial artifacts first, then
/// contact and identity. `NextGoalTopic` walks this order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExtractionGoal {
    BankAccount,
    PaymentHandle,
    RoutingCode,
    PhoneNumber,
    Email,
    Url,
    CounterpartName,
    Organization,
}

impl ExtractionGoal {
    pub const PRIORITY: [ExtractionGoal; 8] = [
        ExtractionGoal::BankAccount,
        ExtractionGoal::PaymentHandle,
        ExtractionGoal::RoutingCode,
        ExtractionGoal::PhoneNumber,
        ExtractionGoal::Email,
        ExtractionGoal::Url,
        ExtractionGoal::CounterpartName,
        ExtractionGoal::Organization,
    ];
}

/// A named fact with provenance. Slots only move upward: re-adding replaces
/// value/confidence/turn but a slot, once set, is never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueSlot {
    pub name: String,
    pub value: String,
    pub confidence: f64,
    pub source_turn: u32,
    pub confirmed: bool,
}

/// Durable per-conversation dialogue memory: filled slots, extraction goals,
/// and behavioral observations about the counterparty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialogueState {
    pub turn_number: u32,
    slots: BTreeMap<String, DialogueSlot>,
    active_goals: BTreeSet<ExtractionGoal>,
    completed_goals: BTreeSet<ExtractionGoal>,
    pub scam_confidence: f64,
    pub current_stage: Option<ScamStage>,
    manipulation_tactics: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl DialogueState {
    /// Fresh state seeded with the default goal set a new engagement starts
    /// probing for.
    pub fn new() -> Self {
        let mut state = Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        };
        state.add_goal(ExtractionGoal::PaymentHandle);
        state.add_goal(ExtractionGoal::BankAccount);
        state.add_goal(ExtractionGoal::PhoneNumber);
        state
    }

    // ── Slots ───────────────────────────────────────────────────────────

    /// Add or overwrite a slot. Overwrites keep the slot's history of having
    /// been set (the confirmed flag survives) but take the new value,
    /// confidence, and turn.
    pub fn add_slot(&mut self, name: &str, value: impl Into<String>, confidence: f64) {
        let confidence = confidence.clamp(0.0, 1.0);
        match self.slots.get_mut(name) {
            Some(slot) => {
                slot.value = value.into();
                slot.confidence = confidence;
                slot.source_turn = self.turn_number;
            }
            None => {
                self.slots.insert(
                    name.to_string(),
                    DialogueSlot {
                        name: name.to_string(),
                        value: value.into(),
                        confidence,
                        source_turn: self.turn_number,
                        confirmed: false,
                    },
                );
            }
        }
    }

    pub fn has_slot(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn slot(&self, name: &str) -> Option<&DialogueSlot> {
        self.slots.get(name)
    }

    pub fn confirm_slot(&mut self, name: &str) {
        if let Some(slot) = self.slots.get_mut(name) {
            slot.confirmed = true;
        }
    }

    pub fn filled_slots(&self) -> usize {
        self.slots.len()
    }

    // ── Goals ───────────────────────────────────────────────────────────

    /// Activate a goal. A no-op if the goal was already completed: completion
    /// is irreversible within a conversation.
    pub fn add_goal(&mut self, goal: ExtractionGoal) {
        if !self.completed_goals.contains(&goal) {
            self.active_goals.insert(goal);
        }
    }

    /// Move a goal to completed. Idempotent; completing a goal that was never
    /// active still records it as completed.
    pub fn complete_goal(&mut self, goal: ExtractionGoal) {
        self.active_goals.remove(&goal);
        self.completed_goals.insert(goal);
    }

    pub fn active_goals(&self) -> impl Iterator<Item = ExtractionGoal> + '_ {
        self.active_goals.iter().copied()
    }

    pub fn is_completed(&self, goal: ExtractionGoal) -> bool {
        self.completed_goals.contains(&goal)
    }

    pub fn completion_rate(&self) -> f64 {
        let total = self.active_goals.len() + self.completed_goals.len();
        if total == 0 {
            return 0.0;
        }
        self.completed_goals.len() as f64 / total as f64
    }

    // ── Behavioral observations ─────────────────────────────────────────

    /// Record a manipulation tactic, deduplicated, preserving first-seen order.
    pub fn record_tactic(&mut self, tactic: &str) {
        if !self.manipulation_tactics.iter().any(|t| t == tactic) {
            self.manipulation_tactics.push(tactic.to_string());
        }
    }

    pub fn tactics(&self) -> &[String] {
        &self.manipulation_tactics
    }

    // ── Turn bookkeeping ────────────────────────────────────────────────

    pub fn increment_turn(&mut self) {
        self.turn_number += 1;
    }

    /// Merge a fresh confidence reading, keeping the maximum ever observed.
    /// Detection signals are untrusted; they may only raise our belief.
    pub fn merge_confidence(&mut self, confidence: f64) {
        self.scam_confidence = self.scam_confidence.max(confidence.clamp(0.0, 1.0));
    }

    // ── Stopping policy ─────────────────────────────────────────────────

    /// Whether the conversation is still worth a next turn.
    ///
    /// Continue while any goal is active, or while confidence is high but
    /// extraction thin. Stop once many turns have passed with little to show.
    pub fn should_continue_engagement(&self) -> bool {
        if self.turn_number > MAX_UNPRODUCTIVE_TURNS && self.completion_rate() < MIN_COMPLETION_RATE
        {
            return false;
        }

        if !self.active_goals.is_empty() {
            return true;
        }

        self.scam_confidence > HIGH_CONFIDENCE && self.slots.len() < MIN_SLOTS_AT_HIGH_CONFIDENCE
    }

    /// Highest-priority still-active goal: the topic to probe for next.
    pub fn next_goal_topic(&self) -> Option<ExtractionGoal> {
        ExtractionGoal::PRIORITY
            .into_iter()
            .find(|goal| self.active_goals.contains(goal))
    }

    /// Tone the response generator should adopt for the current stage.
    pub fn recommended_tone(&self) -> &'static str {
        match self.current_stage {
            None | Some(ScamStage::InitialContact) => "curious",
            Some(ScamStage::TrustBuilding | ScamStage::UrgencyCreation) => "trusting",
            Some(ScamStage::PaymentRequest | ScamStage::Escalation) => "hesitant",
            Some(ScamStage::InformationGathering | ScamStage::Resolution) => "neutral",
        }
    }
}
