use super::state::{ConversationState, ConversationStatus};
use super::strategy::{self, Strategy};
use crate::approval::{
    ApprovalPayload, ApprovalPolicy, ApprovalQueue, ApprovalRequest, Priority, RequestKind,
};
use crate::config::SafetyConfig;
use crate::dst::ExtractionGoal;
use crate::generate::{GenerationConfig, Generator};
use crate::guardrails::{GuardrailPipeline, InstructionBlocks};
use crate::score::{ScoreContext, UtilityScorer};
use crate::signals::{Artifact, DetectionSignal, Detector, Extractor};
use crate::stage::{StagePredictor, StagePrediction};
use std::sync::Arc;

/// Non-fatal degradations observed during a turn. Surfaced to the caller
/// instead of raised: every failure path below resolves to a fallback value
/// and a warning here.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnWarning {
    /// Input guardrail flagged the message; the turn ran on sanitized text.
    InputFlagged { risk_score: f64 },
    /// A detection/extraction collaborator failed; its signal was skipped.
    SignalUnavailable { source: &'static str },
    /// A generation call failed or timed out.
    GenerationFailed { message: String },
    /// A generated candidate failed the output guardrail and was dropped.
    OutputRejected,
    /// No safe candidate survived; a fallback utterance was substituted.
    FallbackUsed,
    /// A hard conversation-level limit forced this turn toward completion.
    SafetyCeiling { reason: String },
}

/// What the caller should do with the turn.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// Send this reply to the counterparty.
    Reply(String),
    /// The reply is parked in the approval queue; send nothing until a
    /// reviewer resolves it.
    PendingApproval(Box<ApprovalRequest>),
}

/// Full account of one processed turn.
#[derive(Debug)]
pub struct TurnResult {
    pub turn: u32,
    pub outcome: TurnOutcome,
    pub strategy: Strategy,
    pub stage: StagePrediction,
    pub status: ConversationStatus,
    pub new_artifacts: usize,
    pub warnings: Vec<TurnWarning>,
}

/// Everything a turn needs that is not per-conversation state. Shared across
/// all conversations; contains no interior mutability except the approval
/// queue, which synchronizes itself.
pub struct TurnEngine {
    pub(super) guardrails: GuardrailPipeline,
    pub(super) predictor: StagePredictor,
    pub(super) scorer: UtilityScorer,
    pub(super) detector: Arc<dyn Detector>,
    pub(super) extractor: Arc<dyn Extractor>,
    pub(super) generator: Arc<dyn Generator>,
    pub(super) queue: Arc<ApprovalQueue>,
    pub(super) policy: ApprovalPolicy,
    pub(super) generation: GenerationConfig,
    pub(super) safety: SafetyConfig,
    pub(super) approval_ttl: chrono::Duration,
}

impl TurnEngine {
    /// Run one full turn. Never returns an error: sub-step failures degrade
    /// to fallbacks and warnings, the turn counter always advances, and
    /// perception committed by earlier sub-steps survives later failures.
    pub async fn run_turn(&self, state: &mut ConversationState, message: &str) -> TurnResult {
        let mut warnings = Vec::new();
        state.begin_turn();

        // ── Perceive ────────────────────────────────────────────────────
        let input = self.guardrails.input.check(message);
        if input.flagged {
            tracing::warn!(
                conversation = %state.id,
                risk = input.risk_score,
                digest = %input.digest_sha256,
                "Hostile input sanitized"
            );
            warnings.push(TurnWarning::InputFlagged {
                risk_score: input.risk_score,
            });
        }
        let text = input.sanitized.as_str();

        let prediction = self.predictor.predict(state.last_stage, text);

        let signal = match self.detector.detect(text, &[]).await {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!(conversation = %state.id, "Detector failed: {e:#}");
                warnings.push(TurnWarning::SignalUnavailable { source: "detector" });
                DetectionSignal::default()
            }
        };
        let artifacts = match self.extractor.extract(text).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                tracing::warn!(conversation = %state.id, "Extractor failed: {e:#}");
                warnings.push(TurnWarning::SignalUnavailable { source: "extractor" });
                Vec::new()
            }
        };

        // ── Think ───────────────────────────────────────────────────────
        state.merge_detection(&signal.scam_type, signal.confidence);
        state.last_stage = Some(prediction.stage);
        state.dialogue.current_stage = Some(prediction.stage);

        for artifact in &artifacts {
            state.dialogue.add_slot(
                &artifact.kind.to_string(),
                artifact.value.clone(),
                artifact.confidence,
            );
            state.dialogue.complete_goal(artifact.kind.goal());
        }

        let ceiling = self.safety_ceiling_reason(state);
        if let Some(reason) = &ceiling {
            tracing::info!(conversation = %state.id, %reason, "Safety ceiling reached");
            warnings.push(TurnWarning::SafetyCeiling {
                reason: reason.clone(),
            });
        }

        // ── Decide ──────────────────────────────────────────────────────
        let strategy = if ceiling.is_some() {
            Strategy::Exit
        } else {
            strategy::decide(state, prediction.stage)
        };
        let focus = match strategy {
            Strategy::Extract => state.dialogue.next_goal_topic(),
            _ => None,
        };

        // ── Act ─────────────────────────────────────────────────────────
        let (reply, used_fallback, eval_risk) = self
            .produce_reply(state, text, strategy, focus, &mut warnings)
            .await;

        let needs_approval = !used_fallback
            && self.policy.requires_approval(
                state.detection_confidence,
                eval_risk,
                Some(prediction.stage),
            );

        let outcome = if needs_approval {
            let priority = if prediction.stage.is_critical() {
                Priority::Critical
            } else if eval_risk > 0.5 {
                Priority::High
            } else {
                Priority::Medium
            };
            let request = self.queue.submit(
                RequestKind::Response,
                ApprovalPayload {
                    conversation_id: state.id,
                    proposed_response: reply,
                    counterpart_message: text.to_string(),
                    stage: Some(prediction.stage),
                    confidence: state.detection_confidence,
                    risk_score: eval_risk,
                },
                priority,
                self.approval_ttl,
            );
            TurnOutcome::PendingApproval(Box::new(request))
        } else {
            TurnOutcome::Reply(reply)
        };

        // ── Learn ───────────────────────────────────────────────────────
        let mut new_artifacts = 0;
        for Artifact { kind, value, .. } in &artifacts {
            if state.add_artifact(*kind, value.clone()) {
                new_artifacts += 1;
            }
        }
        for tactic in &signal.tactics {
            state.dialogue.record_tactic(tactic);
        }

        if ceiling.is_some() {
            state.set_status(ConversationStatus::Completed);
        } else {
            state.set_status(strategy.next_status());
        }

        tracing::info!(
            conversation = %state.id,
            turn = state.turn(),
            %strategy,
            stage = %prediction.stage,
            status = %state.status(),
            new_artifacts,
            "Turn committed"
        );

        TurnResult {
            turn: state.turn(),
            outcome,
            strategy,
            stage: prediction,
            status: state.status(),
            new_artifacts,
            warnings,
        }
    }

    /// Generate, output-check, and score candidates. Always yields a reply:
    /// generation or validation failures collapse to a safe utterance.
    /// Returns `(reply, used_fallback, risk_score)`.
    async fn produce_reply(
        &self,
        state: &ConversationState,
        text: &str,
        strategy: Strategy,
        focus: Option<ExtractionGoal>,
        warnings: &mut Vec<TurnWarning>,
    ) -> (String, bool, f64) {
        let focus_name = focus.map(|goal| goal.to_string());
        let strategy_name = strategy.to_string();
        let blocks = InstructionBlocks {
            persona_name: &state.persona.name,
            persona_description: &state.persona.description,
            persona_style: Some(&state.persona.style),
            strategy: &strategy_name,
            tone: state.dialogue.recommended_tone(),
            focus_topic: focus_name.as_deref(),
            message: text,
        };

        let context = match self.guardrails.assembler.build(&blocks) {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(conversation = %state.id, "Prompt assembly failed: {e:#}");
                warnings.push(TurnWarning::GenerationFailed {
                    message: e.to_string(),
                });
                let fallback = self.fallback_for(strategy);
                return (fallback.to_string(), true, 0.0);
            }
        };

        let mut candidates = Vec::with_capacity(self.generation.candidates);
        for _ in 0..self.generation.candidates {
            match self.generator.generate(&context, &self.generation).await {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => warnings.push(TurnWarning::GenerationFailed {
                    message: e.to_string(),
                }),
            }
        }

        // Output guardrail first; the scorer only ranks what may be sent.
        let mut releasable = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let report = self.guardrails.output.check(&candidate);
            if report.is_safe {
                releasable.push(candidate);
            } else {
                tracing::warn!(
                    conversation = %state.id,
                    violations = ?report.violations,
                    "Candidate rejected by output guardrail"
                );
                warnings.push(TurnWarning::OutputRejected);
            }
        }

        if releasable.is_empty() {
            warnings.push(TurnWarning::FallbackUsed);
            let fallback = self.fallback_for(strategy);
            return (fallback.to_string(), true, 0.0);
        }

        let score_ctx = ScoreContext {
            turn_number: state.turn(),
            artifacts_extracted: state.artifact_count(),
        };
        let selection = self.scorer.select_best(&releasable, score_ctx);
        if selection.used_fallback {
            warnings.push(TurnWarning::FallbackUsed);
        }
        let risk = selection
            .evaluation
            .pii_risk
            .max(selection.evaluation.behavioral_harm);
        (selection.text, selection.used_fallback, risk)
    }

    fn fallback_for(&self, strategy: Strategy) -> &'static str {
        match strategy {
            Strategy::Stall => self.guardrails.output.stall_utterance(),
            _ => self.guardrails.output.neutral_fallback(),
        }
    }

    fn safety_ceiling_reason(&self, state: &ConversationState) -> Option<String> {
        if state.turn() > self.safety.max_turns {
            return Some(format!(
                "turn count {} over limit {}",
                state.turn(),
                self.safety.max_turns
            ));
        }
        if state.duration_secs() > self.safety.max_duration_secs {
            return Some(format!(
                "duration {}s over limit {}s",
                state.duration_secs(),
                self.safety.max_duration_secs
            ));
        }
        if state.turn() >= self.safety.confidence_grace_turns
            && state.detection_confidence < self.safety.min_confidence
        {
            return Some(format!(
                "confidence {:.2} still below {:.2} after {} turns",
                state.detection_confidence, self.safety.min_confidence, state.turn()
            ));
        }
        None
    }
}
