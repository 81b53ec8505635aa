use super::state::{ConversationState, ConversationStatus};
use super::turn::{TurnEngine, TurnResult};
use crate::approval::{ApprovalPolicy, ApprovalQueue};
use crate::config::Config;
use crate::error::{EngageError, LureError};
use crate::generate::{GenerationConfig, Generator};
use crate::guardrails::GuardrailPipeline;
use crate::persona::PersonaRoster;
use crate::score::UtilityScorer;
use crate::signals::{Detector, Extractor};
use crate::stage::StagePredictor;
use crate::store::StateStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Owns every live conversation and serializes turns within each one.
///
/// One async mutex per conversation id: turns for a single conversation are
/// strictly sequential, distinct conversations run in parallel. The approval
/// queue is the only state shared across conversations and synchronizes
/// itself internally.
pub struct EngagementManager {
    engine: TurnEngine,
    store: Arc<dyn StateStore>,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<ConversationState>>>>,
    roster: PersonaRoster,
}

impl EngagementManager {
    pub fn new(
        config: &Config,
        generator: Arc<dyn Generator>,
        detector: Arc<dyn Detector>,
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn StateStore>,
        queue: Arc<ApprovalQueue>,
    ) -> anyhow::Result<Self> {
        let engine = TurnEngine {
            guardrails: GuardrailPipeline::new()?,
            predictor: StagePredictor::new(),
            scorer: UtilityScorer::new(config.utility.weights, config.utility.caps),
            detector,
            extractor,
            generator,
            queue,
            policy: ApprovalPolicy {
                auto_approve_threshold: config.approval.auto_approve_threshold,
                max_auto_risk: config.approval.max_auto_risk,
                audit_sample_rate: config.approval.audit_sample_rate,
            },
            generation: GenerationConfig {
                model: config.generator.model.clone(),
                temperature: config.generator.temperature,
                max_tokens: config.generator.max_tokens,
                candidates: config.generator.candidates,
            },
            safety: config.safety,
            approval_ttl: chrono::Duration::seconds(config.approval.default_ttl_secs),
        };

        Ok(Self {
            engine,
            store,
            sessions: RwLock::new(HashMap::new()),
            roster: PersonaRoster::new(),
        })
    }

    /// Start engaging a new counterparty. The persona is assigned up front
    /// from the scam-type hint (or the default persona when none is known).
    pub async fn open_conversation(
        &self,
        counterpart: &str,
        scam_type_hint: Option<&str>,
    ) -> Result<Uuid, LureError> {
        let persona = self.roster.for_scam_type(scam_type_hint.unwrap_or("unknown"));
        let state = ConversationState::new(counterpart, persona);
        let id = state.id;

        self.store.save(&state).await?;
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(state)));

        tracing::info!(conversation = %id, counterpart, "Conversation opened");
        Ok(id)
    }

    /// Process one incoming message. Turns within this conversation are
    /// serialized by its mutex; the state is persisted before the result is
    /// returned so a crash never loses a committed turn.
    pub async fn process_message(
        &self,
        id: Uuid,
        message: &str,
    ) -> Result<TurnResult, LureError> {
        let session = self.session(id).await?;
        let mut state = session.lock().await;

        if state.status().is_terminal() {
            return Err(EngageError::ConversationClosed {
                conversation_id: id.to_string(),
                status: state.status().to_string(),
            }
            .into());
        }

        let result = self.engine.run_turn(&mut state, message).await;
        self.store.save(&state).await?;
        Ok(result)
    }

    /// Externally mark a conversation abandoned. Waits for any in-flight
    /// turn to finish (the per-conversation lock), so a turn's Learn step is
    /// never torn.
    pub async fn abandon(&self, id: Uuid) -> Result<(), LureError> {
        let session = self.session(id).await?;
        let mut state = session.lock().await;
        state.set_status(ConversationStatus::Abandoned);
        self.store.save(&state).await?;
        Ok(())
    }

    /// Current state snapshot for inspection.
    pub async fn snapshot(&self, id: Uuid) -> Result<ConversationState, LureError> {
        let session = self.session(id).await?;
        let state = session.lock().await;
        Ok(state.clone())
    }

    async fn session(&self, id: Uuid) -> Result<Arc<Mutex<ConversationState>>, LureError> {
        if let Some(session) = self.sessions.read().await.get(&id) {
            return Ok(Arc::clone(session));
        }

        // Not resident: fall back to the store, then race-check the map so
        // two concurrent loads converge on one entry.
        let loaded = self
            .store
            .load(id)
            .await?
            .ok_or_else(|| EngageError::NotFound {
                conversation_id: id.to_string(),
            })?;

        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(loaded)));
        Ok(Arc::clone(entry))
    }
}
