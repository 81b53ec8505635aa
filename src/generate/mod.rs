//! Text-generation collaborator boundary.
//!
//! A `Generator` receives the fully assembled instruction context (already
//! ordered by the guardrail hierarchy: safety first, counterparty message
//! fenced last) and returns one candidate reply. The engine only ever calls
//! it through the timeout wrapper so a stuck backend degrades to a fallback
//! utterance instead of hanging a turn.

pub mod compatible;
pub mod timeout;

pub use compatible::CompatibleGenerator;
pub use timeout::TimeoutGenerator;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// Sampling configuration for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Candidates requested per turn; the utility scorer picks among them.
    pub candidates: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.8,
            max_tokens: 256,
            candidates: 2,
        }
    }
}

pub trait Generator: Send + Sync {
    /// Generator identifier for logs and error messages.
    fn name(&self) -> &str;

    /// Produce one reply for the assembled instruction context.
    fn generate<'a>(
        &'a self,
        context: &'a str,
        config: &'a GenerationConfig,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;
}

/// Deterministic generator fed from a queue of canned replies. Used by tests
/// and by operators running the engine without a model backend.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("scripted generator poisoned").len()
    }
}

impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate<'a>(
        &'a self,
        _context: &'a str,
        _config: &'a GenerationConfig,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.replies
                .lock()
                .expect("scripted generator poisoned")
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("scripted generator exhausted"))
        })
    }
}
