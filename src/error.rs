use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `lurewire`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum LureError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Guardrails ──────────────────────────────────────────────────────
    #[error("guardrail: {0}")]
    Guardrail(#[from] GuardrailError),

    // ── Generation ──────────────────────────────────────────────────────
    #[error("generate: {0}")]
    Generate(#[from] GenerateError),

    // ── Engagement loop ─────────────────────────────────────────────────
    #[error("engage: {0}")]
    Engage(#[from] EngageError),

    // ── Approval queue ──────────────────────────────────────────────────
    #[error("approval: {0}")]
    Approval(#[from] ApprovalError),

    // ── Persistence ─────────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Guardrail errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GuardrailError {
    /// Input failed the injection check hard. Carries the sanitized text so
    /// the conversation can continue in degraded-trust mode.
    #[error("input rejected (risk {risk_score:.2}), continuing sanitized")]
    InputRejected { risk_score: f64, sanitized: String },

    #[error("prompt assembly failed: {0}")]
    Assembly(String),
}

// ─── Generation errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generator {generator} request failed: {message}")]
    Provider { generator: String, message: String },

    #[error("generation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Generated text failed the output guardrail and was replaced.
    #[error("output rejected: {reason}")]
    OutputRejected { reason: String },
}

// ─── Engagement errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngageError {
    #[error("conversation {conversation_id} not found")]
    NotFound { conversation_id: String },

    /// Hard conversation-level limit hit; the loop forces a terminal status.
    #[error("safety ceiling reached: {reason}")]
    SafetyCeilingReached { reason: String },

    #[error("conversation {conversation_id} is {status} and accepts no turns")]
    ConversationClosed {
        conversation_id: String,
        status: String,
    },
}

// ─── Approval errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("request {id} not found")]
    NotFound { id: String },

    /// Attempt to resolve a request that already left `Pending`.
    #[error("request {id} already resolved as {status}")]
    Conflict { id: String, status: String },

    #[error("request {id} expired before review")]
    Expired { id: String },
}

// ─── Store errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("state payload corrupt for {conversation_id}: {message}")]
    Corrupt {
        conversation_id: String,
        message: String,
    },

    #[error("schema migration failed: {0}")]
    Migration(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, LureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_displays_correctly() {
        let err = LureError::Config(ConfigError::Validation("bad weight".into()));
        assert!(err.to_string().contains("validation failed"));
    }

    #[test]
    fn generate_timeout_displays_seconds() {
        let err = LureError::Generate(GenerateError::Timeout { timeout_secs: 20 });
        assert!(err.to_string().contains("20s"));
    }

    #[test]
    fn approval_conflict_names_status() {
        let err = LureError::Approval(ApprovalError::Conflict {
            id: "req-1".into(),
            status: "approved".into(),
        });
        assert!(err.to_string().contains("req-1"));
        assert!(err.to_string().contains("approved"));
    }

    #[test]
    fn anyhow_interop() {
        let anyhow_err = anyhow::anyhow!("something went wrong");
        let lure_err: LureError = anyhow_err.into();
        assert!(lure_err.to_string().contains("something went wrong"));
    }
}
