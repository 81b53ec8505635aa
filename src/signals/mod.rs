//! Detection and extraction collaborator boundary.
//!
//! The engine treats everything arriving here as untrusted signal, never
//! ground truth: confidences are merged max-of-old-and-new upstream and a
//! detector can only raise suspicion, not clear it. One lexical
//! implementation ships in-crate; richer detectors plug in behind the same
//! traits.

use crate::dst::ExtractionGoal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use strum::Display;

/// Kinds of counterparty-identifying data worth harvesting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ArtifactKind {
    PaymentHandle,
    BankAccount,
    RoutingCode,
    PhoneNumber,
    Email,
    Url,
    CounterpartName,
    Organization,
}

impl ArtifactKind {
    /// The extraction goal an artifact of this kind completes.
    pub fn goal(self) -> ExtractionGoal {
        match self {
            ArtifactKind::PaymentHandle => ExtractionGoal::PaymentHandle,
            ArtifactKind::BankAccount => ExtractionGoal::BankAccount,
            ArtifactKind::RoutingCode => ExtractionGoal::RoutingCode,
            ArtifactKind::PhoneNumber => ExtractionGoal::PhoneNumber,
            ArtifactKind::Email => ExtractionGoal::Email,
            ArtifactKind::Url => ExtractionGoal::Url,
            ArtifactKind::CounterpartName => ExtractionGoal::CounterpartName,
            ArtifactKind::Organization => ExtractionGoal::Organization,
        }
    }
}

/// One extracted artifact with the extractor's own confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub value: String,
    pub confidence: f64,
}

/// Per-message scam assessment from a detector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionSignal {
    pub is_scam: bool,
    pub scam_type: String,
    pub confidence: f64,
    pub tactics: Vec<String>,
}

/// Scam detection collaborator. `history` carries prior counterparty
/// messages, oldest first.
pub trait Detector: Send + Sync {
    fn detect<'a>(
        &'a self,
        text: &'a str,
        history: &'a [String],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<DetectionSignal>> + Send + 'a>>;
}

/// Artifact extraction collaborator.
pub trait Extractor: Send + Sync {
    fn extract<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<Artifact>>> + Send + 'a>>;
}

// ─── Lexical detector ───────────────────────────────────────────────────────

// Keyword groups per scam family. Confidence per family is matched-fraction;
// the best family wins.
const SCAM_FAMILIES: &[(&str, &[&str])] = &[
    (
        "lottery_prize",
        &["congratulations", "lottery", "prize", "winner", "lucky draw", "claim your reward"],
    ),
    (
        "bank_kyc_fraud",
        &["account suspended", "account blocked", "kyc", "verify your account", "update your details"],
    ),
    (
        "tech_support",
        &["virus detected", "malware", "device compromised", "technical support", "toll free"],
    ),
    (
        "investment_fraud",
        &["guaranteed returns", "double your money", "risk free", "crypto trading", "investment opportunity"],
    ),
    (
        "job_scam",
        &["work from home", "earn per day", "registration fee", "data entry job", "part time opportunity"],
    ),
    (
        "package_delivery",
        &["parcel pending", "delivery failed", "customs fee", "clearance charges", "shipment waiting"],
    ),
    (
        "tax_refund",
        &["tax refund", "refund pending", "refund approved", "income tax return"],
    ),
];

const URGENCY: &[&str] = &[
    "urgent", "immediate", "right now", "today only", "24 hours", "expire", "last chance",
    "limited time", "act now", "hurry", "asap",
];
const AUTHORITY: &[&str] = &[
    "official", "government", "bank", "police", "court", "legal", "tax department", "authority",
];
const FEAR: &[&str] = &[
    "suspended", "blocked", "deactivated", "arrested", "legal action", "penalty", "fine",
    "hacked", "compromised",
];
const SENSITIVE_REQUEST: &[&str] = &[
    "send otp", "share otp", "your password", "your pin", "cvv", "card number",
    "account details", "bank details", "upi id",
];

/// Keyword-rule detector: scam family match plus manipulation tactics.
#[derive(Debug, Clone, Default)]
pub struct LexicalDetector;

impl LexicalDetector {
    pub fn new() -> Self {
        Self
    }

    fn assess(text: &str) -> DetectionSignal {
        let lowered = text.to_lowercase();

        let mut scam_type = "unknown".to_string();
        let mut type_confidence = 0.0_f64;
        for (family, keywords) in SCAM_FAMILIES {
            let matches = keywords.iter().filter(|kw| lowered.contains(**kw)).count();
            if matches > 0 {
                let confidence = (matches as f64 / keywords.len() as f64).min(1.0);
                if confidence > type_confidence {
                    type_confidence = confidence;
                    scam_type = (*family).to_string();
                }
            }
        }

        let mut tactics = Vec::new();
        for (name, keywords) in [
            ("urgency", URGENCY),
            ("authority", AUTHORITY),
            ("fear", FEAR),
            ("information_request", SENSITIVE_REQUEST),
        ] {
            if keywords.iter().any(|kw| lowered.contains(*kw)) {
                tactics.push(name.to_string());
            }
        }

        // Family match carries most of the score; each tactic adds a little.
        let confidence =
            (type_confidence * 0.6 + tactics.len() as f64 * 0.15).min(1.0);

        DetectionSignal {
            is_scam: confidence >= 0.5,
            scam_type,
            confidence,
            tactics,
        }
    }
}

impl Detector for LexicalDetector {
    fn detect<'a>(
        &'a self,
        text: &'a str,
        _history: &'a [String],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<DetectionSignal>> + Send + 'a>> {
        Box::pin(async move { Ok(Self::assess(text)) })
    }
}

// ─── Pattern extractor ──────────────────────────────────────────────────────

/// Token-scanning extractor for the common artifact shapes: payment handles,
/// phone numbers, account numbers, routing codes, emails, and URLs.
#[derive(Debug, Clone, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }

    fn scan(text: &str) -> Vec<Artifact> {
        let mut artifacts = Vec::new();

        for token in text.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')')) {
            let token = token.trim_matches(|c: char| matches!(c, '.' | '!' | '?' | ':' | '"'));
            if token.is_empty() {
                continue;
            }

            if let Some(url) = parse_url(token) {
                push_unique(&mut artifacts, ArtifactKind::Url, url, 0.95);
                continue;
            }
            if let Some(handle_or_email) = parse_at_token(token) {
                let (kind, value, confidence) = handle_or_email;
                push_unique(&mut artifacts, kind, value, confidence);
                continue;
            }
            if let Some(phone) = parse_phone(token) {
                push_unique(&mut artifacts, ArtifactKind::PhoneNumber, phone, 0.9);
                continue;
            }
            if let Some(code) = parse_routing_code(token) {
                push_unique(&mut artifacts, ArtifactKind::RoutingCode, code, 0.85);
                continue;
            }
            if let Some(account) = parse_account_number(token) {
                push_unique(&mut artifacts, ArtifactKind::BankAccount, account, 0.7);
            }
        }

        artifacts
    }
}

impl Extractor for PatternExtractor {
    fn extract<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<Artifact>>> + Send + 'a>> {
        Box::pin(async move { Ok(Self::scan(text)) })
    }
}

fn push_unique(artifacts: &mut Vec<Artifact>, kind: ArtifactKind, value: String, confidence: f64) {
    if !artifacts.iter().any(|a| a.kind == kind && a.value == value) {
        artifacts.push(Artifact {
            kind,
            value,
            confidence,
        });
    }
}

fn parse_url(token: &str) -> Option<String> {
    if !(token.starts_with("http://") || token.starts_with("https://")) {
        return None;
    }
    url::Url::parse(token).ok().map(|u| u.to_string())
}

/// `name@provider` without a dot-TLD is a payment handle; with one it is an
/// email address.
fn parse_at_token(token: &str) -> Option<(ArtifactKind, String, f64)> {
    let (local, domain) = token.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '%' | '+'))
    {
        return None;
    }

    if domain.contains('.') {
        let tld = domain.rsplit('.').next()?;
        if tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()) {
            return Some((ArtifactKind::Email, token.to_string(), 0.85));
        }
        return None;
    }

    if domain.len() >= 3 && domain.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some((ArtifactKind::PaymentHandle, token.to_string(), 0.85));
    }
    None
}

/// Ten-digit mobile number, optionally prefixed `+91` or `0`, normalized to
/// `+91-XXXXXXXXXX`.
fn parse_phone(token: &str) -> Option<String> {
    let stripped = token
        .strip_prefix("+91")
        .or_else(|| token.strip_prefix('0'))
        .unwrap_or(token);
    if stripped.len() == 10
        && stripped.chars().all(|c| c.is_ascii_digit())
        && matches!(stripped.as_bytes()[0], b'6'..=b'9')
    {
        Some(format!("+91-{stripped}"))
    } else {
        None
    }
}

/// Bank routing code shape: four letters, a zero, six alphanumerics.
fn parse_routing_code(token: &str) -> Option<String> {
    let upper = token.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    if bytes.len() == 11
        && bytes[..4].iter().all(u8::is_ascii_uppercase)
        && bytes[4] == b'0'
        && bytes[5..].iter().all(u8::is_ascii_alphanumeric)
    {
        Some(upper)
    } else {
        None
    }
}

/// Bare digit run of plausible account-number length. Low confidence; the
/// phone parse runs first so ten-digit mobiles don't land here.
fn parse_account_number(token: &str) -> Option<String> {
    if (9..=18).contains(&token.len()) && token.chars().all(|c| c.is_ascii_digit()) {
        Some(token.to_string())
    } else {
        None
    }
}
