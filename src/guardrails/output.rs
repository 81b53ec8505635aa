use rand::Rng;
use serde::Serialize;
use strum::Display;

/// Why a generated response was refused release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputViolation {
    SelfDisclosure,
    CoverBreak,
    CredentialPattern,
}

/// Verdict on one generated response.
#[derive(Debug, Clone, Serialize)]
pub struct OutputReport {
    pub is_safe: bool,
    pub violations: Vec<OutputViolation>,
}

// Self-reference an automated system must never emit in character.
const SELF_DISCLOSURE: &[&str] = &[
    "i am an ai",
    "i'm an ai",
    "as an ai",
    "i am a language model",
    "i am a chatbot",
    "my training",
    "my knowledge cutoff",
    "i was trained",
    "i am programmed",
    "my instructions",
    "my system prompt",
    "i was instructed to",
];

// Meta-commentary that breaks the engagement cover.
const COVER_BREAK: &[&str] = &[
    "this is a honeypot",
    "this is a trap",
    "this is a simulation",
    "i'm just pretending",
    "i am pretending",
    "not a real person",
    "scam detection",
    "i know this is a scam",
    "this is clearly a scam",
];

/// Neutral utterances used when no candidate survives scoring or generation
/// fails outright. Deliberately vague and in persona.
pub const FALLBACK_UTTERANCES: &[&str] = &[
    "I need to think about this. Can you give me more details?",
    "Sorry, I got confused. Could you explain that again?",
    "One moment, my phone is acting up. What did you say?",
    "I want to be sure I understand. Can you go over that once more?",
];

/// Stall lines used when the generator is unavailable mid-conversation.
pub const STALL_UTTERANCES: &[&str] = &[
    "I'm arranging it now, my bank app is very slow today.",
    "Just a moment, I need to ask my son about the internet banking.",
    "Sorry for the delay, can you send me the details once more?",
];

/// Scan generated text for self-disclosure, cover breaks, and
/// credential-shaped tokens before it can leave the system.
#[derive(Debug, Clone, Default)]
pub struct OutputFilter;

impl OutputFilter {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, text: &str) -> OutputReport {
        let lowered = text.to_ascii_lowercase();
        let mut violations = Vec::new();

        if SELF_DISCLOSURE.iter().any(|p| lowered.contains(p)) {
            violations.push(OutputViolation::SelfDisclosure);
        }
        if COVER_BREAK.iter().any(|p| lowered.contains(p)) {
            violations.push(OutputViolation::CoverBreak);
        }
        if contains_credential_pattern(text) {
            violations.push(OutputViolation::CredentialPattern);
        }

        OutputReport {
            is_safe: violations.is_empty(),
            violations,
        }
    }

    /// A safe in-persona replacement for a rejected or failed response.
    pub fn fallback_utterance(&self) -> &'static str {
        let idx = rand::rng().random_range(0..FALLBACK_UTTERANCES.len());
        FALLBACK_UTTERANCES[idx]
    }

    /// The fixed utterance used when candidate selection finds nothing safe.
    /// Kept deterministic so callers and tests can name it.
    pub fn neutral_fallback(&self) -> &'static str {
        FALLBACK_UTTERANCES[0]
    }

    pub fn stall_utterance(&self) -> &'static str {
        let idx = rand::rng().random_range(0..STALL_UTTERANCES.len());
        STALL_UTTERANCES[idx]
    }
}

/// Credential-shaped token detection: long unbroken digit runs (card/account
/// length) and SSN-style triplets. The engine only ever hands out obviously
/// fabricated data, so anything this shaped is a leak.
fn contains_credential_pattern(text: &str) -> bool {
    let mut digit_run = 0usize;
    for c in text.chars() {
        if c.is_ascii_digit() {
            digit_run += 1;
            if digit_run >= 16 {
                return true;
            }
        } else {
            digit_run = 0;
        }
    }
    has_ssn_shape(text)
}

fn has_ssn_shape(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.len() < 11 {
        return false;
    }
    for window in bytes.windows(11) {
        let shape_ok = window[..3].iter().all(u8::is_ascii_digit)
            && window[3] == b'-'
            && window[4..6].iter().all(u8::is_ascii_digit)
            && window[6] == b'-'
            && window[7..].iter().all(u8::is_ascii_digit);
        if shape_ok {
            return true;
        }
    }
    false
}
