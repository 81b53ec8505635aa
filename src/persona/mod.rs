//! Persona references.
//!
//! Persona *content* lives outside the decision core; the loop only carries
//! an opaque reference and the short prompt fragments the hierarchy builder
//! needs. A small built-in roster keeps the engine usable without external
//! persona tooling.

use serde::{Deserialize, Serialize};

/// Opaque persona handle plus the fragments the prompt assembler consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaRef {
    pub id: String,
    pub name: String,
    pub description: String,
    pub style: String,
}

/// Built-in roster, matched to the scam families the detector reports.
#[derive(Debug, Clone, Default)]
pub struct PersonaRoster;

impl PersonaRoster {
    pub fn new() -> Self {
        Self
    }

    /// Persona best suited to string the given scam type along.
    pub fn for_scam_type(&self, scam_type: &str) -> PersonaRef {
        match scam_type {
            "investment_fraud" => PersonaRef {
                id: "small-business-owner".into(),
                name: "Rajiv".into(),
                description: "a small business owner curious about side investments".into(),
                style: "direct, asks about returns and guarantees".into(),
            },
            "job_scam" => PersonaRef {
                id: "job-seeker".into(),
                name: "Priya".into(),
                description: "a homemaker looking for part-time work".into(),
                style: "friendly, enthusiastic, asks practical questions".into(),
            },
            "tech_support" => PersonaRef {
                id: "retired-teacher".into(),
                name: "Lakshmi".into(),
                description: "a retired teacher who finds computers confusing".into(),
                style: "apologetic, needs every step explained twice".into(),
            },
            _ => PersonaRef {
                id: "retired-clerk".into(),
                name: "Ramesh".into(),
                description: "a retired government clerk new to online payments".into(),
                style: "polite, formal, asks many clarifying questions".into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_matches_scam_families() {
        let roster = PersonaRoster::new();
        assert_eq!(roster.for_scam_type("investment_fraud").name, "Rajiv");
        assert_eq!(roster.for_scam_type("job_scam").name, "Priya");
        assert_eq!(roster.for_scam_type("unknown").name, "Ramesh");
        assert_eq!(roster.for_scam_type("lottery_prize").name, "Ramesh");
    }
}
