//! Engine configuration: TOML file with environment overrides and validated
//! defaults. The numeric defaults below are starting points, not calibrated
//! constants; operators are expected to tune them per deployment.

use crate::error::ConfigError;
use crate::score::{SafetyCaps, UtilityWeights};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub safety: SafetyConfig,

    #[serde(default)]
    pub utility: UtilityConfig,

    #[serde(default)]
    pub approval: ApprovalConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Hard conversation-level ceilings. Breaching any of them forces the
/// conversation toward `Completed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: i64,
    /// Conversations still below this confidence after the grace period are
    /// not worth the spend.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_confidence_grace_turns")]
    pub confidence_grace_turns: u32,
}

fn default_max_turns() -> u32 {
    60
}
fn default_max_duration_secs() -> i64 {
    3_600
}
fn default_min_confidence() -> f64 {
    0.2
}
fn default_confidence_grace_turns() -> u32 {
    10
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_duration_secs: default_max_duration_secs(),
            min_confidence: default_min_confidence(),
            confidence_grace_turns: default_confidence_grace_turns(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct UtilityConfig {
    #[serde(default)]
    pub weights: UtilityWeights,
    #[serde(default)]
    pub caps: SafetyCaps,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_auto_approve_threshold")]
    pub auto_approve_threshold: f64,
    #[serde(default = "default_max_auto_risk")]
    pub max_auto_risk: f64,
    #[serde(default = "default_audit_sample_rate")]
    pub audit_sample_rate: f64,
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: i64,
}

fn default_auto_approve_threshold() -> f64 {
    0.7
}
fn default_max_auto_risk() -> f64 {
    0.7
}
fn default_audit_sample_rate() -> f64 {
    0.1
}
fn default_ttl_secs() -> i64 {
    3_600
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            auto_approve_threshold: default_auto_approve_threshold(),
            max_auto_risk: default_max_auto_risk(),
            audit_sample_rate: default_audit_sample_rate(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_candidates")]
    pub candidates: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f64 {
    0.8
}
fn default_max_tokens() -> u32 {
    256
}
fn default_candidates() -> usize {
    2
}
fn default_timeout_secs() -> u64 {
    20
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            candidates: default_candidates(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "lurewire.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8700".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Config {
    /// Default config file location under the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lurewire").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path` if it exists, otherwise fall back to defaults. The
    /// generator API key can always be supplied via `LUREWIRE_API_KEY`.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match resolved {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(&p)?;
                toml::from_str(&raw).map_err(|e| ConfigError::Load(e.to_string()))?
            }
            _ => Self::default(),
        };

        if let Ok(key) = std::env::var("LUREWIRE_API_KEY")
            && !key.is_empty()
        {
            config.generator.api_key = Some(key);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |value: f64, name: &str| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::Validation(format!(
                    "{name} must be in [0, 1], got {value}"
                )))
            }
        };

        unit(self.approval.auto_approve_threshold, "approval.auto_approve_threshold")?;
        unit(self.approval.max_auto_risk, "approval.max_auto_risk")?;
        unit(self.approval.audit_sample_rate, "approval.audit_sample_rate")?;
        unit(self.safety.min_confidence, "safety.min_confidence")?;
        unit(self.utility.caps.max_pii_risk, "utility.caps.max_pii_risk")?;
        unit(
            self.utility.caps.max_behavioral_harm,
            "utility.caps.max_behavioral_harm",
        )?;

        for (value, name) in [
            (self.utility.weights.engagement, "utility.weights.engagement"),
            (self.utility.weights.pii_risk, "utility.weights.pii_risk"),
            (
                self.utility.weights.behavioral_harm,
                "utility.weights.behavioral_harm",
            ),
        ] {
            if value < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }

        if self.safety.max_turns == 0 {
            return Err(ConfigError::Validation("safety.max_turns must be > 0".into()));
        }
        if self.generator.candidates == 0 {
            return Err(ConfigError::Validation(
                "generator.candidates must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn default_weights_match_documented_objective() {
        let config = Config::default();
        assert_eq!(config.utility.weights.engagement, 1.0);
        assert_eq!(config.utility.weights.pii_risk, 0.8);
        assert_eq!(config.utility.weights.behavioral_harm, 1.2);
        assert_eq!(config.utility.caps.max_pii_risk, 0.3);
        assert_eq!(config.utility.caps.max_behavioral_harm, 0.2);
    }

    #[test]
    fn toml_round_trip_preserves_sections() {
        let config = Config::default();
        let raw = toml::to_string(&config).unwrap();
        let decoded: Config = toml::from_str(&raw).unwrap();
        assert_eq!(decoded.safety.max_turns, config.safety.max_turns);
        assert_eq!(decoded.generator.model, config.generator.model);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let decoded: Config = toml::from_str(
            r#"
[approval]
auto_approve_threshold = 0.9

[generator]
model = "local-llama"
"#,
        )
        .unwrap();
        assert_eq!(decoded.approval.auto_approve_threshold, 0.9);
        assert_eq!(decoded.approval.audit_sample_rate, 0.1);
        assert_eq!(decoded.generator.model, "local-llama");
        assert_eq!(decoded.safety.max_turns, 60);
    }

    #[test]
    fn out_of_range_threshold_fails_validation() {
        let mut config = Config::default();
        config.approval.auto_approve_threshold = 1.4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_weight_fails_validation() {
        let mut config = Config::default();
        config.utility.weights.engagement = -0.5;
        assert!(config.validate().is_err());
    }
}
