use super::{GenerationConfig, Generator};
use anyhow::Context as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

// The assembled instruction context rides in the system slot so no chat
// template can rank counterparty-derived content above it. The user slot
// carries only this fixed nudge.
const TURN_NUDGE: &str = "Write your persona's next reply. Reply text only.";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Generator speaking the OpenAI-style chat-completions dialect, which most
/// hosted and local backends accept.
pub struct CompatibleGenerator {
    name: String,
    endpoint: String,
    /// Pre-computed `"Bearer <key>"` header value.
    cached_auth_header: Option<String>,
    client: Client,
}

impl CompatibleGenerator {
    pub fn new(name: impl Into<String>, base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            name: name.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            cached_auth_header: api_key.map(|k| format!("Bearer {k}")),
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

impl Generator for CompatibleGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate<'a>(
        &'a self,
        context: &'a str,
        config: &'a GenerationConfig,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let request = ChatRequest {
                model: config.model.clone(),
                messages: vec![
                    Message {
                        role: "system",
                        content: context.to_string(),
                    },
                    Message {
                        role: "user",
                        content: TURN_NUDGE.to_string(),
                    },
                ],
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            };

            let mut builder = self.client.post(&self.endpoint).json(&request);
            if let Some(auth) = &self.cached_auth_header {
                builder = builder.header("Authorization", auth);
            }

            let response = builder
                .send()
                .await
                .with_context(|| format!("{} request failed", self.name))?
                .error_for_status()
                .with_context(|| format!("{} returned error status", self.name))?;

            let body: ChatResponse = response
                .json()
                .await
                .with_context(|| format!("{} response body malformed", self.name))?;

            body.choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .filter(|text| !text.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("{} returned no text", self.name))
        })
    }
}
