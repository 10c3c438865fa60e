//! OpenAI-compatible `/chat/completions` backend.
//!
//! Each turn is at most two calls. With the relevance gate enabled the model
//! is first shown the transcript and asked whether it wants to answer now; any
//! answer other than "yes" ends the turn silently. The answer call sends the
//! system prompt plus the transcript, bot lines as `assistant` and everyone
//! else as `user`, each prefixed with the speaker's name. A leading `Name:`
//! in the model output is stripped.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use convene_settings::GeneratorSettings;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GeneratorError, GeneratorResult};
use crate::generator::{GenerationRequest, Generator};

static SPEAKER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z]*:\s*").expect("speaker prefix pattern is valid"));

const GATE_QUESTION: &str = "You are a human participant in this chat and eager to take part in the \
    discussion. Based on the previous messages, do you want to answer now? \
    Answer when you are asked a question or have something to add, ask, suggest or remark. \
    Do not answer irrelevant or off-topic messages. Please answer only yes or no.";

#[derive(Debug, Clone, PartialEq, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    temperature: f32,
    max_tokens: u32,
    stop: [&'static str; 1],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generator backed by a chat completions endpoint.
#[derive(Clone)]
pub struct ChatCompletionsGenerator {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    relevance_gate: bool,
    system_prompt: String,
    persona_name: String,
}

impl ChatCompletionsGenerator {
    /// Build from settings with an explicit API key.
    pub fn new(settings: &GeneratorSettings, api_key: impl Into<String>) -> GeneratorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            relevance_gate: settings.relevance_gate,
            system_prompt: settings.system_prompt.clone(),
            persona_name: settings.persona_name.clone(),
        })
    }

    /// Build from settings, reading the key from `settings.api_key_env`.
    pub fn from_env(settings: &GeneratorSettings) -> GeneratorResult<Self> {
        let key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GeneratorError::MissingApiKey(settings.api_key_env.clone()))?;
        Self::new(settings, key)
    }

    fn transcript_messages(&self, request: &GenerationRequest) -> Vec<WireMessage> {
        request
            .transcript
            .iter()
            .map(|m| {
                if request.is_bot(m) {
                    WireMessage {
                        role: "assistant",
                        content: format!("{}: {}", self.persona_name, m.text),
                    }
                } else {
                    WireMessage {
                        role: "user",
                        content: format!("{}: {}", m.sender.name, m.text),
                    }
                }
            })
            .collect()
    }

    async fn complete(&self, messages: &[WireMessage]) -> GeneratorResult<Option<String>> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stop: ["\n"],
        };
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: CompletionResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(parsed.choices.into_iter().next().and_then(|c| c.message.content))
    }

    async fn wants_to_answer(&self, transcript: &[WireMessage]) -> GeneratorResult<bool> {
        let mut messages = transcript.to_vec();
        messages.push(WireMessage {
            role: "user",
            content: GATE_QUESTION.to_string(),
        });
        let verdict = self.complete(&messages).await?.unwrap_or_default();
        debug!(verdict = %verdict, "relevance gate");
        Ok(is_affirmative(&verdict))
    }
}

/// `"yes"`, ignoring case, surrounding whitespace and trailing periods.
fn is_affirmative(answer: &str) -> bool {
    answer.trim().trim_end_matches('.').eq_ignore_ascii_case("yes")
}

/// Remove a leading `Name:` the model tends to copy from the transcript format.
fn strip_speaker_prefix(answer: &str) -> String {
    SPEAKER_PREFIX.replace(answer.trim(), "").trim().to_string()
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    fn name(&self) -> &str {
        "chat-completions"
    }

    async fn generate(&self, request: &GenerationRequest) -> GeneratorResult<Option<String>> {
        let transcript = self.transcript_messages(request);

        if self.relevance_gate && !self.wants_to_answer(&transcript).await? {
            return Ok(None);
        }

        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: self.system_prompt.clone(),
        });
        messages.extend(transcript);

        Ok(self
            .complete(&messages)
            .await?
            .map(|a| strip_speaker_prefix(&a))
            .filter(|a| !a.is_empty()))
    }
}
