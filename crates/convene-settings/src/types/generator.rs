//! Reply generator backend settings.

use serde::{Deserialize, Serialize};

/// Which generator backs the reply scheduler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GeneratorKind {
    /// Echo the last participant message. Useful for smoke tests.
    #[default]
    Echo,
    /// OpenAI-compatible `/chat/completions` endpoint.
    ChatCompletions,
}

impl std::str::FromStr for GeneratorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "echo" => Ok(Self::Echo),
            "chatcompletions" | "openai" => Ok(Self::ChatCompletions),
            other => Err(format!("unknown generator kind: {other}")),
        }
    }
}

/// Generator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratorSettings {
    /// Backend.
    pub kind: GeneratorKind,
    /// Base URL of the completions API (without `/chat/completions`).
    pub base_url: String,
    /// Model or deployment name.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion length limit.
    pub max_tokens: u32,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Ask the model whether to answer at all before generating.
    pub relevance_gate: bool,
    /// System prompt for the answer call.
    pub system_prompt: String,
    /// Name the bot speaks under in the transcript.
    pub persona_name: String,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            kind: GeneratorKind::Echo,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.9,
            max_tokens: 80,
            request_timeout_ms: 30_000,
            relevance_gate: false,
            system_prompt: "You are a participant in a small group chat. \
                            Answer briefly and casually."
                .to_string(),
            persona_name: "Ash".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_loosely() {
        assert_eq!("chat-completions".parse::<GeneratorKind>(), Ok(GeneratorKind::ChatCompletions));
        assert_eq!("OpenAI".parse::<GeneratorKind>(), Ok(GeneratorKind::ChatCompletions));
        assert_eq!("ECHO".parse::<GeneratorKind>(), Ok(GeneratorKind::Echo));
        assert!("llama".parse::<GeneratorKind>().is_err());
    }

    #[test]
    fn kind_serde_camel_case() {
        let k: GeneratorKind = serde_json::from_str("\"chatCompletions\"").unwrap();
        assert_eq!(k, GeneratorKind::ChatCompletions);
    }
}
