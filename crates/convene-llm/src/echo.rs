//! Echo backend.

use async_trait::async_trait;

use crate::error::GeneratorResult;
use crate::generator::{GenerationRequest, Generator};

/// Replies with the last participant line verbatim.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, request: &GenerationRequest) -> GeneratorResult<Option<String>> {
        Ok(request
            .last_participant_message()
            .map(|m| m.text.trim().to_string())
            .filter(|t| !t.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use convene_core::{ChatMessage, Participant};

    use super::*;

    fn request(lines: &[(&str, &str)]) -> GenerationRequest {
        GenerationRequest {
            session_id: "s".into(),
            bot: Participant::new("bot", "Ash"),
            transcript: lines
                .iter()
                .map(|(who, text)| ChatMessage::new("s", Participant::new(*who, *who), *text))
                .collect(),
        }
    }

    #[tokio::test]
    async fn echoes_last_participant_line() {
        let out = EchoGenerator
            .generate(&request(&[("u1", "hello"), ("bot", "hi"), ("u2", " again ")]))
            .await
            .unwrap();
        assert_eq!(out.as_deref(), Some("again"));
    }

    #[tokio::test]
    async fn silent_on_empty_transcript() {
        assert_eq!(EchoGenerator.generate(&request(&[])).await.unwrap(), None);
    }

    #[tokio::test]
    async fn silent_on_blank_line() {
        assert_eq!(EchoGenerator.generate(&request(&[("u1", "   ")])).await.unwrap(), None);
    }
}
