//! # convene-llm
//!
//! Text-in/text-out reply generation.
//!
//! - [`Generator`]: the contract the reply scheduler calls; latency is unbounded
//!   and `Ok(None)` means "stay silent"
//! - [`EchoGenerator`]: repeats the last participant line
//! - [`ChatCompletionsGenerator`]: OpenAI-compatible `/chat/completions`, with
//!   an optional yes/no relevance gate
//! - [`create_generator`]: picks a backend from settings

#![deny(unsafe_code)]

pub mod chat;
pub mod echo;
pub mod error;
pub mod generator;
pub mod testing;

use std::sync::Arc;

use convene_settings::{GeneratorKind, GeneratorSettings};

pub use chat::ChatCompletionsGenerator;
pub use echo::EchoGenerator;
pub use error::{GeneratorError, GeneratorResult};
pub use generator::{GenerationRequest, Generator, SharedGenerator};

/// Build the generator selected in `settings`.
pub fn create_generator(settings: &GeneratorSettings) -> GeneratorResult<SharedGenerator> {
    Ok(match settings.kind {
        GeneratorKind::Echo => Arc::new(EchoGenerator),
        GeneratorKind::ChatCompletions => Arc::new(ChatCompletionsGenerator::from_env(settings)?),
    })
}
