//! Scripted [`Generator`] for tests.
//!
//! Each call pops the next [`Step`] and sleeps its delay on the tokio clock
//! before answering, so paused-time tests control exactly when a generation
//! finishes. Once the script is exhausted every call replies `re: <last line>`
//! after the default delay.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{GeneratorError, GeneratorResult};
use crate::generator::{GenerationRequest, Generator};

/// What one scripted call does after its delay.
#[derive(Clone, Debug)]
pub enum Step {
    /// Answer with this text.
    Reply(String),
    /// Answer `None`.
    Silent,
    /// Fail with [`GeneratorError::Other`].
    Fail(String),
}

/// Test double driven by a queue of steps.
pub struct ScriptedGenerator {
    steps: Mutex<VecDeque<(Duration, Step)>>,
    default_delay: Duration,
    started: AtomicUsize,
    finished: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    /// Empty script; every call echoes after `default_delay`.
    pub fn new(default_delay: Duration) -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            default_delay,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Append a step.
    #[must_use]
    pub fn then(self, delay: Duration, step: Step) -> Self {
        self.steps.lock().push_back((delay, step));
        self
    }

    /// Calls that have started.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Calls that ran to completion (were not dropped mid-sleep).
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Every request seen, in call order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> GeneratorResult<Option<String>> {
        let _ = self.started.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let next = self.steps.lock().pop_front();
        let (delay, step) = next.unwrap_or_else(|| {
            let last = request
                .last_participant_message()
                .map(|m| m.text.clone())
                .unwrap_or_default();
            (self.default_delay, Step::Reply(format!("re: {last}")))
        });

        tokio::time::sleep(delay).await;
        let _ = self.finished.fetch_add(1, Ordering::SeqCst);

        match step {
            Step::Reply(text) => Ok(Some(text)),
            Step::Silent => Ok(None),
            Step::Fail(message) => Err(GeneratorError::Other(message)),
        }
    }
}
