//! Deterministic text generators for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Generation, LlmError, Prompt, Provider, TextGenerator, TokenUsage};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Error(LlmError),
    Panic(String),
}

/// Generator that replays scripted replies in order, then repeats the fallback reply.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    prompts: Mutex<Vec<Prompt>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self::with_fallback(
            replies,
            Reply::Error(LlmError::network_error("script exhausted")),
        )
    }

    pub fn with_fallback(replies: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: Mutex::new(VecDeque::from(replies)),
            fallback,
            prompts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Always answers with `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self::with_fallback(Vec::new(), Reply::Text(text.into()))
    }

    /// Always fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_fallback(
            Vec::new(),
            Reply::Error(LlmError::network_error(message.into())),
        )
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, LlmError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Reply::Text(text) => Ok(Generation {
                usage: Some(TokenUsage::new(10, text.len() as u64)),
                text,
            }),
            Reply::Error(err) => Err(err),
            Reply::Panic(message) => panic!("{}", message),
        }
    }
}

pub const RETREAT_CLASSIFICATION: &str = r#"{"category": "work", "priority": 4, "reasoning": "Team event organised for the company."}"#;

pub const RETREAT_SUBTASKS: &str = r#"```json
{
  "subtasks": [
    {"title": "Set retreat budget", "description": "Agree on the total budget with finance."},
    {"title": "Book venue", "description": "Shortlist and reserve a venue for 20 people."},
    {"title": "Plan activities", "description": "Draft a 3-day agenda of team activities."},
    {"title": "Arrange catering", "description": "Order meals for all three days."}
  ],
  "reasoning": "Budget first, then venue, then content and logistics."
}
```"#;
