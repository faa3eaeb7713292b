//! Bounded-retry wrapper around a completion provider.
//!
//! The external generation API fails in uninteresting ways: connection
//! resets, 5xx responses, and syntactically fine replies that carry no text.
//! None of those distinctions are actionable, so every failure is treated as
//! retryable with a fixed delay. When the attempt budget runs out the caller
//! gets [`CompletionOutcome::Exhausted`] back, never an error: a dead model
//! endpoint degrades one pipeline stage, it does not abort the task.

use std::sync::Arc;
use std::time::Duration;

use super::provider::{CompletionProvider, CompletionRequest, Message};
use crate::error::LlmError;

/// Default number of completion attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Default fixed delay between attempts, in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 3;

/// Outcome of a retried completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Usable text came back within the attempt budget.
    Text(String),
    /// Every attempt failed or returned empty content.
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure.
        last_error: String,
    },
}

impl CompletionOutcome {
    /// The completion text, if any came back.
    pub fn text(&self) -> Option<&str> {
        match self {
            CompletionOutcome::Text(text) => Some(text),
            CompletionOutcome::Exhausted { .. } => None,
        }
    }

    /// Whether the attempt budget was exhausted without usable text.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, CompletionOutcome::Exhausted { .. })
    }
}

/// Completion client with bounded retry-on-failure/retry-on-empty semantics.
pub struct RetryingCompletionClient {
    /// The underlying provider.
    provider: Arc<dyn CompletionProvider>,
    /// Maximum number of attempts per call.
    max_attempts: u32,
    /// Fixed delay between attempts.
    retry_delay: Duration,
}

impl RetryingCompletionClient {
    /// Create a client with the default policy (6 attempts, 3s apart).
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self::with_policy(
            provider,
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        )
    }

    /// Create a client with an explicit retry policy.
    ///
    /// `max_attempts` of zero is coerced to one: a call always makes at
    /// least one attempt.
    pub fn with_policy(
        provider: Arc<dyn CompletionProvider>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            provider,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Maximum number of attempts per call.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run a single-prompt completion with retries.
    ///
    /// An attempt counts as failed when the provider errors or when the
    /// response carries no non-whitespace text. The first attempt that
    /// produces usable text returns immediately; exhaustion returns
    /// [`CompletionOutcome::Exhausted`] with the last failure description.
    pub async fn complete(
        &self,
        prompt: &str,
        model: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> CompletionOutcome {
        let request = CompletionRequest::new(model, vec![Message::user(prompt)])
            .with_temperature(temperature)
            .with_max_tokens(max_tokens);

        let mut last_error = String::from("no attempts made");

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
                tracing::debug!(
                    attempt = attempt + 1,
                    max_attempts = self.max_attempts,
                    model = %model,
                    "Retrying completion request"
                );
            }

            match self.provider.complete(request.clone()).await {
                Ok(response) => match response.first_content() {
                    Some(content) if !content.trim().is_empty() => {
                        return CompletionOutcome::Text(content.to_string());
                    }
                    _ => {
                        last_error = LlmError::EmptyCompletion.to_string();
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_attempts = self.max_attempts,
                            model = %model,
                            "Completion returned no usable text"
                        );
                    }
                },
                Err(err) => {
                    last_error = err.to_string();
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        model = %model,
                        error = %err,
                        "Completion attempt failed"
                    );
                }
            }
        }

        CompletionOutcome::Exhausted {
            attempts: self.max_attempts,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::{Choice, CompletionResponse, Usage};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn make_response(content: &str) -> CompletionResponse {
        CompletionResponse {
            id: "mock-id".to_string(),
            model: "mock-model".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            },
        }
    }

    /// Provider that replays a scripted sequence of results.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<String, String>>>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<String, String>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or_else(|| Err("script exhausted".to_string()));
            match next {
                Ok(content) => Ok(make_response(&content)),
                Err(message) => Err(LlmError::RequestFailed(message)),
            }
        }
    }

    fn fast_client(provider: Arc<dyn CompletionProvider>, attempts: u32) -> RetryingCompletionClient {
        RetryingCompletionClient::with_policy(provider, attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_first_success_returns_immediately() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("plan text".to_string())]));
        let client = fast_client(provider.clone(), 6);

        let outcome = client.complete("prompt", "model", 0.1, 100).await;

        assert_eq!(outcome.text(), Some("plan text"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_after_error_then_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err("connection reset".to_string()),
            Ok("recovered".to_string()),
        ]));
        let client = fast_client(provider.clone(), 6);

        let outcome = client.complete("prompt", "model", 0.1, 100).await;

        assert_eq!(outcome.text(), Some("recovered"));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_content_counts_as_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("".to_string()),
            Ok("   \n".to_string()),
            Ok("real content".to_string()),
        ]));
        let client = fast_client(provider.clone(), 6);

        let outcome = client.complete("prompt", "model", 0.1, 100).await;

        assert_eq!(outcome.text(), Some("real content"));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_sentinel_not_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err("down".to_string()),
            Err("down".to_string()),
            Err("still down".to_string()),
        ]));
        let client = fast_client(provider.clone(), 3);

        let outcome = client.complete("prompt", "model", 0.1, 100).await;

        assert!(outcome.is_exhausted());
        assert_eq!(provider.calls(), 3);
        match outcome {
            CompletionOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("still down"));
            }
            CompletionOutcome::Text(_) => panic!("expected exhaustion"),
        }
    }

    #[tokio::test]
    async fn test_always_empty_exhausts_with_empty_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(String::new()),
            Ok(String::new()),
        ]));
        let client = fast_client(provider.clone(), 2);

        let outcome = client.complete("prompt", "model", 0.1, 100).await;

        assert!(outcome.is_exhausted());
        match outcome {
            CompletionOutcome::Exhausted { last_error, .. } => {
                assert!(last_error.contains("no usable text"));
            }
            CompletionOutcome::Text(_) => panic!("expected exhaustion"),
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_coerced_to_one() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("content".to_string())]));
        let client = fast_client(provider.clone(), 0);

        assert_eq!(client.max_attempts(), 1);
        let outcome = client.complete("prompt", "model", 0.1, 100).await;
        assert_eq!(outcome.text(), Some("content"));
    }
}
