use crate::completion::{ChatCompletion, ChatMessage, ChatRequest};
use crate::error::CompletionError;
use crate::prompt::{SYSTEM_INSTRUCTION, build_prompt, validate_question};
use log::{debug, error, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Shown when every attempt failed with a transient error
pub const DEGRADED_MESSAGE: &str =
    "⚠️ The answer service is busy right now. Please try again in a moment.";

/// Shown for failures a retry cannot fix (bad key, rejected request, ...)
pub const UNAVAILABLE_MESSAGE: &str = "⚠️ Service unavailable. Please try again later.";

pub const MAX_OUTPUT_TOKENS: u32 = 200;
pub const TEMPERATURE: f64 = 0.3;
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Bounded exponential backoff with full jitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Ceiling of the first wait; doubles after every failure
    pub base_delay: Duration,
    /// No wait is ever longer than this
    pub max_delay: Duration,
    /// Total attempts, the first one included
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Largest wait allowed after the `retry`-th failure (0-based)
    pub fn backoff_ceiling(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// A random wait in `[0, backoff_ceiling(retry)]`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let ceiling = self.backoff_ceiling(retry).as_secs_f64();
        let secs = rand::thread_rng().gen_range(0.0..=ceiling);
        Duration::from_secs_f64(secs)
    }
}

/// Outcome of asking a question
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// The model's formatted answer
    Text(String),
    /// The question was refused before any remote call
    Rejected(String),
    /// The remote service failed; the message is safe to show
    Degraded(String),
}

impl Answer {
    /// Text to put on the page
    pub fn message(&self) -> &str {
        match self {
            Answer::Text(text) | Answer::Rejected(text) | Answer::Degraded(text) => text,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Answer::Text(_))
    }
}

/// Turns questions into answers from the chat-completion backend
pub struct AnswerService {
    client: Arc<dyn ChatCompletion>,
    model: String,
    policy: RetryPolicy,
}

impl AnswerService {
    pub fn new(client: Arc<dyn ChatCompletion>, model: impl Into<String>, policy: RetryPolicy) -> Self {
        AnswerService {
            client,
            model: model.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The request sent for an already validated question
    pub fn request_for(&self, question: &str, dataset_csv: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_INSTRUCTION),
                ChatMessage::user(build_prompt(question, dataset_csv)),
            ],
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
        }
    }

    /// Validate a raw question and answer it from the dataset
    ///
    /// Never fails: rejected questions and service failures come back as
    /// user-facing messages, and failure details only go to the log.
    pub async fn ask(&self, raw_question: &str, dataset_csv: &str) -> Answer {
        let question = match validate_question(raw_question) {
            Ok(question) => question,
            Err(reason) => {
                debug!("Question rejected: {reason}");
                return Answer::Rejected(reason.to_string());
            }
        };

        let request = self.request_for(&question, dataset_csv);
        match self.complete_with_retry(&request).await {
            Ok(text) => {
                info!("Answered question of {} chars", question.chars().count());
                Answer::Text(text)
            }
            Err(err) if err.is_transient() => {
                error!(
                    "Chat completion gave up after {} attempts: {err}",
                    self.policy.max_attempts
                );
                Answer::Degraded(DEGRADED_MESSAGE.to_string())
            }
            Err(err) => {
                error!("Chat completion failed ({}): {err}", err.category());
                Answer::Degraded(UNAVAILABLE_MESSAGE.to_string())
            }
        }
    }

    /// Send a request, retrying transient failures per the policy
    pub async fn complete_with_retry(&self, request: &ChatRequest) -> Result<String, CompletionError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.client.complete(request).await {
                Ok(text) => {
                    if attempt > 1 {
                        info!("Chat completion succeeded on attempt {attempt}");
                    }
                    return Ok(text);
                }
                Err(err) => {
                    warn!(
                        "Chat completion attempt {attempt}/{max_attempts} failed ({}): {err}",
                        err.category()
                    );
                    if !err.is_transient() || attempt >= max_attempts {
                        return Err(err);
                    }
                    let delay = self.policy.delay_for(attempt - 1);
                    debug!("Retrying in {}ms", delay.as_millis());
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::completion::OpenAiClient;
    use crate::prompt::{EMPTY_QUESTION, QUESTION_TOO_LONG};
    use async_trait::async_trait;
    use mockito::Server;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CSV: &str = "Name,Class,Marks_Math,Marks_Science,Marks_English\nAsha,10A,80,75,90\n";

    /// Replays scripted results and records every request it sees
    struct ScriptedClient {
        calls: AtomicUsize,
        script: Mutex<VecDeque<Result<String, CompletionError>>>,
        last_request: Mutex<Option<ChatRequest>>,
    }

    impl ScriptedClient {
        fn new(script: Vec<Result<String, CompletionError>>) -> Arc<Self> {
            Arc::new(ScriptedClient {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
                last_request: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatCompletion for ScriptedClient {
        async fn complete(&self, request: &ChatRequest) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CompletionError::Network("script exhausted".into())))
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts: 3,
        }
    }

    fn service(client: Arc<ScriptedClient>) -> AnswerService {
        AnswerService::new(client, DEFAULT_MODEL, fast_policy())
    }

    fn server_error() -> Result<String, CompletionError> {
        Err(CompletionError::Server {
            status: 503,
            body: "overloaded".into(),
        })
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_ceiling_doubles_and_caps() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff_ceiling(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_ceiling(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_ceiling(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_ceiling(6), Duration::from_secs(60));
        assert_eq!(policy.backoff_ceiling(40), Duration::from_secs(60));
    }

    #[test]
    fn test_delay_never_exceeds_ceiling() {
        let policy = RetryPolicy::default();
        for retry in 0..8 {
            for _ in 0..50 {
                assert!(policy.delay_for(retry) <= policy.backoff_ceiling(retry));
            }
        }
    }

    #[tokio::test]
    async fn test_ask__when_answered__returns_text() {
        let client = ScriptedClient::new(vec![Ok("🎯 ANSWER: Asha".into())]);
        let answer = service(client.clone()).ask("Who is top?", CSV).await;

        assert_eq!(answer, Answer::Text("🎯 ANSWER: Asha".into()));
        assert!(answer.is_text());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_ask__sends_system_instruction_and_limits() {
        let client = ScriptedClient::new(vec![Ok("ok".into())]);
        service(client.clone()).ask("Average Math?", CSV).await;

        let request = client.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.model, DEFAULT_MODEL);
        assert_eq!(request.max_tokens, 200);
        assert!((0.3..=0.5).contains(&request.temperature));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0], ChatMessage::system(SYSTEM_INSTRUCTION));
        assert!(request.messages[1].content.contains(CSV));
        assert!(request.messages[1].content.contains("Average Math?"));
    }

    #[tokio::test]
    async fn test_ask__three_transient_failures__degrades_after_three_attempts() {
        let client = ScriptedClient::new(vec![
            server_error(),
            Err(CompletionError::RateLimited("slow down".into())),
            Err(CompletionError::Network("timed out".into())),
            Ok("never reached".into()),
        ]);
        let answer = service(client.clone()).ask("Who is top?", CSV).await;

        assert_eq!(answer, Answer::Degraded(DEGRADED_MESSAGE.into()));
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_ask__recovers_on_third_attempt() {
        let client = ScriptedClient::new(vec![
            server_error(),
            server_error(),
            Ok("🎯 ANSWER: Ben".into()),
        ]);
        let answer = service(client.clone()).ask("Who is top?", CSV).await;

        assert_eq!(answer, Answer::Text("🎯 ANSWER: Ben".into()));
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_ask__unauthorized__is_not_retried() {
        let client = ScriptedClient::new(vec![
            Err(CompletionError::Unauthorized("bad key".into())),
            Ok("never reached".into()),
        ]);
        let answer = service(client.clone()).ask("Who is top?", CSV).await;

        assert_eq!(answer, Answer::Degraded(UNAVAILABLE_MESSAGE.into()));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_ask__degraded_message_hides_failure_detail() {
        let client = ScriptedClient::new(vec![Err(CompletionError::Rejected {
            status: 400,
            body: "secret internal detail".into(),
        })]);
        let answer = service(client).ask("Who is top?", CSV).await;

        assert!(!answer.message().contains("secret internal detail"));
    }

    #[tokio::test]
    async fn test_ask__question_of_201_chars__never_calls_remote() {
        let client = ScriptedClient::new(vec![Ok("unused".into())]);
        let answer = service(client.clone()).ask(&"a".repeat(201), CSV).await;

        assert_eq!(answer, Answer::Rejected(QUESTION_TOO_LONG.into()));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_ask__blank_question__never_calls_remote() {
        let client = ScriptedClient::new(vec![Ok("unused".into())]);
        let answer = service(client.clone()).ask("  \n ", CSV).await;

        assert_eq!(answer, Answer::Rejected(EMPTY_QUESTION.into()));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_single_attempt_policy() {
        let client = ScriptedClient::new(vec![server_error(), Ok("unused".into())]);
        let policy = RetryPolicy {
            max_attempts: 1,
            ..fast_policy()
        };
        let service = AnswerService::new(client.clone(), DEFAULT_MODEL, policy);
        let request = service.request_for("Who?", CSV);

        assert!(service.complete_with_retry(&request).await.is_err());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_ask__against_http_backend_returning_500() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let client = OpenAiClient::new(server.url(), "test-key", Duration::from_secs(2)).unwrap();
        let service = AnswerService::new(Arc::new(client), DEFAULT_MODEL, fast_policy());
        let answer = service.ask("Who is top?", CSV).await;

        assert_eq!(answer, Answer::Degraded(DEGRADED_MESSAGE.into()));
        mock.assert_async().await;
    }
}
