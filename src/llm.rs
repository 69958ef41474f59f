//! Chat-completion endpoint interaction with exponential backoff retry logic.
//!
//! The risk commands talk to a hosted OpenAI-compatible endpoint. This
//! module provides that client behind a trait seam:
//! - [`ChatBackend`]: core trait defining one async completion call
//! - [`ChatClient`]: `reqwest` implementation of the wire protocol
//! - [`RetryChat`]: decorator adding retry logic to any `ChatBackend`
//!
//! # Retry Strategy
//!
//! - Maximum 5 retry attempts
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::config::LlmProfile;
use rand::{Rng, rng};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// Errors surfaced while talking to the chat endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The request never completed.
    #[error("chat request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The endpoint answered with a non-success status.
    #[error("chat endpoint returned HTTP {0}")]
    Status(StatusCode),
    /// The endpoint answered but carried no usable message content.
    #[error("chat reply contained no choices")]
    EmptyReply,
}

/// Trait for one async completion call against a chat model.
///
/// The decorator below and the tests both hang off this seam, so callers
/// never depend on the concrete HTTP client.
pub trait ChatBackend {
    type Response;

    async fn complete(&self, prompt: &str) -> Result<Self::Response, LlmError>;
}

/// `reqwest` implementation of [`ChatBackend`] for OpenAI-compatible hosts.
pub struct ChatClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Deserialize)]
struct ChatReplyMessage {
    content: String,
}

impl ChatClient {
    pub fn from_profile(profile: &LlmProfile) -> Self {
        Self {
            base_url: profile.base_url.trim_end_matches('/').to_string(),
            api_key: profile.api_key.clone(),
            model: profile.model.clone(),
            client: reqwest::Client::new(),
        }
    }
}

impl ChatBackend for ChatClient {
    type Response = String;

    #[instrument(level = "info", skip_all)]
    async fn complete(&self, prompt: &str) -> Result<Self::Response, LlmError> {
        let t0 = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, elapsed_ms = t0.elapsed().as_millis() as u128, "Chat call rejected");
            return Err(LlmError::Status(status));
        }

        let decoded: ChatResponse = response.json().await?;
        decoded
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LlmError::EmptyReply)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`ChatBackend`].
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryChat<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryChat<T>
where
    T: ChatBackend,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryChat<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryChat")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> ChatBackend for RetryChat<T>
where
    T: ChatBackend + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn complete(&self, prompt: &str) -> Result<Self::Response, LlmError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.complete(prompt).await {
                Ok(reply) => {
                    return Ok(reply);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                            elapsed_ms_total = total_dt.as_millis() as u128,
                            error = %e,
                            "complete() exhausted retries"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                        elapsed_ms_total = total_dt.as_millis() as u128,
                        ?delay,
                        error = %e,
                        "complete() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// The backend the risk commands use: the HTTP client wrapped in retry
/// protection with the standard constants.
pub fn retrying_client(profile: &LlmProfile) -> RetryChat<ChatClient> {
    RetryChat::new(
        ChatClient::from_profile(profile),
        5,
        StdDuration::from_secs(1),
    )
}
