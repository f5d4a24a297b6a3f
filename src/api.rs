//! LLM API interaction with exponential backoff retry logic.
//!
//! This module provides the interface the enhancer uses to talk to an
//! OpenAI-compatible LLM API through `awful_aj`.
//!
//! # Architecture
//!
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`AskFnWrapper`]: Wraps the `awful_aj` library's `ask` function
//! - [`RetryAsk`]: Decorator that adds bounded retry to any `AskAsync` implementation
//!
//! # Retry Strategy
//!
//! - At most [`RetryPolicy::max_attempts`] calls in total (3 by default)
//! - Delay before attempt `n + 1` is `base_delay * 2^(n-1)`: 1s, then 2s
//! - A blank response from a call that otherwise succeeded counts as a failure
//! - After the last attempt the last error is returned

use crate::error::PipelineError;
use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send text to an LLM and receive a response.
/// This abstraction allows for different LLM backends or decorators (like retry logic).
pub trait AskAsync {
    /// Send text to the LLM and receive its reply.
    async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>>;
}

/// How often and how patiently a generation call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of calls, including the first.
    pub max_attempts: usize,
    /// Delay after the first failure; doubles after each further failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as u32;
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// # Backoff Strategy
///
/// ```text
/// delay(attempt) = base_delay * 2^(attempt-1)
/// ```
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Call the inner client until it returns non-blank text or the attempt
    /// budget is spent.
    #[instrument(level = "info", skip_all, fields(max_attempts = self.policy.max_attempts))]
    pub async fn ask_with_retry(&self, text: &str) -> Result<String, PipelineError> {
        let total_t0 = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let attempt_t0 = Instant::now();

            let failure = match self.inner.ask(text).await {
                Ok(resp) if !resp.trim().is_empty() => {
                    info!(
                        attempt,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        "ask() succeeded"
                    );
                    return Ok(resp);
                }
                Ok(_) => "model returned an empty response".to_string(),
                Err(e) => e.to_string(),
            };

            if attempt >= max_attempts {
                error!(
                    attempt,
                    max = max_attempts,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    error = %failure,
                    "ask() exhausted retries"
                );
                return Err(PipelineError::Generation {
                    attempts: attempt,
                    reason: failure,
                });
            }

            let delay = self.policy.delay_after(attempt);
            warn!(
                attempt,
                max = max_attempts,
                elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                ?delay,
                error = %failure,
                "ask() attempt failed; backing off"
            );
            sleep(delay).await;
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_attempts", &self.policy.max_attempts)
            .field("base_delay", &self.policy.base_delay)
            .finish()
    }
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
///
/// The chat template carries the system prompt; the text sent through
/// [`AskAsync::ask`] is the user message built by the enhancer.
#[derive(Debug)]
pub struct AskFnWrapper {
    /// LLM configuration (API keys, endpoints, model settings).
    pub config: AwfulJadeConfig,
    /// Chat template defining the conversation structure.
    pub template: ChatTemplate,
}

impl AskAsync for AskFnWrapper {
    #[instrument(level = "info", skip_all, fields(prompt_chars = text.len()))]
    async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(&self.config, text.to_string(), &self.template, None, None).await;
        let dt = t0.elapsed();

        match &res {
            Ok(_) => {}
            Err(e) => warn!(elapsed_ms = dt.as_millis() as u64, error = %e, "API call failed"),
        }
        res
    }
}
