//! Model interaction: one chat call with timeout, retry and backoff.
//!
//! Both provider adapters in [`crate::provider`] funnel through
//! [`chat_with_retry`], so the vision call and every text call share one
//! failure policy:
//!
//! * each attempt is bounded by `api_timeout_secs`; a timed-out attempt counts
//!   as a failed attempt and is retried;
//! * retries back off exponentially (`retry_backoff_ms * 2^(attempt-1)`);
//! * after `max_retries` the last failure is returned as a [`ModelError`].
//!
//! Parsing lives in [`crate::pipeline::parse`].

use crate::error::ModelError;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Retry policy for one call site.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub api_timeout_secs: u64,
}

/// Delay before retry number `attempt` (1-based). Saturates instead of overflowing.
pub fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Send `messages` and return the text of the first successful reply.
///
/// `label` only tags log lines (e.g. `"page 3"`, `"themes"`). Token usage
/// is logged at debug level.
pub async fn chat_with_retry(
    provider: &Arc<dyn LLMProvider>,
    label: &str,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    policy: CallPolicy,
) -> Result<String, ModelError> {
    let start = Instant::now();
    let mut last_err = ModelError::Call {
        retries: 0,
        detail: "no attempt made".into(),
    };

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(policy.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, policy.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let call = provider.chat(messages, Some(options));
        match timeout(Duration::from_secs(policy.api_timeout_secs), call).await {
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {} retries, {:?}",
                    label,
                    response.prompt_tokens,
                    response.completion_tokens,
                    attempt,
                    start.elapsed()
                );
                return Ok(response.content);
            }
            Ok(Err(e)) => {
                warn!("{}: attempt {} failed: {}", label, attempt + 1, e);
                last_err = ModelError::Call {
                    retries: policy.max_retries,
                    detail: e.to_string(),
                };
            }
            Err(_) => {
                warn!(
                    "{}: attempt {} timed out after {}s",
                    label,
                    attempt + 1,
                    policy.api_timeout_secs
                );
                last_err = ModelError::Timeout {
                    secs: policy.api_timeout_secs,
                };
            }
        }
    }

    Err(last_err)
}

/// Build `CompletionOptions` for a call site.
pub fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}
