use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::provider::ProviderError;

const MAX_ATTEMPTS: u32 = 5;
const MIN_WAIT_MS: u64 = 4_000;
const MAX_WAIT_MS: u64 = 20_000;
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Call an LLM with exponential backoff, honoring cancellation.
///
/// Unlike the teacher's `call_llm_with_retry` (which backs off on rate
/// limits), this retries only transient 5xx/network failures — a 429 is
/// never retried, it is mapped straight to `AgentError::QuotaExhausted` and
/// returned to the caller on the first attempt.
pub async fn call_with_retry<F, Fut>(
    model: &str,
    cancel: &CancellationToken,
    mut call_fn: F,
) -> Result<crate::provider::ChatResponse, AgentError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<crate::provider::ChatResponse, ProviderError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        match call_fn().await {
            Ok(resp) => {
                if attempt > 1 {
                    info!(model, attempt, "LLM call succeeded after retry");
                }
                return Ok(resp);
            }
            Err(ProviderError::Api { status: 429, message }) => {
                return Err(AgentError::QuotaExhausted {
                    model: model.to_string(),
                    metric: "requests".to_string(),
                    limit: 0,
                    retry_after_ms: None,
                })
                .inspect_err(|_| warn!(model, message, "quota exhausted, not retrying"));
            }
            Err(ProviderError::RateLimited { retry_after_ms }) => {
                return Err(AgentError::QuotaExhausted {
                    model: model.to_string(),
                    metric: "requests".to_string(),
                    limit: 0,
                    retry_after_ms,
                });
            }
            Err(e) if e.is_retryable() => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(AgentError::TransientLlm(format!(
                        "exhausted {MAX_ATTEMPTS} attempts: {e}"
                    )));
                }

                let wait_ms = next_wait_ms(attempt);
                debug!(model, attempt, wait_ms, "transient LLM error, retrying");

                let cancelled = wait_with_cancellation(wait_ms, cancel).await;
                if cancelled {
                    return Err(AgentError::Cancelled);
                }
                continue;
            }
            Err(e) => return Err(AgentError::LlmClient(e.to_string())),
        }
    }
}

fn next_wait_ms(attempt: u32) -> u64 {
    let scaled = (MIN_WAIT_MS as f64) * BACKOFF_MULTIPLIER.powi((attempt - 1) as i32);
    (scaled as u64).clamp(MIN_WAIT_MS, MAX_WAIT_MS)
}

async fn wait_with_cancellation(wait_ms: u64, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(std::time::Duration::from_millis(wait_ms)) => false,
        _ = cancel.cancelled() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatResponse;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ok_response() -> ChatResponse {
        ChatResponse {
            content: "hi".to_string(),
            model: "m".to_string(),
            tokens_in: 1,
            tokens_out: 1,
            stop_reason: "stop".to_string(),
            tool_calls: Vec::new(),
        }
    }

    #[tokio::test]
    async fn quota_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result = call_with_retry("m", &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Api { status: 429, message: "quota".to_string() }) }
        })
        .await;

        assert!(matches!(result, Err(AgentError::QuotaExhausted { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result = call_with_retry("m", &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Api { status: 400, message: "bad request".to_string() }) }
        })
        .await;

        assert!(matches!(result, Err(AgentError::LlmClient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = call_with_retry("m", &cancel, || async { Ok(ok_response()) }).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
    }
}
