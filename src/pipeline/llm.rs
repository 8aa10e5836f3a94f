//! VLM interaction: send one image plus one instruction, get raw text back.
//!
//! [`ModelClient`] is the contract with the external model service. The
//! production implementation, [`ProviderClient`], wraps an `edgequake-llm`
//! provider; tests script replies through their own implementation.
//!
//! [`call_model`] adds the per-call timeout and the retry policy on top of
//! any client. Only transient service errors are retried
//! (see [`ExtractError::is_retryable`]); with 500 ms base backoff and two
//! retries the waits are 500 ms → 1 s.

use crate::error::ExtractError;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// One model request.
#[derive(Clone)]
pub struct ModelRequest<'a> {
    pub image: &'a ImageData,
    pub prompt: &'a str,
    /// Response-size limit in output tokens.
    pub max_tokens: usize,
}

/// Raw model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ModelReply {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// An image-understanding model reachable over the network.
///
/// Implementations map every transport or API failure to one of the
/// [`crate::error::ErrorKind::ExtractionService`] variants and never inspect
/// the reply text.
pub trait ModelClient: Send + Sync {
    fn complete<'a>(&'a self, request: ModelRequest<'a>) -> BoxFuture<'a, Result<ModelReply, ExtractError>>;
}

/// [`ModelClient`] backed by an `edgequake-llm` provider.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32) -> Self {
        Self {
            provider,
            temperature,
        }
    }
}

impl ModelClient for ProviderClient {
    fn complete<'a>(&'a self, request: ModelRequest<'a>) -> BoxFuture<'a, Result<ModelReply, ExtractError>> {
        Box::pin(async move {
            // Single user turn: the drawing first, then the instruction.
            let messages = vec![ChatMessage::user_with_images(
                request.prompt,
                vec![request.image.clone()],
            )];
            let options = CompletionOptions {
                temperature: Some(self.temperature),
                max_tokens: Some(request.max_tokens),
                ..Default::default()
            };

            let response = self
                .provider
                .chat(&messages, Some(&options))
                .await
                .map_err(|e| ExtractError::from_provider_message(e.to_string()))?;

            Ok(ModelReply {
                text: response.content,
                input_tokens: response.prompt_tokens as usize,
                output_tokens: response.completion_tokens as usize,
            })
        })
    }
}

/// Timeout and retry settings for [`call_model`].
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

/// A successful call and how many attempts it took.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub reply: ModelReply,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Call `client` with a timeout per attempt and bounded retries.
pub async fn call_model(
    client: &dyn ModelClient,
    request: ModelRequest<'_>,
    policy: CallPolicy,
) -> Result<CallOutcome, ExtractError> {
    let start = Instant::now();
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let backoff = policy.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Retry {}/{} after {}ms",
                attempt, policy.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let result = match timeout(
            Duration::from_secs(policy.timeout_secs),
            client.complete(request.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ExtractError::ServiceTimeout {
                secs: policy.timeout_secs,
            }),
        };

        match result {
            Ok(reply) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                debug!(
                    "Model replied: {} chars, {} input tokens, {} output tokens, {}ms",
                    reply.text.len(),
                    reply.input_tokens,
                    reply.output_tokens,
                    duration_ms
                );
                return Ok(CallOutcome {
                    reply,
                    attempts: attempt + 1,
                    duration_ms,
                });
            }
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                warn!("Attempt {} failed — {}", attempt + 1, e);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
