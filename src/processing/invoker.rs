//! Bounded, counted access to the model client for one pipeline run.

use crate::llm::{ModelClient, ModelError, ModelRequest};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Wraps a [`ModelClient`] with a concurrency limit shared by every call of a run.
///
/// Map chunks and collapse groups are issued concurrently; the semaphore keeps the number of
/// in-flight requests at or below `max_concurrent`.
pub struct ModelInvoker<'a> {
    client: &'a dyn ModelClient,
    model: &'a str,
    limiter: Semaphore,
    calls: AtomicUsize,
}

impl<'a> ModelInvoker<'a> {
    /// Create an invoker for `model` allowing `max_concurrent` simultaneous calls.
    pub fn new(client: &'a dyn ModelClient, model: &'a str, max_concurrent: usize) -> Self {
        Self {
            client,
            model,
            limiter: Semaphore::new(max_concurrent.max(1)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Send one rendered prompt to the model.
    pub async fn invoke(
        &self,
        prompt: String,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<String, ModelError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| ModelError::ModelUnavailable("call limiter closed".into()))?;
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.client
            .invoke(ModelRequest {
                prompt,
                model: self.model.to_string(),
                temperature,
                max_output_tokens,
            })
            .await
    }

    /// Number of calls issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}
