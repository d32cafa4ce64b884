//! In-process model double for stage and pipeline tests.

use crate::llm::{ModelClient, ModelError, ModelRequest};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Script = dyn Fn(&ModelRequest) -> (Duration, Result<String, ModelError>) + Send + Sync;

/// Answers each request from a closure, after the delay the closure picks.
pub(crate) struct ScriptedModel {
    script: Box<Script>,
    requests: Mutex<Vec<ModelRequest>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedModel {
    pub(crate) fn new(
        script: impl Fn(&ModelRequest) -> (Duration, Result<String, ModelError>)
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Returns every prompt unchanged.
    pub(crate) fn echo() -> Self {
        Self::new(|request| (Duration::ZERO, Ok(request.prompt.clone())))
    }

    /// Requests seen so far, in arrival order.
    pub(crate) fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of calls that were in flight at once.
    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn invoke(&self, request: ModelRequest) -> Result<String, ModelError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let (delay, outcome) = (self.script)(&request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}
