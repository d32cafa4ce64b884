//! Summarization service coordinating the pipeline, templates, history, and metrics.

use crate::{
    config::get_config,
    history::{HistoryError, HistoryRecord, HistoryStore, InMemoryHistoryStore, NewHistoryRecord},
    llm::{ChatCompletionsClient, ModelClient},
    metrics::{MetricsSnapshot, SummaryMetrics},
    processing::{
        chunking::split_text,
        pipeline::SummaryPipeline,
        templates::TemplateSet,
        tokens::TokenCounter,
        types::{
            Chunk, ChunkSettings, DEFAULT_MODEL, PipelineConfig, PipelineError, SummarizeOutcome,
            SummarizeRequest,
        },
    },
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Errors surfaced by the service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The pipeline rejected the request or failed while running it.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// The history store failed.
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Owns long-lived handles shared by the HTTP surface and the CLI.
///
/// Construct the service once near process start and share it through an `Arc`.
pub struct SummaryService {
    pipeline: SummaryPipeline,
    templates: TemplateSet,
    history: Arc<dyn HistoryStore>,
    metrics: Arc<SummaryMetrics>,
    history_limit: usize,
}

/// Abstraction over the summarization service used by external surfaces.
#[async_trait]
pub trait SummaryApi: Send + Sync {
    /// Run the full pipeline for one request.
    async fn summarize(&self, request: SummarizeRequest)
    -> Result<SummarizeOutcome, ServiceError>;

    /// Split text with a single pass, without calling any model.
    fn split(
        &self,
        text: &str,
        settings: ChunkSettings,
        model: Option<&str>,
    ) -> Result<Vec<Chunk>, ServiceError>;

    /// Most recent history records, newest first.
    async fn history(&self) -> Result<Vec<HistoryRecord>, ServiceError>;

    /// Fetch one history record by id.
    async fn history_record(&self, id: &str) -> Result<HistoryRecord, ServiceError>;

    /// Delete one history record.
    async fn delete_history(&self, id: &str) -> Result<(), ServiceError>;

    /// Probe the backing stores.
    async fn health(&self) -> Result<(), ServiceError>;

    /// Retrieve the current metrics snapshot.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl SummaryService {
    /// Assemble a service from explicit parts.
    pub fn new(
        pipeline: SummaryPipeline,
        templates: TemplateSet,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            pipeline,
            templates,
            history,
            metrics: Arc::new(SummaryMetrics::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Number of records returned by [`SummaryService::history`].
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Build the service from the global configuration.
    ///
    /// Creates the chat completions client, loads templates from the configured directory, and
    /// starts with an empty in-memory history.
    pub fn from_config() -> Result<Self, ServiceError> {
        let config = get_config();
        let client: Arc<dyn ModelClient> = Arc::new(
            ChatCompletionsClient::new(config.model_client_config()).map_err(PipelineError::from)?,
        );
        let templates = TemplateSet::load(&config.template_dir).map_err(PipelineError::from)?;
        tracing::info!(template_dir = %config.template_dir.display(), "Prompt templates loaded");
        let pipeline = SummaryPipeline::new(client)
            .with_max_concurrent_calls(config.max_concurrent_calls)
            .with_timeout(config.pipeline_timeout());

        Ok(
            Self::new(pipeline, templates, Arc::new(InMemoryHistoryStore::new()))
                .with_history_limit(config.history_limit),
        )
    }

    /// Translate a request into an immutable run configuration.
    pub fn build_config(
        &self,
        request: &SummarizeRequest,
    ) -> Result<PipelineConfig, PipelineError> {
        let templates = self.templates.clone().with_overrides(
            request.map_template.as_deref(),
            request.reduce_template.as_deref(),
        )?;
        let config = PipelineConfig {
            primary: ChunkSettings::new(request.chunk_size_1, request.chunk_overlap_1),
            secondary: ChunkSettings::new(request.chunk_size_2, request.chunk_overlap_2),
            token_max: request.token_max,
            use_map: request.use_map,
            test_mode: request.test_mode,
            model: request.model.trim().to_string(),
            language: request.language.clone(),
            map_temperature: request.temperature,
            reduce_temperature: request.reduce_temperature,
            max_collapse_rounds: request.max_collapse_rounds,
            templates,
            ..PipelineConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Run the pipeline and persist the result unless the run is a test run.
    pub async fn summarize(
        &self,
        request: SummarizeRequest,
    ) -> Result<SummarizeOutcome, ServiceError> {
        tracing::info!(
            model = %request.model,
            chars = request.text.chars().count(),
            use_map = request.use_map,
            test_mode = request.test_mode,
            "Summarizing document"
        );
        match self.run_and_record(request).await {
            Ok(outcome) => {
                self.metrics.record_success(
                    outcome.processing_time,
                    outcome.stats.model_calls as u64,
                );
                Ok(outcome)
            }
            Err(error) => {
                tracing::warn!(error = %error, "Summarization failed");
                self.metrics.record_failure();
                Err(error)
            }
        }
    }

    async fn run_and_record(
        &self,
        request: SummarizeRequest,
    ) -> Result<SummarizeOutcome, ServiceError> {
        let config = self.build_config(&request)?;
        let result = self.pipeline.run(&request.text, &config).await?;

        let history_id = if config.test_mode {
            None
        } else {
            let record = self
                .history
                .insert(NewHistoryRecord {
                    original_text: request.text,
                    summary: result.summary.clone(),
                    model: config.model.clone(),
                    processing_time: result.processing_time,
                    config,
                })
                .await?;
            Some(record.id)
        };

        Ok(SummarizeOutcome {
            summary: result.summary,
            processing_time: result.processing_time,
            history_id,
            stats: result.stats,
        })
    }

    /// Split `text` with one pass, counting tokens for `model` (or the default model).
    pub fn split(
        &self,
        text: &str,
        settings: ChunkSettings,
        model: Option<&str>,
    ) -> Result<Vec<Chunk>, ServiceError> {
        let counter = TokenCounter::for_model(model.unwrap_or(DEFAULT_MODEL))?;
        Ok(split_text(text, settings, &counter)?)
    }

    /// Most recent history records, newest first.
    pub async fn history(&self) -> Result<Vec<HistoryRecord>, ServiceError> {
        Ok(self.history.list(self.history_limit).await?)
    }

    /// Fetch one history record by id.
    pub async fn history_record(&self, id: &str) -> Result<HistoryRecord, ServiceError> {
        Ok(self.history.get(id).await?)
    }

    /// Delete one history record.
    pub async fn delete_history(&self, id: &str) -> Result<(), ServiceError> {
        self.history.delete(id).await?;
        tracing::info!(id, "History record deleted");
        Ok(())
    }

    /// Probe the history store.
    pub async fn health(&self) -> Result<(), ServiceError> {
        Ok(self.history.ping().await?)
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl SummaryApi for SummaryService {
    async fn summarize(
        &self,
        request: SummarizeRequest,
    ) -> Result<SummarizeOutcome, ServiceError> {
        SummaryService::summarize(self, request).await
    }

    fn split(
        &self,
        text: &str,
        settings: ChunkSettings,
        model: Option<&str>,
    ) -> Result<Vec<Chunk>, ServiceError> {
        SummaryService::split(self, text, settings, model)
    }

    async fn history(&self) -> Result<Vec<HistoryRecord>, ServiceError> {
        SummaryService::history(self).await
    }

    async fn history_record(&self, id: &str) -> Result<HistoryRecord, ServiceError> {
        SummaryService::history_record(self, id).await
    }

    async fn delete_history(&self, id: &str) -> Result<(), ServiceError> {
        SummaryService::delete_history(self, id).await
    }

    async fn health(&self) -> Result<(), ServiceError> {
        SummaryService::health(self).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        SummaryService::metrics_snapshot(self)
    }
}
