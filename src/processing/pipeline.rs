//! Dual-path orchestration: split twice, map both paths, reduce the concatenation.

use crate::llm::ModelClient;
use crate::processing::chunking::split_text;
use crate::processing::invoker::ModelInvoker;
use crate::processing::map::{MapSettings, map_chunks};
use crate::processing::reduce::{ReduceSettings, reduce};
use crate::processing::tokens::TokenCounter;
use crate::processing::types::{
    PipelineConfig, PipelineError, RunResult, RunStats, SummarizableUnit,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Label for summaries of the coarse-grained pass.
pub const PRIMARY_PATH: &str = "path-1";
/// Label for summaries of the fine-grained pass.
pub const SECONDARY_PATH: &str = "path-2";

const DEFAULT_MAX_CONCURRENT_CALLS: usize = 4;

/// Runs the split, map, and reduce stages against one model client.
///
/// The pipeline holds no per-run state; every call to [`SummaryPipeline::run`] builds its own
/// token counter and call limiter from the supplied [`PipelineConfig`].
#[derive(Clone)]
pub struct SummaryPipeline {
    client: Arc<dyn ModelClient>,
    max_concurrent_calls: usize,
    timeout: Option<Duration>,
}

impl SummaryPipeline {
    /// Create a pipeline calling `client`, with no timeout.
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            timeout: None,
        }
    }

    /// Cap the number of model calls in flight during one run.
    pub fn with_max_concurrent_calls(mut self, limit: usize) -> Self {
        self.max_concurrent_calls = limit.max(1);
        self
    }

    /// Abort runs that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Summarize `text` under `config`.
    pub async fn run(
        &self,
        text: &str,
        config: &PipelineConfig,
    ) -> Result<RunResult, PipelineError> {
        let started = Instant::now();
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        config.validate()?;

        if config.test_mode {
            tracing::info!(model = %config.model, "Test mode; skipping model calls");
            return Ok(RunResult {
                summary: placeholder_summary(&config.model, text),
                processing_time: started.elapsed().as_secs_f64(),
                stats: RunStats::default(),
            });
        }

        let execution = self.execute(text, config);
        let (summary, stats) = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, execution)
                .await
                .map_err(|_| {
                    tracing::warn!(timeout = ?limit, "Pipeline timed out");
                    PipelineError::Timeout(limit)
                })??,
            None => execution.await?,
        };

        let processing_time = started.elapsed().as_secs_f64();
        tracing::info!(
            model = %config.model,
            primary_chunks = stats.primary_chunks,
            secondary_chunks = stats.secondary_chunks,
            model_calls = stats.model_calls,
            collapse_rounds = stats.collapse_rounds,
            processing_time,
            "Summary generated"
        );
        Ok(RunResult {
            summary,
            processing_time,
            stats,
        })
    }

    async fn execute(
        &self,
        text: &str,
        config: &PipelineConfig,
    ) -> Result<(String, RunStats), PipelineError> {
        let counter = TokenCounter::for_model(&config.model)?;
        let primary = split_text(text, config.primary, &counter)?;
        let secondary = split_text(text, config.secondary, &counter)?;
        let primary_chunks = primary.len();
        let secondary_chunks = secondary.len();

        let invoker = ModelInvoker::new(
            self.client.as_ref(),
            &config.model,
            self.max_concurrent_calls,
        );

        let documents: Vec<SummarizableUnit> = if config.use_map {
            let settings = MapSettings {
                template: &config.templates.map,
                language: &config.language,
                temperature: config.map_temperature,
                max_output_tokens: config.map_max_output_tokens,
            };
            let (first, second) = tokio::try_join!(
                map_chunks(&invoker, &primary, PRIMARY_PATH, settings),
                map_chunks(&invoker, &secondary, SECONDARY_PATH, settings),
            )?;
            first
                .into_iter()
                .chain(second)
                .map(SummarizableUnit::Summary)
                .collect()
        } else {
            primary
                .into_iter()
                .chain(secondary)
                .map(SummarizableUnit::Chunk)
                .collect()
        };

        let settings = ReduceSettings {
            token_max: config.token_max,
            combine: &config.templates.combine,
            collapse: &config.templates.collapse,
            combine_separator: &config.combine_separator,
            collapse_separator: &config.collapse_separator,
            language: &config.language,
            combine_temperature: config.reduce_temperature,
            collapse_temperature: config.collapse_temperature,
            max_output_tokens: config.reduce_max_output_tokens,
            max_rounds: config.max_collapse_rounds,
        };
        let outcome = reduce(documents, &counter, &invoker, &settings).await?;

        Ok((
            outcome.summary,
            RunStats {
                primary_chunks,
                secondary_chunks,
                model_calls: invoker.calls(),
                collapse_rounds: outcome.rounds,
            },
        ))
    }
}

/// Summary returned in test mode.
pub fn placeholder_summary(model: &str, text: &str) -> String {
    format!(
        "[Test mode] Placeholder summary generated without calling a model.\n\n\
         * Model: {model}\n\
         * Input length: {} characters\n\
         * Used to verify the request path and storage wiring.",
        text.chars().count()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelError;
    use crate::processing::templates::{PromptTemplate, TemplateSet};
    use crate::processing::test_support::ScriptedModel;
    use crate::processing::types::ChunkSettings;

    fn labelled_templates() -> TemplateSet {
        TemplateSet {
            map: PromptTemplate::parse("map", "MAP {content}").unwrap(),
            collapse: PromptTemplate::parse("collapse", "COLLAPSE {content}").unwrap(),
            combine: PromptTemplate::parse("combine", "COMBINE {content}").unwrap(),
        }
    }

    fn config(primary: ChunkSettings, secondary: ChunkSettings) -> PipelineConfig {
        PipelineConfig {
            primary,
            secondary,
            token_max: 1000,
            model: "gpt-4o".into(),
            templates: labelled_templates(),
            ..PipelineConfig::default()
        }
    }

    /// Map wraps chunk text in `S(..)`; combine echoes its prompt.
    fn wrapping_model() -> Arc<ScriptedModel> {
        Arc::new(ScriptedModel::new(|request| {
            let output = match request.prompt.strip_prefix("MAP ") {
                Some(body) => format!("S({body})"),
                None => request.prompt.clone(),
            };
            (Duration::ZERO, Ok(output))
        }))
    }

    #[tokio::test]
    async fn raw_chunks_from_both_paths_reach_a_single_combine_call() {
        let model = Arc::new(ScriptedModel::new(|_| {
            (Duration::ZERO, Ok("final combined summary".into()))
        }));
        let pipeline = SummaryPipeline::new(model.clone());
        let config = PipelineConfig {
            use_map: false,
            ..config(ChunkSettings::new(100, 0), ChunkSettings::new(50, 0))
        };

        let result = pipeline
            .run("Hello mapping test.", &config)
            .await
            .unwrap();

        assert_eq!(result.summary, "final combined summary");
        assert_eq!(result.stats.primary_chunks, 1);
        assert_eq!(result.stats.secondary_chunks, 1);
        assert_eq!(result.stats.model_calls, 1);
        assert_eq!(result.stats.collapse_rounds, 0);
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].prompt,
            "COMBINE Hello mapping test.\n\nHello mapping test."
        );
    }

    #[tokio::test]
    async fn mapped_paths_are_concatenated_primary_first() {
        let model = wrapping_model();
        let pipeline = SummaryPipeline::new(model.clone());
        let config = config(ChunkSettings::new(3, 0), ChunkSettings::new(100, 0));

        let result = pipeline
            .run("one two three four", &config)
            .await
            .unwrap();

        assert_eq!(
            result.summary,
            "COMBINE S(one two)\n\nS(three four)\n\nS(one two three four)"
        );
        assert_eq!(result.stats.primary_chunks, 2);
        assert_eq!(result.stats.secondary_chunks, 1);
        assert_eq!(result.stats.model_calls, 4);
    }

    #[tokio::test]
    async fn disabled_secondary_path_contributes_nothing() {
        let model = wrapping_model();
        let pipeline = SummaryPipeline::new(model.clone());
        let config = config(ChunkSettings::new(100, 0), ChunkSettings::new(0, 0));

        let result = pipeline.run("short transcript", &config).await.unwrap();

        assert_eq!(result.summary, "COMBINE S(short transcript)");
        assert_eq!(result.stats.secondary_chunks, 0);
    }

    #[tokio::test]
    async fn test_mode_skips_the_model() {
        let model = Arc::new(ScriptedModel::new(|request| {
            panic!("model called in test mode: {}", request.prompt)
        }));
        let pipeline = SummaryPipeline::new(model.clone());
        for use_map in [true, false] {
            let config = PipelineConfig {
                test_mode: true,
                use_map,
                model: "google/gemma-3-27b-it:free".into(),
                ..PipelineConfig::default()
            };

            let result = pipeline.run("This is a test text.", &config).await.unwrap();

            assert!(result.summary.contains("google/gemma-3-27b-it:free"));
            assert!(result.summary.contains("20 characters"));
            assert_eq!(result.stats, RunStats::default());
        }
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_call() {
        let model = wrapping_model();
        let pipeline = SummaryPipeline::new(model.clone());
        let error = pipeline
            .run("  \n ", &PipelineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(error, PipelineError::EmptyInput));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn invalid_chunk_settings_are_rejected() {
        let pipeline = SummaryPipeline::new(wrapping_model());
        let config = config(ChunkSettings::new(10, 10), ChunkSettings::new(0, 0));
        let error = pipeline.run("some text", &config).await.unwrap_err();
        assert!(matches!(error, PipelineError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn map_failure_aborts_the_run() {
        let model = Arc::new(ScriptedModel::new(|request| {
            if request.prompt.starts_with("MAP ") {
                (
                    Duration::ZERO,
                    Err(ModelError::InvalidCredentials("bad key".into())),
                )
            } else {
                (Duration::ZERO, Ok("unreachable".into()))
            }
        }));
        let pipeline = SummaryPipeline::new(model.clone());
        let config = config(ChunkSettings::new(100, 0), ChunkSettings::new(0, 0));

        let error = pipeline.run("meeting notes", &config).await.unwrap_err();

        assert!(matches!(
            error,
            PipelineError::SummarizationFailure {
                sequence_index: 0,
                source: ModelError::InvalidCredentials(_),
                ..
            }
        ));
        assert!(
            model
                .requests()
                .iter()
                .all(|request| !request.prompt.starts_with("COMBINE"))
        );
    }

    #[tokio::test]
    async fn slow_runs_time_out() {
        let model = Arc::new(ScriptedModel::new(|_| {
            (Duration::from_secs(5), Ok("too late".into()))
        }));
        let pipeline =
            SummaryPipeline::new(model).with_timeout(Some(Duration::from_millis(20)));
        let config = config(ChunkSettings::new(100, 0), ChunkSettings::new(0, 0));

        let error = pipeline.run("meeting notes", &config).await.unwrap_err();
        assert!(matches!(
            error,
            PipelineError::Timeout(limit) if limit == Duration::from_millis(20)
        ));
    }

    #[tokio::test]
    async fn concurrency_limit_applies_across_both_paths() {
        let model = Arc::new(ScriptedModel::new(|request| {
            (Duration::from_millis(5), Ok(format!("s{}", request.prompt.len())))
        }));
        let pipeline = SummaryPipeline::new(model.clone()).with_max_concurrent_calls(2);
        let config = config(ChunkSettings::new(3, 0), ChunkSettings::new(5, 0));
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";

        pipeline.run(text, &config).await.unwrap();

        assert!(model.peak_in_flight() <= 2);
    }

    #[test]
    fn placeholder_names_model_and_length() {
        let summary = placeholder_summary("gpt-5-mini", "héllo");
        assert!(summary.contains("gpt-5-mini"));
        assert!(summary.contains("5 characters"));
    }
}
