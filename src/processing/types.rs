//! Core data types and error definitions for the summarization pipeline.

use crate::llm::ModelError;
use crate::processing::templates::{TemplateError, TemplateSet};
use anyhow::Error as TokenizerError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Default model used when callers do not pick one.
pub const DEFAULT_MODEL: &str = "gpt-5-mini";
/// Default output language injected into `{language}` placeholders.
pub const DEFAULT_LANGUAGE: &str = "Traditional Chinese";

/// Errors produced by the split, map, and reduce stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input text was empty or whitespace only.
    #[error("input text is empty")]
    EmptyInput,
    /// Chunking, budget, or template settings are unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A map-stage model call failed; the whole map pass is aborted.
    #[error("summarization failed for {path} chunk #{sequence_index}: {source}")]
    SummarizationFailure {
        /// Label of the chunking path the chunk came from.
        path: String,
        /// Position of the failing chunk within its path.
        sequence_index: usize,
        /// Underlying provider failure.
        #[source]
        source: ModelError,
    },
    /// A single document does not fit the reduce budget on its own.
    #[error("document #{index} needs {tokens} tokens, exceeding token_max {token_max}")]
    TokenBudgetExceeded {
        /// Position of the offending document in the reduce input.
        index: usize,
        /// Token count of the document plus prompt overhead.
        tokens: usize,
        /// Configured reduce budget.
        token_max: usize,
    },
    /// No two adjacent documents fit together, so collapsing cannot make progress.
    #[error("reduce cannot make progress: {documents} documents totalling {tokens} tokens, token_max {token_max}")]
    ReduceStalled {
        /// Number of documents in the stalled round.
        documents: usize,
        /// Combined token count of the stalled round.
        tokens: usize,
        /// Configured reduce budget.
        token_max: usize,
    },
    /// Collapsing did not converge within the configured number of rounds.
    #[error("reduce did not converge after {rounds} collapse rounds")]
    CollapseLimitReached {
        /// Rounds executed before giving up.
        rounds: usize,
    },
    /// The run exceeded its wall-clock limit; in-flight calls were dropped.
    #[error("pipeline timed out after {0:?}")]
    Timeout(Duration),
    /// A reduce-stage model call failed.
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Model we attempted to load an encoding for.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

impl From<TemplateError> for PipelineError {
    fn from(error: TemplateError) -> Self {
        Self::InvalidConfiguration(error.to_string())
    }
}

/// One slice of the source document produced by the splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Chunk text, trimmed of surrounding whitespace.
    pub content: String,
    /// Token count of `content` under the run's tokenizer.
    pub token_count: usize,
    /// Position of the chunk within its split pass.
    pub sequence_index: usize,
}

/// Text produced by summarizing a chunk or collapsing a group of documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialSummary {
    /// Summary text returned by the model.
    pub content: String,
    /// Where the summary came from, e.g. `path-1#3` or `collapse-1.0`.
    pub source_path_label: String,
}

/// Anything the reduce stage can consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarizableUnit {
    /// A raw chunk (map stage skipped).
    Chunk(Chunk),
    /// A map or collapse output.
    Summary(PartialSummary),
}

impl SummarizableUnit {
    /// Text shared by every variant; the only field reduce looks at.
    pub fn content(&self) -> &str {
        match self {
            Self::Chunk(chunk) => &chunk.content,
            Self::Summary(summary) => &summary.content,
        }
    }
}

/// Chunk size and overlap for one split pass, measured in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkSettings {
    /// Maximum tokens per chunk; `0` disables the pass.
    pub chunk_size: usize,
    /// Tokens shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl ChunkSettings {
    /// Build settings for one pass.
    pub const fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Whether this pass produces any chunks at all.
    pub fn is_enabled(&self) -> bool {
        self.chunk_size > 0
    }

    /// Reject overlaps that would keep the splitter from advancing.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.is_enabled() && self.chunk_overlap >= self.chunk_size {
            return Err(PipelineError::InvalidConfiguration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Immutable settings for one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    /// Coarse-grained split pass.
    pub primary: ChunkSettings,
    /// Fine-grained split pass; `chunk_size = 0` disables it.
    pub secondary: ChunkSettings,
    /// Token ceiling for any single reduce-stage prompt.
    pub token_max: usize,
    /// Summarize chunks before reducing; when false raw chunks go straight to reduce.
    pub use_map: bool,
    /// Return a placeholder summary without calling any model.
    pub test_mode: bool,
    /// Model identifier for every call in the run.
    pub model: String,
    /// Target output language substituted into `{language}`.
    pub language: String,
    /// Temperature for map calls.
    pub map_temperature: f32,
    /// Temperature for the final combine call.
    pub reduce_temperature: f32,
    /// Temperature for intermediate collapse calls.
    pub collapse_temperature: f32,
    /// Output token cap for map calls.
    pub map_max_output_tokens: u32,
    /// Output token cap for collapse and combine calls.
    pub reduce_max_output_tokens: u32,
    /// Text placed between documents in the combine prompt.
    pub combine_separator: String,
    /// Text placed between documents in a collapse prompt.
    pub collapse_separator: String,
    /// Upper bound on collapse rounds before giving up.
    pub max_collapse_rounds: usize,
    /// Prompt templates for map, collapse, and combine.
    pub templates: TemplateSet,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            primary: ChunkSettings::new(16000, 4000),
            secondary: ChunkSettings::new(8000, 0),
            token_max: 16000,
            use_map: true,
            test_mode: false,
            model: DEFAULT_MODEL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            map_temperature: 0.0,
            reduce_temperature: 0.0,
            collapse_temperature: 0.0,
            map_max_output_tokens: 1000,
            reduce_max_output_tokens: 4000,
            combine_separator: "\n\n".to_string(),
            collapse_separator: "\n\n".to_string(),
            max_collapse_rounds: 8,
            templates: TemplateSet::builtin(),
        }
    }
}

impl PipelineConfig {
    /// Check every numeric relationship the pipeline depends on.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.primary.validate()?;
        self.secondary.validate()?;
        if !self.primary.is_enabled() && !self.secondary.is_enabled() {
            return Err(PipelineError::InvalidConfiguration(
                "at least one chunk_size must be greater than zero".into(),
            ));
        }
        if self.token_max == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "token_max must be greater than zero".into(),
            ));
        }
        if self.max_collapse_rounds == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "max_collapse_rounds must be greater than zero".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(PipelineError::InvalidConfiguration(
                "model must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Counters describing how a run unfolded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Chunks produced by the primary pass.
    pub primary_chunks: usize,
    /// Chunks produced by the secondary pass.
    pub secondary_chunks: usize,
    /// Model calls issued across map, collapse, and combine.
    pub model_calls: usize,
    /// Collapse rounds executed before the final combine.
    pub collapse_rounds: usize,
}

/// Final output of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Final summary text.
    pub summary: String,
    /// Wall-clock duration in seconds.
    pub processing_time: f64,
    /// Run counters.
    pub stats: RunStats,
}

/// Caller-supplied options for one summarization request.
///
/// Defaults match the reference request schema; template overrides are raw text and validated
/// when the run configuration is built.
#[derive(Debug, Clone)]
pub struct SummarizeRequest {
    /// Document to summarize.
    pub text: String,
    /// Primary pass chunk size.
    pub chunk_size_1: usize,
    /// Primary pass overlap.
    pub chunk_overlap_1: usize,
    /// Secondary pass chunk size.
    pub chunk_size_2: usize,
    /// Secondary pass overlap.
    pub chunk_overlap_2: usize,
    /// Reduce budget.
    pub token_max: usize,
    /// Map-stage temperature.
    pub temperature: f32,
    /// Combine temperature.
    pub reduce_temperature: f32,
    /// Model identifier.
    pub model: String,
    /// Whether to run the map stage.
    pub use_map: bool,
    /// Placeholder mode: no model calls, no history.
    pub test_mode: bool,
    /// Optional map template override.
    pub map_template: Option<String>,
    /// Optional combine template override.
    pub reduce_template: Option<String>,
    /// Target output language.
    pub language: String,
    /// Collapse rounds allowed before the reduce stage gives up.
    pub max_collapse_rounds: usize,
}

impl Default for SummarizeRequest {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            text: String::new(),
            chunk_size_1: defaults.primary.chunk_size,
            chunk_overlap_1: defaults.primary.chunk_overlap,
            chunk_size_2: defaults.secondary.chunk_size,
            chunk_overlap_2: defaults.secondary.chunk_overlap,
            token_max: defaults.token_max,
            temperature: defaults.map_temperature,
            reduce_temperature: defaults.reduce_temperature,
            model: defaults.model,
            use_map: defaults.use_map,
            test_mode: defaults.test_mode,
            map_template: None,
            reduce_template: None,
            language: defaults.language,
            max_collapse_rounds: defaults.max_collapse_rounds,
        }
    }
}

/// Result of a summarization request handled by the service layer.
#[derive(Debug, Clone)]
pub struct SummarizeOutcome {
    /// Final summary text.
    pub summary: String,
    /// Wall-clock duration in seconds.
    pub processing_time: f64,
    /// Identifier of the persisted history record, if one was written.
    pub history_id: Option<String>,
    /// Run counters.
    pub stats: RunStats,
}
