//! Summarization pipeline: token counting, chunking, map, reduce, and orchestration.

pub mod chunking;
mod invoker;
pub mod map;
pub mod pipeline;
pub mod reduce;
mod service;
pub mod templates;
#[cfg(test)]
pub(crate) mod test_support;
pub mod tokens;
pub mod types;

pub use invoker::ModelInvoker;
pub use pipeline::{SummaryPipeline, placeholder_summary};
pub use service::{ServiceError, SummaryApi, SummaryService};
pub use templates::{PromptTemplate, TemplateError, TemplateSet};
pub use tokens::TokenCounter;
pub use types::{
    Chunk, ChunkSettings, DEFAULT_LANGUAGE, DEFAULT_MODEL, PartialSummary, PipelineConfig,
    PipelineError, RunResult, RunStats, SummarizableUnit, SummarizeOutcome, SummarizeRequest,
};
