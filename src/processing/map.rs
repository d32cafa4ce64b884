//! Map stage: one independent summary per chunk.

use crate::processing::invoker::ModelInvoker;
use crate::processing::templates::PromptTemplate;
use crate::processing::types::{Chunk, PartialSummary, PipelineError};
use futures_util::future::try_join_all;

/// Per-call settings for the map stage.
#[derive(Debug, Clone, Copy)]
pub struct MapSettings<'a> {
    /// Template applied to every chunk.
    pub template: &'a PromptTemplate,
    /// Target language for `{language}`.
    pub language: &'a str,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token cap per call.
    pub max_output_tokens: u32,
}

/// Summarize every chunk of one path.
///
/// Calls run concurrently (bounded by the invoker); results come back in chunk order. The first
/// failure aborts the pass, drops the calls still in flight, and names the failing chunk.
pub async fn map_chunks(
    invoker: &ModelInvoker<'_>,
    chunks: &[Chunk],
    path_label: &str,
    settings: MapSettings<'_>,
) -> Result<Vec<PartialSummary>, PipelineError> {
    tracing::debug!(path = path_label, chunks = chunks.len(), "Starting map pass");
    let summaries = try_join_all(chunks.iter().map(|chunk| async move {
        let prompt = settings.template.render(&chunk.content, settings.language);
        let content = invoker
            .invoke(prompt, settings.temperature, settings.max_output_tokens)
            .await
            .map_err(|source| {
                tracing::warn!(
                    path = path_label,
                    sequence_index = chunk.sequence_index,
                    error = %source,
                    "Map call failed"
                );
                PipelineError::SummarizationFailure {
                    path: path_label.to_string(),
                    sequence_index: chunk.sequence_index,
                    source,
                }
            })?;
        Ok::<_, PipelineError>(PartialSummary {
            content,
            source_path_label: format!("{path_label}#{}", chunk.sequence_index),
        })
    }))
    .await?;
    tracing::debug!(path = path_label, summaries = summaries.len(), "Map pass complete");
    Ok(summaries)
}
