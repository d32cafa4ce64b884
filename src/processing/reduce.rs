//! Reduce stage: recursive collapse-then-combine under a token budget.
//!
//! Each round measures the full combine prompt. If it fits `token_max`, one combine call
//! produces the final summary. Otherwise the documents are partitioned left to right into
//! groups whose collapse prompt fits the budget, every multi-document group is collapsed into a
//! single summary (single-document groups pass through untouched), and the round repeats.
//!
//! Every round that collapses anything shrinks the sequence, so the loop terminates unless a
//! document cannot fit on its own; that case fails with
//! [`PipelineError::TokenBudgetExceeded`] instead of looping or truncating.

use crate::processing::invoker::ModelInvoker;
use crate::processing::templates::PromptTemplate;
use crate::processing::tokens::TokenCounter;
use crate::processing::types::{PartialSummary, PipelineError, SummarizableUnit};
use futures_util::future::try_join_all;
use std::ops::Range;

/// Settings for one reduce invocation.
#[derive(Debug, Clone, Copy)]
pub struct ReduceSettings<'a> {
    /// Token ceiling for any single collapse or combine prompt.
    pub token_max: usize,
    /// Template for the final combine call.
    pub combine: &'a PromptTemplate,
    /// Template for intermediate collapse calls.
    pub collapse: &'a PromptTemplate,
    /// Text between documents inside the combine prompt.
    pub combine_separator: &'a str,
    /// Text between documents inside a collapse prompt.
    pub collapse_separator: &'a str,
    /// Target language for `{language}`.
    pub language: &'a str,
    /// Temperature for the combine call.
    pub combine_temperature: f32,
    /// Temperature for collapse calls.
    pub collapse_temperature: f32,
    /// Output token cap for collapse and combine calls.
    pub max_output_tokens: u32,
    /// Collapse rounds allowed before giving up.
    pub max_rounds: usize,
}

/// Final summary plus the number of collapse rounds it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceOutcome {
    /// Output of the combine call.
    pub summary: String,
    /// Collapse rounds executed before combining.
    pub rounds: usize,
}

/// Tokens of a prompt holding documents with `token_counts`, joined by a separator.
pub fn prompt_tokens(token_counts: &[usize], separator_tokens: usize, overhead: usize) -> usize {
    overhead
        + token_counts.iter().sum::<usize>()
        + separator_tokens * token_counts.len().saturating_sub(1)
}

/// Partition documents into consecutive groups whose prompt fits `token_max`.
///
/// Greedy left to right: a document joins the open group if the group still fits with it,
/// otherwise the group is closed and a new one starts. Order is preserved across and within
/// groups. Fails if any document cannot fit even alone.
pub fn partition_documents(
    token_counts: &[usize],
    separator_tokens: usize,
    overhead: usize,
    token_max: usize,
) -> Result<Vec<Range<usize>>, PipelineError> {
    let mut groups = Vec::new();
    let mut start = 0;
    let mut running = overhead;

    for (index, &tokens) in token_counts.iter().enumerate() {
        if overhead + tokens > token_max {
            return Err(PipelineError::TokenBudgetExceeded {
                index,
                tokens: overhead + tokens,
                token_max,
            });
        }
        let joiner = if index > start { separator_tokens } else { 0 };
        if running + joiner + tokens > token_max {
            groups.push(start..index);
            start = index;
            running = overhead + tokens;
        } else {
            running += joiner + tokens;
        }
    }
    if start < token_counts.len() {
        groups.push(start..token_counts.len());
    }
    Ok(groups)
}

/// Merge ordered documents into one summary.
pub async fn reduce(
    documents: Vec<SummarizableUnit>,
    counter: &TokenCounter,
    invoker: &ModelInvoker<'_>,
    settings: &ReduceSettings<'_>,
) -> Result<ReduceOutcome, PipelineError> {
    if documents.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let combine_overhead = settings.combine.overhead(counter, settings.language);
    let collapse_overhead = settings.collapse.overhead(counter, settings.language);
    let combine_separator_tokens = counter.count(settings.combine_separator);
    let collapse_separator_tokens = counter.count(settings.collapse_separator);
    let token_max = settings.token_max;

    let mut documents = documents;
    let mut rounds = 0;
    loop {
        let counts: Vec<usize> = documents
            .iter()
            .map(|document| counter.count(document.content()))
            .collect();
        let total = prompt_tokens(&counts, combine_separator_tokens, combine_overhead);
        tracing::debug!(
            round = rounds,
            documents = documents.len(),
            tokens = total,
            token_max,
            "Reduce round"
        );

        if total <= token_max {
            let prompt = settings.combine.render(
                &join_contents(&documents, settings.combine_separator),
                settings.language,
            );
            let summary = invoker
                .invoke(
                    prompt,
                    settings.combine_temperature,
                    settings.max_output_tokens,
                )
                .await?;
            tracing::info!(rounds, "Reduce complete");
            return Ok(ReduceOutcome { summary, rounds });
        }

        if documents.len() == 1 {
            return Err(PipelineError::TokenBudgetExceeded {
                index: 0,
                tokens: total,
                token_max,
            });
        }
        if rounds >= settings.max_rounds {
            return Err(PipelineError::CollapseLimitReached { rounds });
        }

        let groups = partition_documents(
            &counts,
            collapse_separator_tokens,
            collapse_overhead,
            token_max,
        )?;
        if groups.len() == documents.len() {
            return Err(PipelineError::ReduceStalled {
                documents: documents.len(),
                tokens: total,
                token_max,
            });
        }

        rounds += 1;
        tracing::debug!(
            round = rounds,
            groups = groups.len(),
            "Collapsing documents"
        );
        documents = collapse_round(&documents, groups, invoker, settings, rounds).await?;
    }
}

async fn collapse_round(
    documents: &[SummarizableUnit],
    groups: Vec<Range<usize>>,
    invoker: &ModelInvoker<'_>,
    settings: &ReduceSettings<'_>,
    round: usize,
) -> Result<Vec<SummarizableUnit>, PipelineError> {
    try_join_all(
        groups
            .into_iter()
            .enumerate()
            .map(|(group_index, range)| async move {
                let members = &documents[range];
                if let [single] = members {
                    return Ok(single.clone());
                }
                let prompt = settings.collapse.render(
                    &join_contents(members, settings.collapse_separator),
                    settings.language,
                );
                let content = invoker
                    .invoke(
                        prompt,
                        settings.collapse_temperature,
                        settings.max_output_tokens,
                    )
                    .await?;
                Ok::<_, PipelineError>(SummarizableUnit::Summary(PartialSummary {
                    content,
                    source_path_label: format!("collapse-{round}.{group_index}"),
                }))
            }),
    )
    .await
}

fn join_contents(documents: &[SummarizableUnit], separator: &str) -> String {
    documents
        .iter()
        .map(SummarizableUnit::content)
        .collect::<Vec<_>>()
        .join(separator)
}
