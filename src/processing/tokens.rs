//! Token counting shared by the splitter and the reduce stage.
//!
//! Both stages must measure text the same way, otherwise chunks sized by the splitter could be
//! judged over budget by reduce. A [`TokenCounter`] is built once per run and handed to both.
//! `tiktoken-rs` encodings are used for every model; ids that `tiktoken` does not know (most
//! OpenRouter models) fall back to `cl100k_base`.

use crate::processing::types::PipelineError;
use anyhow::Error as TokenizerError;
use std::fmt;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

type CountFn = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Deterministic text-to-token measurement for one model family.
#[derive(Clone)]
pub struct TokenCounter {
    count: CountFn,
    label: Arc<str>,
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCounter")
            .field("label", &self.label)
            .finish()
    }
}

impl TokenCounter {
    /// Build a `tiktoken` counter for the given model id.
    pub fn for_model(model: &str) -> Result<Self, PipelineError> {
        let normalized = model.trim();
        let target = if normalized.is_empty() {
            "cl100k_base"
        } else {
            normalized
        };
        let encoding = resolve_encoding(target).map_err(|source| PipelineError::Tokenizer {
            model: target.to_string(),
            source,
        })?;
        let encoding = Arc::new(encoding);
        Ok(Self {
            count: Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len()),
            label: Arc::from(target),
        })
    }

    /// Counts whitespace-separated words; whitespace alone counts as zero.
    pub fn whitespace() -> Self {
        Self::from_fn("whitespace", |segment| segment.split_whitespace().count())
    }

    /// Wrap an arbitrary counting function.
    pub fn from_fn<F>(label: &str, count: F) -> Self
    where
        F: Fn(&str) -> usize + Send + Sync + 'static,
    {
        Self {
            count: Arc::new(count),
            label: Arc::from(label),
        }
    }

    /// Number of tokens in `text`.
    pub fn count(&self, text: &str) -> usize {
        (self.count)(text)
    }

    /// Name of the encoding or counter in use.
    pub fn label(&self) -> &str {
        &self.label
    }
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            match encoding_from_name(model) {
                Some(candidate) => candidate,
                None => {
                    tracing::debug!(model, "Using 'cl100k_base' encoding for token counting");
                    cl100k_base()
                }
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_counter_counts_words() {
        let counter = TokenCounter::whitespace();
        assert_eq!(counter.count("one two  three"), 3);
        assert_eq!(counter.count(" "), 0);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn unknown_models_fall_back_to_cl100k() {
        let fallback = TokenCounter::for_model("google/gemma-3-27b-it:free").expect("counter");
        let reference = TokenCounter::for_model("cl100k_base").expect("counter");
        let text = "The quick brown fox jumps over the lazy dog.";
        assert_eq!(fallback.count(text), reference.count(text));
        assert!(fallback.count(text) > 0);
    }

    #[test]
    fn counting_is_monotonic_when_appending() {
        let counter = TokenCounter::for_model("gpt-4o").expect("counter");
        let mut text = String::new();
        let mut previous = 0;
        for word in ["Meeting", " notes", " for", " the", " quarterly", " review."] {
            text.push_str(word);
            let current = counter.count(&text);
            assert!(current >= previous);
            previous = current;
        }
    }
}
