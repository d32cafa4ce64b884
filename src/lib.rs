#![deny(missing_docs)]

//! Core library for the MMSummary meeting-minutes summarizer.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Run history storage.
pub mod history;
/// Model-calling client abstraction and the chat completions adapter.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Summarization run metrics.
pub mod metrics;
/// Dual-path map-reduce summarization pipeline.
pub mod processing;
