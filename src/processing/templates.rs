//! Prompt templates with a fixed placeholder set.
//!
//! Two placeholders are recognised: `{content}` (required, exactly once) and `{language}`
//! (optional). Rendering is a single pass, so text substituted for `{content}` is never scanned
//! for placeholders again.

use crate::processing::tokens::TokenCounter;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Placeholder replaced by document text.
pub const CONTENT_PLACEHOLDER: &str = "{content}";
/// Placeholder replaced by the target language.
pub const LANGUAGE_PLACEHOLDER: &str = "{language}";

const MAP_FILE: &str = "map_template.txt";
const COLLAPSE_FILE: &str = "collapse_template.txt";
const COMBINE_FILE: &str = "reduce_template.txt";

const BUILTIN_MAP: &str = include_str!("../../template/map_template.txt");
const BUILTIN_COLLAPSE: &str = include_str!("../../template/collapse_template.txt");
const BUILTIN_COMBINE: &str = include_str!("../../template/reduce_template.txt");

/// Errors raised while loading or parsing templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template lacks the `{content}` placeholder.
    #[error("{name} template must contain the {{content}} placeholder")]
    MissingPlaceholder {
        /// Which template was rejected.
        name: String,
    },
    /// Template contains `{content}` more than once.
    #[error("{name} template must contain the {{content}} placeholder exactly once")]
    RepeatedPlaceholder {
        /// Which template was rejected.
        name: String,
    },
    /// Template file exists but could not be read.
    #[error("failed to read template {}: {source}", path.display())]
    Io {
        /// File we attempted to read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// A validated prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    /// Validate `source` and wrap it; `name` is used in error messages.
    pub fn parse(name: &str, source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();
        match source.matches(CONTENT_PLACEHOLDER).count() {
            0 => Err(TemplateError::MissingPlaceholder {
                name: name.to_string(),
            }),
            1 => Ok(Self { source }),
            _ => Err(TemplateError::RepeatedPlaceholder {
                name: name.to_string(),
            }),
        }
    }

    /// Substitute `content` and `language` into the template.
    pub fn render(&self, content: &str, language: &str) -> String {
        let (before, after) = self
            .source
            .split_once(CONTENT_PLACEHOLDER)
            .unwrap_or((self.source.as_str(), ""));
        let mut rendered = before.replace(LANGUAGE_PLACEHOLDER, language);
        rendered.push_str(content);
        rendered.push_str(&after.replace(LANGUAGE_PLACEHOLDER, language));
        rendered
    }

    /// Tokens spent on the template text itself, excluding content.
    pub fn overhead(&self, counter: &TokenCounter, language: &str) -> usize {
        counter.count(&self.render("", language))
    }

    /// Raw template text.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Map, collapse, and combine templates used by one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSet {
    /// Applied to each chunk during the map stage.
    pub map: PromptTemplate,
    /// Applied to each group during a collapse round.
    pub collapse: PromptTemplate,
    /// Applied once to produce the final summary.
    pub combine: PromptTemplate,
}

impl TemplateSet {
    /// Templates compiled into the binary.
    pub fn builtin() -> Self {
        Self {
            map: PromptTemplate {
                source: BUILTIN_MAP.to_string(),
            },
            collapse: PromptTemplate {
                source: BUILTIN_COLLAPSE.to_string(),
            },
            combine: PromptTemplate {
                source: BUILTIN_COMBINE.to_string(),
            },
        }
    }

    /// Load templates from `dir`, using the built-in text for any file that is absent.
    pub fn load(dir: &Path) -> Result<Self, TemplateError> {
        Ok(Self {
            map: load_one(dir, MAP_FILE, "map", BUILTIN_MAP)?,
            collapse: load_one(dir, COLLAPSE_FILE, "collapse", BUILTIN_COLLAPSE)?,
            combine: load_one(dir, COMBINE_FILE, "combine", BUILTIN_COMBINE)?,
        })
    }

    /// Replace the map and/or combine template with caller-supplied text.
    pub fn with_overrides(
        mut self,
        map: Option<&str>,
        combine: Option<&str>,
    ) -> Result<Self, TemplateError> {
        if let Some(text) = map.filter(|text| !text.trim().is_empty()) {
            self.map = PromptTemplate::parse("map", text)?;
        }
        if let Some(text) = combine.filter(|text| !text.trim().is_empty()) {
            self.combine = PromptTemplate::parse("combine", text)?;
        }
        Ok(self)
    }
}

fn load_one(
    dir: &Path,
    file: &str,
    name: &str,
    builtin: &str,
) -> Result<PromptTemplate, TemplateError> {
    let path = dir.join(file);
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            tracing::debug!(path = %path.display(), "Loaded prompt template");
            PromptTemplate::parse(name, text)
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Template file absent; using built-in text");
            PromptTemplate::parse(name, builtin)
        }
        Err(source) => Err(TemplateError::Io { path, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_both_placeholders() {
        let template =
            PromptTemplate::parse("map", "Summarize in {language}:\n{content}\n({language})")
                .unwrap();
        assert_eq!(
            template.render("the notes", "English"),
            "Summarize in English:\nthe notes\n(English)"
        );
    }

    #[test]
    fn substituted_content_is_not_rescanned() {
        let template = PromptTemplate::parse("map", "[{content}]").unwrap();
        assert_eq!(
            template.render("literal {language} text", "French"),
            "[literal {language} text]"
        );
    }

    #[test]
    fn missing_or_repeated_content_placeholder_is_rejected() {
        assert!(matches!(
            PromptTemplate::parse("map", "no placeholder here"),
            Err(TemplateError::MissingPlaceholder { name }) if name == "map"
        ));
        assert!(matches!(
            PromptTemplate::parse("combine", "{content} and {content}"),
            Err(TemplateError::RepeatedPlaceholder { .. })
        ));
    }

    #[test]
    fn builtin_templates_are_valid() {
        let set = TemplateSet::builtin();
        for template in [&set.map, &set.collapse, &set.combine] {
            assert!(PromptTemplate::parse("builtin", template.as_str()).is_ok());
            assert!(template.as_str().contains(LANGUAGE_PLACEHOLDER));
        }
    }

    #[test]
    fn overhead_excludes_content() {
        let counter = TokenCounter::whitespace();
        let template = PromptTemplate::parse("combine", "Combine these notes: {content}").unwrap();
        assert_eq!(template.overhead(&counter, "English"), 3);
    }

    #[test]
    fn load_prefers_files_and_falls_back_to_builtin() {
        let dir =
            std::env::temp_dir().join(format!("mmsummary-templates-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MAP_FILE), "Custom map {content}").unwrap();

        let set = TemplateSet::load(&dir).unwrap();
        assert_eq!(set.map.as_str(), "Custom map {content}");
        assert_eq!(set.combine, TemplateSet::builtin().combine);

        std::fs::write(dir.join(COLLAPSE_FILE), "no placeholder").unwrap();
        assert!(matches!(
            TemplateSet::load(&dir),
            Err(TemplateError::MissingPlaceholder { name }) if name == "collapse"
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn overrides_replace_map_and_combine_only() {
        let set = TemplateSet::builtin()
            .with_overrides(Some("M {content}"), Some("C {content}"))
            .unwrap();
        assert_eq!(set.map.as_str(), "M {content}");
        assert_eq!(set.combine.as_str(), "C {content}");
        assert_eq!(set.collapse, TemplateSet::builtin().collapse);

        assert!(TemplateSet::builtin().with_overrides(Some("bad"), None).is_err());
        assert_eq!(
            TemplateSet::builtin().with_overrides(Some("  "), None).unwrap(),
            TemplateSet::builtin()
        );
    }
}
