//! Budget-aware packing of ranked documents into a prompt.

use super::document::RetrievedDocument;
use crate::config::RetrievalConfig;
use crate::error::{GatewayError, Result};
use minijinja::{Environment, context};

/// Smallest remaining budget, in characters, worth filling with a truncated document.
pub const MIN_TRUNCATED_CHARS: usize = 100;

pub const TRUNCATION_MARKER: &str = "...\n[truncated]";

pub const DEFAULT_PREAMBLE: &str = "Answer the question using only the information in the \
documents below. Cite documents as [Document N]. If the documents do not contain the answer, \
say so.";

pub const DEFAULT_TEMPLATE: &str = "{{ preamble }}
{% if context %}
Context:
{{ context }}
{% endif %}
Question: {{ question }}

Answer:";

/// Documents packed into the context, and the rendered prompt around them.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltContext {
    pub prompt: String,
    /// The packed context block on its own.
    pub context: String,
    /// Documents that made it into the context, in order. A truncated
    /// document counts as used.
    pub used: Vec<RetrievedDocument>,
    pub truncated: bool,
}

/// Packs ranked documents greedily into a character budget.
///
/// Each document is a `[Document N]` header plus its content. The first
/// document that does not fit is cut down to the remaining budget, with a
/// truncation marker, if at least [`MIN_TRUNCATED_CHARS`] remain; packing
/// stops there either way. The context block never exceeds the budget.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBuilder {
    max_context_length: usize,
    preamble: String,
    template: String,
}

impl ContextBuilder {
    pub fn new(max_context_length: usize) -> Self {
        Self {
            max_context_length,
            preamble: DEFAULT_PREAMBLE.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.max_context_length)
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    /// Replaces the prompt template.
    ///
    /// The template sees `preamble`, `context` and `question`. It is compiled
    /// here so syntax errors surface at construction.
    pub fn with_template(mut self, template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        Environment::new()
            .template_from_str(&template)
            .map_err(|e| GatewayError::Config(format!("invalid prompt template: {e}")))?;
        self.template = template;
        Ok(self)
    }

    pub fn max_context_length(&self) -> usize {
        self.max_context_length
    }

    /// Packs `documents` into a context block.
    ///
    /// Returns the block, the documents used and whether the last one was cut.
    pub fn pack(&self, documents: &[RetrievedDocument]) -> (String, Vec<RetrievedDocument>, bool) {
        let mut context = String::new();
        let mut used_chars = 0;
        let mut used = Vec::new();
        let mut truncated = false;

        for (i, document) in documents.iter().enumerate() {
            let section = format_section(i + 1, document);
            let section_chars = section.chars().count();

            if used_chars + section_chars > self.max_context_length {
                let remaining = self.max_context_length - used_chars;
                let header = section_header(i + 1, document);
                // The header and marker are kept whole; only the content is cut.
                let content_room = remaining
                    .saturating_sub(header.chars().count() + TRUNCATION_MARKER.chars().count());
                if remaining >= MIN_TRUNCATED_CHARS && content_room > 0 {
                    context.push_str(&header);
                    context.extend(document.content.trim().chars().take(content_room));
                    context.push_str(TRUNCATION_MARKER);
                    used.push(document.clone());
                    truncated = true;
                }
                break;
            }

            context.push_str(&section);
            used_chars += section_chars;
            used.push(document.clone());
        }

        tracing::debug!(
            offered = documents.len(),
            used = used.len(),
            truncated,
            budget = self.max_context_length,
            "packed context"
        );
        (context.trim_end().to_string(), used, truncated)
    }

    /// Packs `documents` and renders the full prompt for `question`.
    pub fn build(&self, question: &str, documents: &[RetrievedDocument]) -> Result<BuiltContext> {
        let (context, used, truncated) = self.pack(documents);

        let prompt = Environment::new()
            .render_str(
                &self.template,
                context! {
                    preamble => self.preamble,
                    context => context,
                    question => question.trim(),
                },
            )
            .map_err(|e| GatewayError::Config(format!("failed to render prompt template: {e}")))?;

        Ok(BuiltContext {
            prompt,
            context,
            used,
            truncated,
        })
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

fn section_header(number: usize, document: &RetrievedDocument) -> String {
    let score = document
        .score
        .map(|s| format!(", Score: {s:.2}"))
        .unwrap_or_default();
    format!("[Document {number}] (Source: {}{score})\n", document.title())
}

fn format_section(number: usize, document: &RetrievedDocument) -> String {
    format!(
        "{}{}\n\n",
        section_header(number, document),
        document.content.trim()
    )
}
