//! Rendering search results into a bounded prompt context.

use lore_core::RetrievalConfig;

use crate::models::RetrievalResult;

/// First line of every non-empty context.
pub const CONTEXT_LEAD_IN: &str = "The following information is from related documents:\n";

const ELLIPSIS: &str = "...";

/// Length limits for a rendered context, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    /// A document is only emitted while the rendered text plus its full chunk fits this
    pub max_total_chars: usize,
    /// Content shown per document before truncation
    pub max_document_chars: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_total_chars: 4000,
            max_document_chars: 500,
        }
    }
}

impl From<&RetrievalConfig> for ContextBudget {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            max_total_chars: config.context_max_chars,
            max_document_chars: config.document_max_chars,
        }
    }
}

/// A rendered context and how many documents it contains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedContext {
    /// Context text; empty when no document was emitted
    pub text: String,
    /// Number of documents emitted
    pub documents: usize,
}

impl RenderedContext {
    /// Whether there is no context to inject.
    pub fn is_empty(&self) -> bool {
        self.documents == 0
    }
}

impl ContextBudget {
    /// Render `results` in order until the budget is exhausted.
    pub fn render(&self, results: &[RetrievalResult]) -> RenderedContext {
        let mut text = String::from(CONTEXT_LEAD_IN);
        let mut rendered_chars = CONTEXT_LEAD_IN.chars().count();
        let mut documents = 0;

        for result in results {
            if result.chunk_text.is_empty() {
                continue;
            }
            if rendered_chars + result.chunk_text.chars().count() > self.max_total_chars {
                break;
            }

            let parts = [
                format!("Document {}:", documents + 1),
                format!("File name: {}", result.file_name),
                format!("Content: {}", self.excerpt(&result.chunk_text)),
                String::new(),
            ];
            for part in &parts {
                text.push('\n');
                text.push_str(part);
                rendered_chars += 1 + part.chars().count();
            }
            documents += 1;
        }

        if documents == 0 {
            return RenderedContext::default();
        }
        RenderedContext { text, documents }
    }

    fn excerpt(&self, content: &str) -> String {
        match content.char_indices().nth(self.max_document_chars) {
            Some((byte_offset, _)) => format!("{}{ELLIPSIS}", &content[..byte_offset]),
            None => content.to_owned(),
        }
    }
}

/// Render `results` with the default budget.
pub fn build_context(results: &[RetrievalResult]) -> RenderedContext {
    ContextBudget::default().render(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn result(text: &str, file_name: &str) -> RetrievalResult {
        RetrievalResult::new(
            "docs",
            0.0,
            Chunk {
                text: text.to_owned(),
                index: 0,
                source_file: file_name.to_owned(),
                source_key: String::new(),
                content_type: "text/plain".to_owned(),
                document_id: "doc".to_owned(),
                collection_id: "docs".to_owned(),
                created_at_ms: 0,
            },
        )
    }

    #[test]
    fn test_empty_results_render_nothing() {
        let rendered = build_context(&[]);
        assert_eq!(rendered.text, "");
        assert!(rendered.is_empty());
    }

    #[test]
    fn test_single_document_layout() {
        let rendered = build_context(&[result("Rust is a language.", "rust.md")]);
        assert_eq!(rendered.documents, 1);
        assert_eq!(
            rendered.text,
            "The following information is from related documents:\n\n\
             Document 1:\n\
             File name: rust.md\n\
             Content: Rust is a language.\n"
        );
    }

    #[test]
    fn test_long_content_is_truncated_with_ellipsis() {
        let rendered = build_context(&[result(&"a".repeat(800), "long.txt")]);
        let expected = format!("Content: {}...\n", "a".repeat(500));
        assert!(rendered.text.ends_with(&expected));
    }

    #[test]
    fn test_stops_when_budget_would_overflow() {
        let results: Vec<RetrievalResult> =
            (0..20).map(|_| result(&"b".repeat(1000), "doc.txt")).collect();
        let first = build_context(&results);
        let second = build_context(&results);

        assert_eq!(first.documents, 6);
        assert_eq!(first, second);
        assert!(first.text.contains("Document 6:"));
        assert!(!first.text.contains("Document 7:"));
    }

    #[test]
    fn test_skips_empty_chunks_and_unknown_names() {
        let rendered = build_context(&[result("", "empty.txt"), result("text", "")]);
        assert_eq!(rendered.documents, 1);
        assert!(rendered.text.contains("Document 1:\nFile name: Unknown\n"));
        assert!(!rendered.text.contains("empty.txt"));
    }

    #[test]
    fn test_oversized_first_document_yields_empty_context() {
        let rendered = build_context(&[result(&"c".repeat(4000), "big.txt")]);
        assert!(rendered.is_empty());
        assert_eq!(rendered.text, "");
    }
}
