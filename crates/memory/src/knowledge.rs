//! Keyword retriever over a directory of text documents.
//!
//! Documents are split into paragraphs at blank lines. A query is scored
//! against each paragraph by keyword occurrences, normalised by paragraph
//! length so long passages don't win by size alone.

use async_trait::async_trait;
use std::path::Path;
use steward_core::collaborator::{KnowledgeChunk, KnowledgeRetriever};
use steward_core::error::RetrievalError;
use tracing::{debug, warn};

const MIN_TERM_CHARS: usize = 3;

#[derive(Debug, Clone)]
struct Passage {
    source: String,
    content: String,
    lowered: String,
}

pub struct KeywordRetriever {
    passages: Vec<Passage>,
}

impl KeywordRetriever {
    /// Index `(source, text)` documents.
    pub fn from_documents<I, S, T>(documents: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: AsRef<str>,
    {
        let mut passages = Vec::new();
        for (source, text) in documents {
            let source = source.into();
            for paragraph in text.as_ref().split("\n\n") {
                let content = paragraph.trim();
                if content.is_empty() {
                    continue;
                }
                passages.push(Passage {
                    source: source.clone(),
                    content: content.to_string(),
                    lowered: content.to_lowercase(),
                });
            }
        }
        Self { passages }
    }

    /// Index every `.md` and `.txt` file directly under `dir`.
    pub fn from_directory(dir: &Path) -> Result<Self, RetrievalError> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            RetrievalError::Unavailable(format!("cannot read {}: {e}", dir.display()))
        })?;

        let mut documents = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let indexed = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("txt"));
            if !indexed || !path.is_file() {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(text) => documents.push((path.display().to_string(), text)),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable document"),
            }
        }
        documents.sort_by(|a, b| a.0.cmp(&b.0));

        let retriever = Self::from_documents(documents);
        debug!(path = %dir.display(), passages = retriever.len(), "Knowledge directory indexed");
        Ok(retriever)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS)
        .map(str::to_lowercase)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

#[async_trait]
impl KnowledgeRetriever for KeywordRetriever {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<KnowledgeChunk>, RetrievalError> {
        let terms = query_terms(query);
        if terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut results: Vec<KnowledgeChunk> = self
            .passages
            .iter()
            .filter_map(|p| {
                let occurrences: usize = terms.iter().map(|t| p.lowered.matches(t.as_str()).count()).sum();
                if occurrences == 0 {
                    return None;
                }
                let score = occurrences as f32 / (p.content.len() as f32 / 100.0).max(1.0);
                Some(KnowledgeChunk {
                    content: p.content.clone(),
                    source: p.source.clone(),
                    score,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }
}
