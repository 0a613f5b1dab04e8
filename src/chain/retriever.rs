//! Knowledge base retrieval.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::RetrieverError;

/// Shortest term that takes part in matching.
const MIN_TERM_LEN: usize = 3;

/// A unit of retrievable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    /// Unique identifier.
    pub id: String,
    /// Text handed to the model as context.
    pub content: String,
    /// Where the text came from, if known.
    pub source: Option<String>,
}

impl Document {
    /// Create a document without a source.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            source: None,
        }
    }
}

/// Finds the documents most relevant to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return at most `top_k` documents, best first.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Document>, RetrieverError>;
}

#[derive(Debug)]
struct IndexedDocument {
    document: Document,
    terms: HashSet<String>,
}

/// Concurrent in-memory keyword retriever.
#[derive(Debug, Default)]
pub struct InMemoryRetriever {
    documents: DashMap<String, IndexedDocument>,
}

impl InMemoryRetriever {
    /// Create an empty knowledge base.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a document.
    pub fn insert(&self, document: Document) {
        let terms = terms(&document.content);
        self.documents
            .insert(document.id.clone(), IndexedDocument { document, terms });
    }

    /// Number of documents held.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the knowledge base is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Load every `.txt` and `.md` file in `dir` (non-recursive).
    ///
    /// Documents are keyed by file name. Files that are not valid UTF-8 are
    /// skipped. Returns the number loaded.
    pub async fn load_dir(&self, dir: impl AsRef<Path>) -> Result<usize, RetrieverError> {
        let dir = dir.as_ref();
        let load_err = |path: &Path, source| RetrieverError::Load {
            path: path.display().to_string(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| load_err(dir, e))?;

        let mut loaded = 0;
        while let Some(entry) = entries.next_entry().await.map_err(|e| load_err(dir, e))? {
            let path = entry.path();
            let supported = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| matches!(ext, "txt" | "md"));
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| load_err(path.as_path(), e))?;
            let is_file = if file_type.is_symlink() {
                tokio::fs::metadata(&path)
                    .await
                    .is_ok_and(|meta| meta.is_file())
            } else {
                file_type.is_file()
            };
            if !supported || !is_file {
                continue;
            }

            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    warn!(path = %path.display(), "Skipping document that is not valid UTF-8");
                    continue;
                }
                Err(e) => return Err(load_err(path.as_path(), e)),
            };
            let id = entry.file_name().to_string_lossy().into_owned();

            debug!(id = %id, chars = content.len(), "Loaded document");
            self.insert(Document {
                id,
                content,
                source: Some(path.display().to_string()),
            });
            loaded += 1;
        }

        info!(dir = %dir.display(), loaded, "Knowledge base loaded");
        Ok(loaded)
    }

    fn rank(&self, query: &str, top_k: usize) -> Vec<Document> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, Document)> = self
            .documents
            .iter()
            .filter_map(|entry| {
                let score = query_terms
                    .iter()
                    .filter(|term| entry.terms.contains(*term))
                    .count();
                (score > 0).then(|| (score, entry.document.clone()))
            })
            .collect();

        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score.cmp(a_score).then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        scored.into_iter().map(|(_, document)| document).collect()
    }
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Document>, RetrieverError> {
        Ok(self.rank(query, top_k))
    }
}

/// Lowercase alphanumeric terms of at least `MIN_TERM_LEN` characters.
fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| term.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .collect()
}
