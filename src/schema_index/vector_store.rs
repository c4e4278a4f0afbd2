//! In-memory vector store with cosine similarity search.

use std::collections::HashMap;

pub type Embedding = Vec<f32>;

/// Indexed table description.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub table_name: String,
    pub embedding: Embedding,
}

/// One search hit with its similarity score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub document: Document,
    pub score: f32,
}

/// Linear-scan store; the catalog is small enough that approximate indexes
/// would not pay for themselves.
#[derive(Default)]
pub struct InMemoryVectorStore {
    documents: HashMap<String, Document>,
    insertion_order: Vec<String>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&mut self, document: Document) {
        if !self.documents.contains_key(&document.id) {
            self.insertion_order.push(document.id.clone());
        }
        self.documents.insert(document.id.clone(), document);
    }

    /// Top-k documents by cosine similarity, descending. Ties keep insertion
    /// order, so results are deterministic.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = self
            .insertion_order
            .iter()
            .filter_map(|id| self.documents.get(id))
            .map(|doc| SearchResult {
                score: cosine_similarity(query_embedding, &doc.embedding),
                document: doc.clone(),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);
        results
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Cosine similarity; zero for mismatched dimensions or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
