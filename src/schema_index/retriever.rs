//! Semantic table retriever
//!
//! Embeds table descriptions once at startup and answers "which tables might
//! this question be about" by nearest-neighbor search. Absence of qualifying
//! neighbors is a valid "no confident match" outcome, not an error.

use crate::catalog::TableCatalog;
use crate::error::Result;
use crate::schema_index::vector_store::{Document, InMemoryVectorStore};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::info;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.4;

/// External sentence-embedding capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

pub struct TableRetriever {
    embedder: Box<dyn Embedder>,
    store: InMemoryVectorStore,
    threshold: f32,
}

impl TableRetriever {
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self {
            embedder,
            store: InMemoryVectorStore::new(),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Embed every catalog table's description text. Tables without a
    /// description fall back to a rendered name+columns line so every table
    /// stays retrievable.
    pub async fn index_catalog(&mut self, catalog: &TableCatalog) -> Result<()> {
        for table in catalog.all_tables() {
            let text = match &table.description {
                Some(desc) => desc.clone(),
                None => format!(
                    "{} in module {} with columns {}",
                    table.qualified_name(),
                    table.module,
                    table.column_names().join(", ")
                ),
            };
            let embedding = self.embedder.embed(&text).await?;
            self.store.add_document(Document {
                id: format!("table:{}:{}", table.module, table.qualified_name()),
                text,
                table_name: table.table_name.clone(),
                embedding,
            });
        }
        info!("semantic index built: {} documents", self.store.len());
        Ok(())
    }

    /// Ordered table names whose similarity clears the threshold, deduplicated
    /// preserving rank order. May be empty.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<String>> {
        let query_embedding = self.embedder.embed(question).await?;
        let results = self.store.search(&query_embedding, top_k);

        let mut seen = HashSet::new();
        let mut tables = Vec::new();
        for result in results {
            if result.score < self.threshold {
                continue;
            }
            if seen.insert(result.document.table_name.clone()) {
                tables.push(result.document.table_name);
            }
        }
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDescriptor, TableDescriptor};

    /// Deterministic embedder: maps known phrases onto fixed unit vectors.
    struct PhraseEmbedder;

    #[async_trait]
    impl Embedder for PhraseEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let lower = text.to_lowercase();
            if lower.contains("order") {
                Ok(vec![1.0, 0.0, 0.0])
            } else if lower.contains("invoice") {
                Ok(vec![0.0, 1.0, 0.0])
            } else {
                Ok(vec![0.0, 0.0, 1.0])
            }
        }
    }

    fn desc(module: &str, table: &str, description: &str) -> TableDescriptor {
        TableDescriptor {
            module: module.to_string(),
            schema: "dbo".to_string(),
            table_name: table.to_string(),
            columns: vec![ColumnDescriptor {
                name: "id".to_string(),
                data_type: None,
            }],
            description: Some(description.to_string()),
        }
    }

    #[tokio::test]
    async fn retrieves_matching_tables_above_threshold() {
        let catalog = TableCatalog::from_descriptors(vec![
            desc("Sales_Order", "T_Ord_Main", "sales order headers"),
            desc("Invoice", "T_Invoice_Main", "invoice headers"),
        ])
        .unwrap();

        let mut retriever = TableRetriever::new(Box::new(PhraseEmbedder));
        retriever.index_catalog(&catalog).await.unwrap();

        let tables = retriever
            .retrieve("pending order count", DEFAULT_TOP_K)
            .await
            .unwrap();
        assert_eq!(tables, vec!["T_Ord_Main".to_string()]);
    }

    #[tokio::test]
    async fn below_threshold_yields_empty_list_not_error() {
        let catalog = TableCatalog::from_descriptors(vec![desc(
            "Sales_Order",
            "T_Ord_Main",
            "sales order headers",
        )])
        .unwrap();

        let mut retriever = TableRetriever::new(Box::new(PhraseEmbedder));
        retriever.index_catalog(&catalog).await.unwrap();

        // question embeds orthogonally to every indexed description
        let tables = retriever
            .retrieve("unrelated topic", DEFAULT_TOP_K)
            .await
            .unwrap();
        assert!(tables.is_empty());
    }

    #[tokio::test]
    async fn duplicate_table_names_are_deduplicated_in_rank_order() {
        let catalog = TableCatalog::from_descriptors(vec![
            desc("Sales_Order", "T_Ord_Main", "order headers"),
            desc("Dispatch", "T_Ord_Main", "order dispatch view"),
            desc("Invoice", "T_Invoice_Main", "invoice headers"),
        ])
        .unwrap();

        let mut retriever = TableRetriever::new(Box::new(PhraseEmbedder));
        retriever.index_catalog(&catalog).await.unwrap();

        let tables = retriever
            .retrieve("order status", DEFAULT_TOP_K)
            .await
            .unwrap();
        assert_eq!(tables, vec!["T_Ord_Main".to_string()]);
    }
}
