//! Semantic schema index
//!
//! Embedding-based retrieval over table descriptions. A separate retrieval
//! surface; it does not gate the keyword-driven SQL generation flow.

pub mod retriever;
pub mod vector_store;

pub use retriever::{Embedder, TableRetriever};
pub use vector_store::{Document, InMemoryVectorStore, SearchResult};
