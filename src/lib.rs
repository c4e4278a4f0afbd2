pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod guard;
pub mod intent;
pub mod llm;
pub mod pipeline;
pub mod projection;
pub mod prompts;
pub mod refine;
pub mod schema_index;
