//! Refinement Controller
//!
//! On an execution failure the caller may resubmit once: the failing SQL,
//! the exact error text, and the same schema go back through a dedicated
//! prompt and the identical response-guard path as primary generation.
//! Single attempt, no automatic convergence loop.

use crate::error::Result;
use crate::guard::SqlContract;
use crate::llm::GeneratorClient;
use crate::prompts;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Outcome of one refinement attempt, with observables for the caller.
#[derive(Debug, Clone)]
pub struct RefinementOutcome {
    pub contract: SqlContract,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub latency_ms: u64,
}

impl RefinementOutcome {
    /// A refinement that produced nothing usable: the caller surfaces this as
    /// final failure rather than retrying.
    pub fn is_exhausted(&self) -> bool {
        self.contract.query.trim().is_empty() || self.contract.confidence <= 0.0
    }
}

pub struct RefinementController {
    generator: Arc<dyn GeneratorClient>,
}

impl RefinementController {
    pub fn new(generator: Arc<dyn GeneratorClient>) -> Self {
        Self { generator }
    }

    pub async fn refine(
        &self,
        failed_sql: &str,
        error_message: &str,
        schema_text: &str,
        model: &str,
    ) -> Result<RefinementOutcome> {
        let prompt = prompts::build_refine_prompt(failed_sql, error_message, schema_text);
        let started = Instant::now();
        let response = self.generator.generate(&prompt, model).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let contract = SqlContract::extract_or_fallback(&response.raw_text);
        info!(
            "refinement attempt finished: confidence {:.2}, {} ms",
            contract.confidence, latency_ms
        );

        Ok(RefinementOutcome {
            contract,
            tokens_in: response.tokens_in,
            tokens_out: response.tokens_out,
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::GeneratorResponse;
    use async_trait::async_trait;

    struct CannedGenerator {
        reply: String,
        last_prompt: std::sync::Mutex<String>,
    }

    #[async_trait]
    impl GeneratorClient for CannedGenerator {
        async fn generate(&self, prompt: &str, _model: &str) -> Result<GeneratorResponse> {
            *self.last_prompt.lock().unwrap() = prompt.to_string();
            Ok(GeneratorResponse {
                raw_text: self.reply.clone(),
                tokens_in: 120,
                tokens_out: 30,
            })
        }
    }

    #[tokio::test]
    async fn refinement_compiles_failing_context_into_prompt() {
        let generator = Arc::new(CannedGenerator {
            reply: r#"{"query": "SELECT ord_id FROM dbo.T_Ord_Main", "confidence": 0.8}"#
                .to_string(),
            last_prompt: std::sync::Mutex::new(String::new()),
        });
        let controller = RefinementController::new(generator.clone());

        let outcome = controller
            .refine(
                "SELECT bad_col FROM dbo.T_Ord_Main",
                "Invalid column name 'bad_col'",
                "dbo.T_Ord_Main (ord_id)",
                "llama3.2:latest",
            )
            .await
            .unwrap();

        assert!(!outcome.is_exhausted());
        assert_eq!(outcome.contract.query, "SELECT ord_id FROM dbo.T_Ord_Main");
        assert_eq!(outcome.tokens_in, 120);

        let prompt = generator.last_prompt.lock().unwrap().clone();
        assert!(prompt.contains("bad_col"));
        assert!(prompt.contains("Invalid column name 'bad_col'"));
    }

    #[tokio::test]
    async fn malformed_refinement_reply_is_exhausted_fallback() {
        let generator = Arc::new(CannedGenerator {
            reply: "sorry, I cannot fix that".to_string(),
            last_prompt: std::sync::Mutex::new(String::new()),
        });
        let controller = RefinementController::new(generator);

        let outcome = controller
            .refine("SELECT 1", "boom", "dbo.T_Ord_Main (ord_id)", "m")
            .await
            .unwrap();
        assert!(outcome.is_exhausted());
        assert_eq!(outcome.contract, SqlContract::fallback());
    }
}
