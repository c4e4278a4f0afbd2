//! Query pipeline
//!
//! Request-scoped orchestrator: question -> module resolution -> schema
//! projection -> prompt -> generator -> response guard -> (executor |
//! refinement) -> optional insight. Holds only read-only shared state; every
//! request builds and discards its own intermediates. Each operation returns
//! latency and token counters so the transport layer can log them - the
//! pipeline itself performs no logging I/O beyond tracing events.

use crate::catalog::{TableCatalog, TableDescriptor};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::executor::{DatabaseClient, ExecutionResult, QueryExecutor};
use crate::guard::{self, InsightContract, SqlContract};
use crate::intent::IntentParser;
use crate::llm::{GeneratorClient, GeneratorResponse};
use crate::projection;
use crate::prompts;
use crate::refine::RefinementController;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// One generated (and guarded) SQL statement with its observables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlGeneration {
    pub sql: String,
    pub modules: Vec<String>,
    pub schema_text: String,
    pub primary_table: TableDescriptor,
    pub confidence: f64,
    /// True when the deterministic safety fallback replaced the generator's
    /// candidate
    pub used_fallback: bool,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub latency_ms: u64,
}

/// Structured insight over one execution result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightReport {
    pub insight: String,
    pub greeting: String,
    pub suggestions: Vec<String>,
    pub evidence: Vec<String>,
    pub confidence: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub latency_ms: u64,
}

/// A successful refinement with its observables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinedSql {
    pub sql: String,
    pub confidence: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub latency_ms: u64,
}

/// Full question-to-insight run, bundling every stage's observables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub generation: SqlGeneration,
    pub execution: ExecutionResult,
    /// Present when the first execution failed and a refinement ran
    pub refined: Option<RefinedSql>,
    pub insight: Option<InsightReport>,
}

pub struct QueryPipeline {
    catalog: Arc<TableCatalog>,
    intent: IntentParser,
    generator: Arc<dyn GeneratorClient>,
    executor: QueryExecutor,
    refiner: RefinementController,
    call_timeout: Duration,
}

impl QueryPipeline {
    pub fn new(
        catalog: Arc<TableCatalog>,
        generator: Arc<dyn GeneratorClient>,
        db: Arc<dyn DatabaseClient>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            catalog,
            intent: IntentParser::new(),
            generator: generator.clone(),
            executor: QueryExecutor::new(db, config.max_rows, config.char_limit),
            refiner: RefinementController::new(generator),
            call_timeout: config.call_timeout,
        }
    }

    /// Generator call with the per-call deadline applied.
    async fn generate_with_deadline(&self, prompt: &str, model: &str) -> Result<GeneratorResponse> {
        tokio::time::timeout(self.call_timeout, self.generator.generate(prompt, model))
            .await
            .map_err(|_| {
                EngineError::Llm(format!(
                    "generator call timed out after {}s",
                    self.call_timeout.as_secs()
                ))
            })?
    }

    /// Turn a question into a guarded, executable SELECT statement.
    pub async fn generate_sql(&self, question: &str, model: &str) -> Result<SqlGeneration> {
        let started = Instant::now();

        let modules = self.intent.resolve(question)?;
        info!("resolved modules: {:?}", modules);

        let candidates = self.catalog.tables_for_modules(&modules);
        if candidates.is_empty() {
            return Err(EngineError::Catalog(format!(
                "no tables found for modules: {}",
                modules.join(", ")
            )));
        }

        let projection = projection::project(question, &candidates)?;

        let dated_question =
            prompts::augment_with_current_date(question, chrono::Utc::now().date_naive());
        let prompt = prompts::build_sql_prompt(&dated_question, &projection.schema_input());

        let response = self.generate_with_deadline(&prompt, model).await?;
        let contract = SqlContract::extract_or_fallback(&response.raw_text);

        // Role filter first, safety guard last, so even a filtered statement
        // is still checked for SELECT shape.
        let role_filter = self.intent.detect_role_filter(question);
        let filtered = guard::apply_role_filter(&contract.query, role_filter);
        let guarded = guard::guard_sql(&filtered, &projection.primary_table);

        Ok(SqlGeneration {
            sql: guarded.sql,
            modules,
            schema_text: projection.rendered_text.clone(),
            primary_table: projection.primary_table.clone(),
            confidence: contract.confidence,
            used_fallback: guarded.used_fallback,
            tokens_in: response.tokens_in,
            tokens_out: response.tokens_out,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Execute a statement under the per-call deadline. Timeouts surface as a
    /// structured execution error like any other driver failure.
    pub async fn execute(&self, sql: &str) -> ExecutionResult {
        match tokio::time::timeout(self.call_timeout, self.executor.execute(sql)).await {
            Ok(result) => result,
            Err(_) => ExecutionResult::failed(format!(
                "query timed out after {}s",
                self.call_timeout.as_secs()
            )),
        }
    }

    /// One refinement attempt over a failed statement. Exhaustion (empty or
    /// zero-confidence refinement, or one that still needs the safety
    /// fallback) is final - no further automatic attempt.
    pub async fn refine_sql(
        &self,
        failed_sql: &str,
        error_message: &str,
        schema_text: &str,
        primary_table: &TableDescriptor,
        model: &str,
    ) -> Result<RefinedSql> {
        let outcome = tokio::time::timeout(
            self.call_timeout,
            self.refiner
                .refine(failed_sql, error_message, schema_text, model),
        )
        .await
        .map_err(|_| {
            EngineError::Llm(format!(
                "refinement call timed out after {}s",
                self.call_timeout.as_secs()
            ))
        })??;

        if outcome.is_exhausted() {
            return Err(EngineError::RefinementExhausted(format!(
                "refinement returned confidence {:.2} for: {}",
                outcome.contract.confidence, error_message
            )));
        }

        let guarded = guard::guard_sql(&outcome.contract.query, primary_table);
        if guarded.used_fallback {
            return Err(EngineError::RefinementExhausted(
                "refinement produced a non-SELECT statement".to_string(),
            ));
        }
        Ok(RefinedSql {
            sql: guarded.sql,
            confidence: outcome.contract.confidence,
            tokens_in: outcome.tokens_in,
            tokens_out: outcome.tokens_out,
            latency_ms: outcome.latency_ms,
        })
    }

    /// Convert an execution result into a structured insight. Contract
    /// violations resolve to the all-empty, zero-confidence fallback.
    pub async fn generate_insight(
        &self,
        question: &str,
        result: &ExecutionResult,
        model: &str,
    ) -> Result<InsightReport> {
        let started = Instant::now();
        let prompt = prompts::build_insight_prompt(question, result);
        let response = self.generate_with_deadline(&prompt, model).await?;
        let contract = InsightContract::extract_or_fallback(&response.raw_text);

        Ok(InsightReport {
            insight: contract.insight,
            greeting: contract.greeting,
            suggestions: contract.suggestions,
            evidence: contract.evidence,
            confidence: contract.confidence,
            tokens_in: response.tokens_in,
            tokens_out: response.tokens_out,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Full run: generate, execute, at most one refinement on failure, then
    /// insight over the final result set.
    pub async fn answer(&self, question: &str, model: &str) -> Result<Answer> {
        let generation = self.generate_sql(question, model).await?;
        let mut execution = self.execute(&generation.sql).await;
        let mut refined = None;

        if let Some(error_message) = execution.error.clone() {
            warn!("execution failed, attempting refinement: {}", error_message);
            let attempt = self
                .refine_sql(
                    &generation.sql,
                    &error_message,
                    &generation.schema_text,
                    &generation.primary_table,
                    model,
                )
                .await?;
            execution = self.execute(&attempt.sql).await;
            refined = Some(attempt);
        }

        let insight = if execution.error.is_none() {
            Some(
                self.generate_insight(question, &execution, model)
                    .await?,
            )
        } else {
            None
        };

        Ok(Answer {
            generation,
            execution,
            refined,
            insight,
        })
    }
}
