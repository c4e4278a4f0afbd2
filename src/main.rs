use anyhow::Result;
use clap::Parser;
use nl2sql_engine::catalog::TableCatalog;
use nl2sql_engine::config::EngineConfig;
use nl2sql_engine::executor::PgDatabaseClient;
use nl2sql_engine::llm::OpenAiCompatClient;
use nl2sql_engine::pipeline::QueryPipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "nl2sql")]
#[command(about = "Schema-constrained SQL generation from business questions")]
struct Args {
    /// The business question in natural language
    question: String,

    /// Directory of per-table descriptor JSON files (overrides CATALOG_DIR)
    #[arg(short, long)]
    catalog_dir: Option<PathBuf>,

    /// Generator model identifier (overrides DEFAULT_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Execute the generated query (requires DATABASE_URL)
    #[arg(long)]
    execute: bool,

    /// Also produce a natural-language insight (implies --execute)
    #[arg(long)]
    insight: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config = EngineConfig::from_env();
    if let Some(dir) = args.catalog_dir {
        config.catalog_dir = dir;
    }
    let model = args.model.unwrap_or_else(|| config.default_model.clone());
    let run_execute = args.execute || args.insight;

    let catalog = Arc::new(TableCatalog::load(&config.catalog_dir)?);
    let generator = Arc::new(OpenAiCompatClient::new(
        config.llm_base_url.clone(),
        config.llm_api_key.clone(),
    ));

    let database_url = config
        .database_url
        .clone()
        .filter(|_| run_execute)
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required with --execute/--insight"));

    let db: Arc<dyn nl2sql_engine::executor::DatabaseClient> = if run_execute {
        Arc::new(PgDatabaseClient::connect(&database_url?).await?)
    } else {
        // Never reached without --execute; a stub keeps the pipeline whole
        Arc::new(NoDatabase)
    };

    let pipeline = QueryPipeline::new(catalog, generator, db, &config);

    info!("question: {}", args.question);
    let generation = pipeline.generate_sql(&args.question, &model).await?;
    println!("SQL: {}", generation.sql);
    println!(
        "modules: {} | confidence: {:.2} | tokens: {}/{} | {} ms",
        generation.modules.join(", "),
        generation.confidence,
        generation.tokens_in,
        generation.tokens_out,
        generation.latency_ms
    );

    if run_execute {
        let execution = pipeline.execute(&generation.sql).await;
        match &execution.error {
            Some(e) => println!("execution error: {}", e),
            None => {
                println!(
                    "rows: {}{}",
                    execution.row_count,
                    if execution.is_truncated {
                        " (truncated)"
                    } else {
                        ""
                    }
                );
                println!("{}", serde_json::to_string_pretty(&execution.data)?);

                if args.insight {
                    let report = pipeline
                        .generate_insight(&args.question, &execution, &model)
                        .await?;
                    println!("insight: {}", report.insight);
                    println!("greeting: {}", report.greeting);
                    for suggestion in &report.suggestions {
                        println!("  - {}", suggestion);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Placeholder database for generate-only runs.
struct NoDatabase;

#[async_trait::async_trait]
impl nl2sql_engine::executor::DatabaseClient for NoDatabase {
    async fn fetch(
        &self,
        _sql: &str,
        _limit: usize,
    ) -> nl2sql_engine::error::Result<nl2sql_engine::executor::QueryRows> {
        Err(nl2sql_engine::error::EngineError::Execution(
            "no database configured".to_string(),
        ))
    }
}
