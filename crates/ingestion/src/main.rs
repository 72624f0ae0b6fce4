//! ClauseForge Ingestion CLI
//!
//! Maintains the reference corpus:
//! - `ingestion ingest <pdf> <category> <standard_id>`
//! - `ingestion delete <category> <standard_id>`

use anyhow::{bail, Context};
use clauseforge_common::{
    config::AppConfig,
    embeddings::create_embedder,
    llm::create_chat_model,
    metrics,
    vector::create_vector_index,
    EmbeddingGateway, RetryOrchestrator, VERSION,
};
use clauseforge_ingestion::{delete_standard, PdfDocument, StandardIngestor, StandardRequest};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage:\n  ingestion ingest <pdf> <category> <standard_id>\n  ingestion delete <category> <standard_id>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_observability(&config)?;
    info!("Starting ClauseForge Ingestion v{}", VERSION);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str);

    let index = create_vector_index(&config.vector_index)?;

    match (command, args.len()) {
        (Some("ingest"), 4) => {
            let path = PathBuf::from(&args[1]);
            let request = StandardRequest {
                id: parse_id(&args[3])?,
                category_name: args[2].clone(),
            };

            let embedder = create_embedder(&config.embedding)?;
            info!(
                model = %embedder.model_name(),
                dimension = embedder.dimension(),
                "Embedder initialized"
            );
            let chat = create_chat_model(&config.llm)?;

            let ingestor = StandardIngestor::new(
                index,
                chat,
                EmbeddingGateway::new(embedder, config.embedding.batch_size),
                RetryOrchestrator::from_config(&config.llm),
                config.chunking.clone(),
                config.review.max_concurrency,
            )
            .with_sampling(config.llm.temperature, config.llm.max_tokens);

            let document = PdfDocument::open(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;

            match ingestor.ingest(&request, &document.pages()).await {
                Ok(summary) => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                Err(e) => {
                    error!(error = %e, "Ingestion failed");
                    return Err(e.into());
                }
            }
        }
        (Some("delete"), 3) => {
            let request = StandardRequest {
                id: parse_id(&args[2])?,
                category_name: args[1].clone(),
            };
            let outcome = delete_standard(index.as_ref(), &request).await?;
            info!(outcome = ?outcome, "Delete finished");
            println!("{:?}", outcome);
        }
        _ => bail!(USAGE),
    }

    info!("Ingestion finished");
    Ok(())
}

fn parse_id(raw: &str) -> anyhow::Result<i64> {
    raw.parse()
        .with_context(|| format!("standard_id must be an integer, got '{}'", raw))
}

fn init_observability(config: &AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }

    if config.observability.metrics_port != 0 {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port))
            .install()
            .context("installing Prometheus exporter")?;
        metrics::register_metrics();
        info!(port = config.observability.metrics_port, "Metrics exporter listening");
    }
    Ok(())
}
