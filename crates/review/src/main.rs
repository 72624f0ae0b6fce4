//! ClauseForge Review CLI
//!
//! Reviews one contract and prints the report as JSON:
//! - `review <contract.pdf> <category>`
//! - `review <clova-response.json> <category> <image_width> <image_height>`

use anyhow::{bail, Context};
use clauseforge_common::{
    config::AppConfig,
    embeddings::create_embedder,
    llm::create_chat_model,
    metrics,
    vector::create_vector_index,
    EmbeddingGateway, RetryOrchestrator, VERSION,
};
use clauseforge_ingestion::{OcrDocument, PdfDocument};
use clauseforge_review::{AnalysisRequest, LlmCorrector, ReviewPipeline, ReviewSource};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage:\n  review <contract.pdf> <category>\n  review <clova-response.json> <category> <image_width> <image_height>";

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
    info!("Starting ClauseForge Review v{}", VERSION);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 2 && args.len() != 4 {
        bail!(USAGE);
    }
    let path = PathBuf::from(&args[0]);
    let request = AnalysisRequest {
        category_name: args[1].clone(),
    };
    let source = load_source(&path, &args[2..]).await?;

    // Initialize clients
    let index = create_vector_index(&config.vector_index)?;
    let embedder = create_embedder(&config.embedding)?;
    info!(
        model = %embedder.model_name(),
        dimension = embedder.dimension(),
        "Embedder initialized"
    );
    let chat = create_chat_model(&config.llm)?;

    let corrector = LlmCorrector::new(
        index,
        chat,
        RetryOrchestrator::from_config(&config.llm),
        &config.review,
    )
    .with_sampling(config.llm.temperature, config.llm.max_tokens);
    let pipeline = ReviewPipeline::new(
        EmbeddingGateway::new(embedder, config.embedding.batch_size),
        corrector,
        config.chunking.clone(),
        &config.review,
    );

    match pipeline.review(&request, &source).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, code = e.code().as_code(), "Review failed");
            println!("{}", serde_json::to_string_pretty(&e.to_response())?);
            Err(e.into())
        }
    }
}

async fn load_source(path: &Path, image_size: &[String]) -> anyhow::Result<ReviewSource> {
    if let [width, height] = image_size {
        let width: u32 = width.parse().context("image_width must be an integer")?;
        let height: u32 = height.parse().context("image_height must be an integer")?;
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        return Ok(ReviewSource::Ocr(OcrDocument::from_clova_json(&raw, width, height)?));
    }

    let document = PdfDocument::open(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    info!(pages = document.page_count(), "PDF loaded");
    Ok(ReviewSource::Pdf(document))
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
