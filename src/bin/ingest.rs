use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gst_assistant::chroma_store::ChromaStore;
use gst_assistant::config::AppConfig;
use gst_assistant::embeddings::EmbeddingClient;
use gst_assistant::ingest::Ingestor;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Ingest a GST source PDF into a named vector collection")]
struct Cli {
    #[arg(long)]
    pdf: PathBuf,
    #[arg(long)]
    collection: String,
    #[arg(long, default_value_t = 1000)]
    chunk_size: usize,
    #[arg(long, default_value_t = 200)]
    chunk_overlap: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::from_env()?;
    let embedder = EmbeddingClient::new(&config)?;
    let store = ChromaStore::new(&config, embedder)?;
    let ingestor = Ingestor::new(store);

    let report = ingestor
        .ingest_pdf(&cli.pdf, &cli.collection, cli.chunk_size, cli.chunk_overlap)
        .await?;

    println!(
        "Ingest complete. file={} pages={} chunks={}",
        report.source_file, report.page_count, report.chunk_count
    );

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
