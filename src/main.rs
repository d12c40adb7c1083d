use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use gst_assistant::audit::AuditLogger;
use gst_assistant::chain::ChainBuilder;
use gst_assistant::chroma_store::{ChromaStore, DocumentSearch};
use gst_assistant::embeddings::EmbeddingClient;
use gst_assistant::gemini::{GeminiClient, TextGenerator};
use gst_assistant::session::{PendingClarificationStore, SessionStore};
use gst_assistant::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;

    let embedder = EmbeddingClient::new(&config)?;
    let store: Arc<dyn DocumentSearch> = Arc::new(ChromaStore::new(&config, embedder)?);
    let llm: Arc<dyn TextGenerator> = Arc::new(GeminiClient::new(&config)?);

    let builder = ChainBuilder::new(&config, store, llm);
    let sessions = SessionStore::new();
    let pending = PendingClarificationStore::new();
    let audit = AuditLogger::new(&config)?;

    run_server(config, builder, sessions, pending, audit).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
