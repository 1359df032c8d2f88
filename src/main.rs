use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ragchat_controller::{
    api::routes::{self, AppState},
    config::{Config, EmbeddingBackend},
    orchestrator::{TurnOrchestrator, TurnSettings},
    services::{
        embedding_provider::{EmbeddingProvider, OllamaProvider, OpenAiEmbeddingProvider},
        llm::openai_compat::OPENAI_BASE_URL,
        BackgroundQueue, DocumentRetriever, ProviderRouter,
    },
    storage::{self, ChromaClient, SeaOrmChatRepository},
};

#[derive(Parser, Debug)]
#[command(name = "ragchat-controller", version, about = "RagChat turn pipeline server")]
struct Cli {
    /// Config file (defaults to ~/.ragchat/config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured server port
    #[arg(short, long)]
    port: Option<u16>,
}

fn embedding_provider(config: &Config) -> Option<Arc<dyn EmbeddingProvider>> {
    match config.embedding_provider {
        EmbeddingBackend::Ollama => Some(Arc::new(OllamaProvider::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
        ))),
        EmbeddingBackend::OpenAi => match &config.providers.openai_api_key {
            Some(key) => Some(Arc::new(OpenAiEmbeddingProvider::new(
                config
                    .providers
                    .openai_base_url
                    .clone()
                    .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
                key.clone(),
                config.embedding_model.clone(),
            ))),
            None => {
                tracing::warn!("OpenAI embeddings selected without an API key; retrieval disabled");
                None
            }
        },
        EmbeddingBackend::None => None,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server_port = port;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ragchat_controller={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(config);

    let db_conn = storage::init_db(&config.database_url).await?;
    let repository = Arc::new(SeaOrmChatRepository::new(db_conn));

    let chroma = Arc::new(ChromaClient::new(config.chroma_url.clone()));
    if let Err(e) = chroma.ping().await {
        tracing::warn!(
            "Chroma not reachable at {}: {}. Document search will return nothing.",
            config.chroma_url,
            e
        );
    }

    let retriever = Arc::new(DocumentRetriever::new(
        embedding_provider(&config),
        chroma,
        config.chroma_collection.clone(),
    ));
    let router = Arc::new(ProviderRouter::new(config.providers.clone()));
    let background =
        BackgroundQueue::new(config.background_queue_capacity, config.background_workers);

    let orchestrator = Arc::new(TurnOrchestrator::new(
        repository,
        router.clone(),
        router,
        retriever,
        background.clone(),
        TurnSettings::from(config.as_ref()),
    ));

    let app = routes::create_router(AppState::new(config.clone(), orchestrator));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server_port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Chroma URL: {}", config.chroma_url);
    tracing::info!(
        "Embeddings: {:?} ({})",
        config.embedding_provider,
        config.embedding_model
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight title and summary jobs land.
    if tokio::time::timeout(Duration::from_secs(10), background.wait_idle())
        .await
        .is_err()
    {
        tracing::warn!("{} background tasks still pending at exit", background.pending());
    }

    Ok(())
}
