//! `chatitp serve`: wire config, providers, stores and the engine into the HTTP server.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use chatitp_config::{
    ChatItpConfig, EmbeddingProviderKind, EmbeddingsConfig, LlmConfig, LlmProviderKind,
    SessionBackend,
};
use chatitp_core::{ImageGenerator, LlmProvider, SessionRepository};
use chatitp_engine::{ConversationEngine, EngineSettings};
use chatitp_gateway::{build_router, start_server, GatewayState};
use chatitp_memory::{
    create_provider, EmbeddingBackend, EmbeddingProvider, InMemorySessionStore, MokaLiveStore,
    ProjectIndex, SqliteSessionStore,
};
use chatitp_providers::{
    OpenRouterProvider, ReplicateClient, ReplicateImageGenerator, ReplicateProvider,
};

pub async fn run(config_path: Option<&Path>, port: Option<u16>) -> Result<()> {
    let mut config = chatitp_config::load(config_path).await?;
    if let Some(port) = port {
        config.server.port = port;
    }

    let _log_guard = logging::init_logger(
        config.logging.dir.as_deref().map(Path::new),
        &config.logging.level,
    );
    chatitp_config::ensure_valid(&config)?;
    info!(
        port = config.server.port,
        bind = %config.server.bind_address,
        db = %config.storage.db_path,
        "Starting ChatITP"
    );

    let engine = build_engine(&config).await?;
    let app = build_router(GatewayState::new(Arc::new(engine)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .context("Invalid bind address")?;
    start_server(addr, app).await
}

async fn build_engine(config: &ChatItpConfig) -> Result<ConversationEngine> {
    let provider = llm_provider(&config.llm)?;

    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::from(create_provider(embedding_backend(&config.embeddings)?));
    let index = ProjectIndex::load(&config.embeddings.catalog_path, embedder).await?;
    if index.is_empty() {
        warn!(catalog = %config.embeddings.catalog_path, "Project catalog is empty");
    }

    let sessions: Arc<dyn SessionRepository> = match config.storage.backend {
        SessionBackend::Sqlite => Arc::new(SqliteSessionStore::open(&config.storage.db_path)?),
        SessionBackend::Memory => {
            warn!("Saved sessions are kept in memory and lost on restart");
            Arc::new(InMemorySessionStore::new())
        }
    };
    let live = MokaLiveStore::new(
        Duration::from_secs(config.storage.live_ttl_secs),
        config.storage.live_max_entries,
    );

    let engine = ConversationEngine::new(
        EngineSettings::from(config),
        provider,
        Arc::new(index),
        Arc::new(live),
        sessions,
    );
    Ok(match image_generator(config) {
        Some(images) => engine.with_images(images),
        None => engine,
    })
}

fn replicate_client(token: &str, base_url: Option<&str>) -> Arc<ReplicateClient> {
    let client = ReplicateClient::new(token);
    Arc::new(match base_url {
        Some(url) => client.with_base_url(url),
        None => client,
    })
}

fn llm_provider(llm: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let token = llm.api_token.as_deref().context("No LLM API token configured")?;
    let provider: Arc<dyn LlmProvider> = match llm.provider {
        LlmProviderKind::Replicate => Arc::new(ReplicateProvider::new(
            replicate_client(token, llm.base_url.as_deref()),
            &llm.model,
        )),
        LlmProviderKind::OpenRouter => {
            let provider = OpenRouterProvider::new(token, &llm.model);
            Arc::new(match llm.base_url.as_deref() {
                Some(url) => provider.with_base_url(url),
                None => provider,
            })
        }
    };
    info!(provider = ?llm.provider, model = %llm.model, "Registered LLM provider");
    Ok(provider)
}

fn embedding_backend(embeddings: &EmbeddingsConfig) -> Result<EmbeddingBackend> {
    let key = embeddings
        .api_key
        .clone()
        .context("No embeddings API key configured")?;
    Ok(match embeddings.provider {
        EmbeddingProviderKind::Replicate => EmbeddingBackend::Replicate {
            api_token: key,
            model: embeddings.model.clone(),
        },
        EmbeddingProviderKind::OpenAI => EmbeddingBackend::OpenAI {
            api_key: key,
            model: embeddings.model.clone(),
        },
    })
}

/// Image generation runs on Replicate; borrow whichever Replicate token is configured.
fn image_generator(config: &ChatItpConfig) -> Option<Arc<dyn ImageGenerator>> {
    if !config.image.enabled {
        return None;
    }
    let token = match (config.llm.provider, config.embeddings.provider) {
        (LlmProviderKind::Replicate, _) => config.llm.api_token.as_deref(),
        (_, EmbeddingProviderKind::Replicate) => config.embeddings.api_key.as_deref(),
        _ => None,
    };
    match token {
        Some(token) => Some(Arc::new(ReplicateImageGenerator::new(
            replicate_client(token, None),
            &config.image.model,
        ))),
        None => {
            warn!("Image generation disabled: no Replicate API token configured");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> ChatItpConfig {
        let mut config = ChatItpConfig::default();
        config.llm.api_token = Some("r8_test".into());
        config.embeddings.api_key = Some("r8_test".into());
        config
    }

    #[test]
    fn test_llm_provider_requires_token() {
        assert!(llm_provider(&ChatItpConfig::default().llm).is_err());
        assert!(llm_provider(&configured().llm).is_ok());
    }

    #[test]
    fn test_embedding_backend_follows_provider() {
        let mut config = configured();
        config.embeddings.provider = EmbeddingProviderKind::OpenAI;
        config.embeddings.model = Some("text-embedding-3-small".into());
        match embedding_backend(&config.embeddings).unwrap() {
            EmbeddingBackend::OpenAI { api_key, model } => {
                assert_eq!(api_key, "r8_test");
                assert_eq!(model.as_deref(), Some("text-embedding-3-small"));
            }
            other => panic!("unexpected backend: {other:?}"),
        }
    }

    #[test]
    fn test_image_generator_needs_replicate_token() {
        assert!(image_generator(&configured()).is_some());

        let mut config = configured();
        config.image.enabled = false;
        assert!(image_generator(&config).is_none());

        let mut config = configured();
        config.llm.provider = LlmProviderKind::OpenRouter;
        config.embeddings.provider = EmbeddingProviderKind::OpenAI;
        assert!(image_generator(&config).is_none());
    }
}
