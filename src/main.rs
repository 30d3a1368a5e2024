//! seal-consult server.
//!
//! Reads `SEAL_CONSULT__*` environment variables (and `.env`), wires the
//! adapters and serves the consultation router.

use std::error::Error;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use secrecy::ExposeSecret;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use seal_consult::adapters::ai::{FailoverAIProvider, OpenAIConfig, OpenAIProvider};
use seal_consult::adapters::auth::{DevTokenVerifier, JwksConfig, JwksTokenVerifier};
use seal_consult::adapters::http::{consult_router, ConsultAppState, SocketSettings};
use seal_consult::adapters::rate_limiter::{InMemoryRateLimiter, RedisRateLimiter};
use seal_consult::adapters::retrieval::{HttpRetriever, HttpRetrieverConfig, StaticRetriever};
use seal_consult::adapters::storage::{
    InMemoryCheckpointStore, InMemoryMemoryStore, RedisCheckpointStore, RedisMemoryStore,
};
use seal_consult::application::{consult_graph, ConsultDeps, ConsultService};
use seal_consult::config::{AppConfig, LogFormat};
use seal_consult::ports::{AIProvider, CheckpointStore, MemoryStore, RateLimiter, Retriever, TokenVerifier};

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    let state = build_state(&config).await?;
    let app = build_app(&config, state);

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "seal-consult listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.server.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn build_state(config: &AppConfig) -> Result<ConsultAppState, BoxError> {
    // Generation
    let api_key = config
        .ai
        .openai_api_key
        .as_ref()
        .map(|k| k.expose_secret().clone())
        .unwrap_or_default();
    let base = OpenAIConfig::new(api_key)
        .with_base_url(&config.ai.base_url)
        .with_timeout(config.ai.timeout())
        .with_max_retries(config.ai.max_retries)
        .with_temperature(config.ai.temperature);
    let primary: Arc<dyn AIProvider> = Arc::new(OpenAIProvider::new(base.clone().with_model(&config.ai.model)));
    let (ai, router_ai): (Arc<dyn AIProvider>, Arc<dyn AIProvider>) = match &config.ai.fallback_model {
        Some(model) if !model.trim().is_empty() => {
            let secondary: Arc<dyn AIProvider> = Arc::new(OpenAIProvider::new(base.with_model(model)));
            let failover = FailoverAIProvider::new(Arc::clone(&primary)).with_fallback(Arc::clone(&secondary));
            (Arc::new(failover), secondary)
        }
        _ => (Arc::clone(&primary), primary),
    };

    // Retrieval
    let retriever: Arc<dyn Retriever> = match config.retrieval.url() {
        Some(url) => Arc::new(HttpRetriever::new(
            HttpRetrieverConfig::new(url).with_timeout(config.retrieval.timeout()),
        )),
        None => {
            tracing::warn!("no retrieval URL configured, answers will not cite documents");
            Arc::new(StaticRetriever::empty())
        }
    };

    // Stores and limiter
    let window = config.rate_limit.window();
    let (checkpoints, memory, limiter): (Arc<dyn CheckpointStore>, Arc<dyn MemoryStore>, Arc<dyn RateLimiter>) =
        match config.redis.url() {
            Some(url) => {
                let client = redis::Client::open(url)?;
                let conn = tokio::time::timeout(config.redis.timeout(), client.get_multiplexed_tokio_connection())
                    .await
                    .map_err(|_| "timed out connecting to Redis")??;
                tracing::info!("using Redis for checkpoints, memory and rate limits");
                (
                    Arc::new(RedisCheckpointStore::new(conn.clone())),
                    Arc::new(RedisMemoryStore::new(conn.clone())),
                    Arc::new(RedisRateLimiter::new(conn, window)),
                )
            }
            None => {
                tracing::warn!("no Redis URL configured, state is kept in memory");
                (
                    Arc::new(InMemoryCheckpointStore::new()),
                    Arc::new(InMemoryMemoryStore::new()),
                    Arc::new(InMemoryRateLimiter::new(window)),
                )
            }
        };

    // Authentication
    let verifier: Arc<dyn TokenVerifier> = match config.auth.jwks_url() {
        Some(url) => {
            let mut jwks = JwksConfig::new(url).with_cache_duration(config.auth.jwks_cache_ttl());
            if let Some(issuer) = &config.auth.issuer {
                jwks = jwks.with_issuer(issuer);
            }
            if let Some(audience) = &config.auth.audience {
                jwks = jwks.with_audience(audience);
            }
            Arc::new(JwksTokenVerifier::http(jwks))
        }
        None => {
            tracing::warn!("no JWKS URL configured, accepting unverified development tokens");
            Arc::new(DevTokenVerifier::new())
        }
    };

    let deps = ConsultDeps {
        ai,
        router_ai,
        retriever,
        registry: Arc::new(config.consult.registry()?),
        policy: config.consult.router_policy(),
        rag: config.consult.rag_settings(),
    };
    let service = ConsultService::new(deps, Arc::new(consult_graph()), checkpoints, memory, limiter);

    let settings = SocketSettings {
        stream: config.streaming.stream_settings(),
        limits: config.streaming.frame_limits(),
        idle_timeout: config.streaming.idle_timeout(),
    };
    Ok(ConsultAppState::new(Arc::new(service), verifier, settings))
}

fn build_app(config: &AppConfig, state: ConsultAppState) -> Router {
    consult_router()
        .with_state(state)
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    if origins.is_empty() && !config.is_production() {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
