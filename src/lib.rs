//! Registry, health prober and generation proxy for locally or remotely
//! hosted text-generation backends.

use axum::{
    error_handling::HandleErrorLayer,
    middleware,
    routing::{get, post},
    BoxError, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod interaction_log;
pub mod logging;
pub mod probe;
pub mod proxy;
pub mod refresher;
pub mod registry;
pub mod v1;

use auth::SessionAuthenticator;
use config::Config;
use error::ApiError;
use interaction_log::InteractionLog;
use probe::HealthProber;
use proxy::GenerationProxy;
use registry::{RegistryService, RegistryStore};

#[derive(Clone)]
pub struct AppState {
    pub registry: RegistryService,
    pub proxy: GenerationProxy,
    pub logs: InteractionLog,
    pub auth: Arc<dyn SessionAuthenticator>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &Config, client: reqwest::Client) -> Self {
        let store = RegistryStore::new();
        Self {
            registry: RegistryService::new(store.clone(), HealthProber::new(client.clone())),
            proxy: GenerationProxy::new(store, client, config.generation_timeout()),
            logs: InteractionLog::with_capacity(config.logs.capacity),
            auth: auth::authenticator_from_config(&config.auth),
        }
    }
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let api = Router::new()
        .route(
            "/registry",
            get(v1::list_entries)
                .post(v1::create_entry)
                .put(v1::update_entry)
                .delete(v1::delete_entry),
        )
        .route("/registry/generate", post(v1::generate))
        .route("/registry/generate/stream", post(v1::generate_stream))
        .route(
            "/logs",
            get(v1::list_logs).post(v1::append_log).delete(v1::clear_logs),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_session));

    Router::new()
        .route("/health", get(v1::health_check))
        .nest("/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .timeout(request_timeout),
        )
        .with_state(state)
}

async fn handle_timeout_error(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::Timeout
    } else {
        ApiError::Internal(format!("unhandled internal error: {}", err))
    }
}
