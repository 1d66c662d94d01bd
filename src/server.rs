//! # Callback Server
//!
//! Local HTTP server the provider redirects the user back to. It starts
//! connections, receives OAuth callbacks and exposes the cached repository list.

use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{Path, RawQuery, Request, State},
    middleware::{self, Next},
    response::{Redirect, Response},
    routing::get,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::client::ConnectClient;
use crate::error::{ApiError, ConnectError};
use crate::models::{ConnectedRepository, ProviderKind, ServiceInfo};
use crate::redirect::HandlerOutcome;
use crate::telemetry::{self, RunContext};

/// Application state shared by the handlers
#[derive(Clone)]
pub struct AppState {
    pub client: ConnectClient,
}

/// Cached repositories and when they were last fetched
#[derive(Debug, Serialize)]
pub struct RepositoryListResponse {
    pub repositories: Vec<ConnectedRepository>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/connect/{provider}", get(start_connection))
        .route("/oauth/callback", get(oauth_callback))
        .route("/repositories", get(list_repositories))
        .layer(middleware::from_fn(with_trace_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Each request gets an id that problem+json bodies report as `trace_id`.
async fn with_trace_id(request: Request, next: Next) -> Response {
    let context = RunContext {
        run_id: Uuid::new_v4(),
    };
    telemetry::with_run_context(context, next.run(request)).await
}

async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Redirect the browser to the provider's authorize page.
async fn start_connection(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, ApiError> {
    let provider: ProviderKind = provider
        .parse()
        .map_err(|_| ConnectError::UnknownProvider(provider.clone()))?;
    let url = state.client.handler().begin(provider)?;
    Ok(Redirect::to(url.as_str()))
}

/// Handle the provider redirect. The callback URL is rebuilt from the
/// configured redirect URI so the cleaned URL points back at the app.
async fn oauth_callback(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<HandlerOutcome>, ApiError> {
    let mut url = Url::parse(&state.client.config().redirect_uri)
        .map_err(|e| ConnectError::Configuration(format!("invalid redirect URI: {}", e)))?;
    url.set_query(query.as_deref());

    let outcome = state.client.handler().handle(&url).await;
    Ok(Json(outcome))
}

async fn list_repositories(State(state): State<AppState>) -> Json<RepositoryListResponse> {
    let cache = state.client.cache();
    Json(RepositoryListResponse {
        repositories: cache.snapshot().await,
        refreshed_at: cache.refreshed_at().await,
    })
}

/// Serve on an already bound listener until the client's shutdown token is cancelled.
pub async fn serve(listener: TcpListener, client: ConnectClient) -> std::io::Result<()> {
    let shutdown = client.shutdown_token();
    let app = create_app(AppState { client });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// Bind the configured address and serve.
pub async fn run_server(client: ConnectClient) -> anyhow::Result<()> {
    let addr: SocketAddr = client.config().bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, profile = %client.config().profile, "Callback server listening");
    serve(listener, client).await?;
    info!("Callback server stopped");
    Ok(())
}
