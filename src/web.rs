use crate::semantic::{CategoryStats, Exploration, Explorer, ExplorerError, ExplorerStatus};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    explorer: Arc<Explorer>,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

pub fn router(explorer: Arc<Explorer>) -> Router {
    let shared_state = Arc::new(SharedState { explorer });

    Router::new()
        .route("/api/search", post(search))
        .route("/api/compute", post(compute))
        .route("/api/latest", get(latest))
        .route("/api/categories", get(categories))
        .route("/api/status", get(status))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

pub async fn serve(explorer: Arc<Explorer>, listen: &str) -> anyhow::Result<()> {
    let app = router(explorer);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Debug)]
struct HttpError(ExplorerError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = if self.0.is_bad_input() {
            axum::http::StatusCode::BAD_REQUEST
        } else if self.0.is_provider_failure() {
            log::error!("{self:?}");
            axum::http::StatusCode::SERVICE_UNAVAILABLE
        } else {
            log::error!("{self:?}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        };

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            json!({"error": self.0.to_string()}).to_string(),
        )
            .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<ExplorerError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub word: String,

    /// Also build the neighbor graph
    #[serde(default)]
    pub graph: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComputeRequest {
    /// Words joined by `+` and `-`
    pub expression: String,

    #[serde(default)]
    pub graph: bool,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<Exploration>, HttpError> {
    log::debug!("payload: {payload:?}");

    let exploration = state.explorer.search(&payload.word, payload.graph).await?;
    Ok(Json(exploration))
}

async fn compute(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ComputeRequest>,
) -> Result<Json<Exploration>, HttpError> {
    log::debug!("payload: {payload:?}");

    let exploration = state
        .explorer
        .compute(&payload.expression, payload.graph)
        .await?;
    Ok(Json(exploration))
}

async fn latest(State(state): State<Arc<SharedState>>) -> Json<Option<Exploration>> {
    Json(state.explorer.latest().map(|l| (*l).clone()))
}

async fn categories(State(state): State<Arc<SharedState>>) -> Json<CategoryStats> {
    Json(state.explorer.categories().stats())
}

async fn status(State(state): State<Arc<SharedState>>) -> Json<ExplorerStatus> {
    Json(state.explorer.status())
}
