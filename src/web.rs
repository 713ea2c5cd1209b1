use crate::{
    auth::TokenVerifier,
    contents::{Content, ContentCreate},
    eid::Eid,
    errors::{validate_body_not_empty, AppError},
    semantic::{Analysis, SearchError, SearchResponse, SearchService},
};
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

pub struct SharedState {
    service: Arc<SearchService>,
    /// `None` disables authentication
    verifier: Option<TokenVerifier>,
    default_top_k: i64,
}

impl SharedState {
    pub fn new(
        service: Arc<SearchService>,
        verifier: Option<TokenVerifier>,
        default_top_k: i64,
    ) -> Arc<Self> {
        Arc::new(Self {
            service,
            verifier,
            default_top_k,
        })
    }
}

pub fn router(state: Arc<SharedState>) -> Router {
    let protected = Router::new()
        .route("/contents", post(create_content).get(list_contents))
        .route("/contents/:id", get(get_content))
        .route("/search", post(search))
        .route("/embed", post(embed))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .merge(protected)
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(state)
}

async fn serve(state: Arc<SharedState>, listen_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    log::info!("listening on {listen_addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
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
                log::error!("failed to install signal handler: {err}");
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

pub fn start_daemon(state: Arc<SharedState>, listen_addr: &str) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { serve(state, listen_addr).await })
}

// Make our own error that wraps `AppError`.
#[derive(Debug)]
struct HttpError(AppError);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, kind, detail) = match &self.0 {
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found", self.0.to_string()),
            AppError::Validation(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                message.clone(),
            ),
            AppError::Unauthorized(err) => {
                let body = json!({"error": "unauthorized", "detail": err.to_string()});
                let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            AppError::Store(_) | AppError::Search(SearchError::Store(_)) => {
                log::error!("{self:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_server_error",
                    "Database operation failed".to_string(),
                )
            }
            AppError::Search(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_server_error",
                    "Unexpected server error".to_string(),
                )
            }
        };

        (status, Json(json!({"error": kind, "detail": detail}))).into_response()
    }
}

// This enables using `?` on functions that return `Result<_, E: Into<AppError>>` to turn them into
// `Result<_, HttpError>`. That way you don't need to do that manually.
impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// `Json` whose rejections use the service error body.
struct JsonBody<T>(T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(HttpError(AppError::Validation(rejection.body_text()))),
        }
    }
}

async fn require_auth(
    State(state): State<Arc<SharedState>>,
    request: Request,
    next: Next,
) -> Result<Response, HttpError> {
    if let Some(verifier) = &state.verifier {
        let header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let claims = verifier.verify_header(header)?;
        log::debug!("authenticated subject {:?}", claims.sub);
    }

    Ok(next.run(request).await)
}

async fn health() -> Json<serde_json::Value> {
    log::info!("Health check requested");
    Json(json!({
        "service": "content-search-backend",
        "status": "ok",
        "domain": "business-content-search",
    }))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub content: String,
}

async fn analyze(
    State(state): State<Arc<SharedState>>,
    JsonBody(payload): JsonBody<AnalyzeRequest>,
) -> Json<Analysis> {
    Json(state.service.analyze(&payload.content))
}

async fn create_content(
    State(state): State<Arc<SharedState>>,
    JsonBody(payload): JsonBody<ContentCreate>,
) -> Result<Json<Content>, HttpError> {
    log::debug!("payload: {payload:?}");

    validate_body_not_empty(&payload.body)?;

    let create = ContentCreate {
        title: payload.title,
        body: payload.body.trim().to_string(),
    };
    let service = state.service.clone();

    tokio::task::block_in_place(move || {
        let content = service.create_content(create)?;
        log::info!("Content created: {}", content.id);
        Ok(Json(content))
    })
}

async fn list_contents(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<Vec<Content>>, HttpError> {
    let service = state.service.clone();

    tokio::task::block_in_place(move || Ok(Json(service.store().list()?)))
}

async fn get_content(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> Result<Json<Content>, HttpError> {
    let service = state.service.clone();

    tokio::task::block_in_place(move || {
        let content = service
            .store()
            .get(&Eid::from(id))?
            .ok_or(AppError::NotFound)?;
        Ok(Json(content.without_embedding()))
    })
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<i64>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    JsonBody(payload): JsonBody<SearchRequest>,
) -> Result<Json<SearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let top_k = payload.top_k.unwrap_or(state.default_top_k);
    let service = state.service.clone();

    tokio::task::block_in_place(move || {
        let response = service.search(&payload.query, top_k)?;
        Ok(Json(response))
    })
}

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub dimensions: usize,
    pub embedding: Vec<f32>,
}

async fn embed(
    State(state): State<Arc<SharedState>>,
    JsonBody(payload): JsonBody<EmbedRequest>,
) -> Result<Json<EmbedResponse>, HttpError> {
    let service = state.service.clone();

    tokio::task::block_in_place(move || {
        let embedding = service.embed(&payload.text)?;
        Ok(Json(EmbedResponse {
            dimensions: embedding.len(),
            embedding,
        }))
    })
}
