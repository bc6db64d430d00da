use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{MatchedPath, State};
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use common_config::{env_string, service_port};
use common_obs::{
    encode_prometheus, handler_latency_seconds, health_router, http_requests_total,
    upstream_requests_total, ObsInit, PROMETHEUS_CONTENT_TYPE,
};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub mod auth_client;
pub mod error;

use auth_client::AuthClient;
use error::GatewayError;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const SERVICE_NAME: &str = "gateway";
pub const PORT_ENV: &str = "GATEWAY_PORT";
pub const DEFAULT_PORT: u16 = 3000;
pub const AUTH_URL_ENV: &str = "GATEWAY_AUTH_URL";
pub const DEFAULT_AUTH_URL: &str = "http://127.0.0.1:4000";
pub const ASSETS_DIR_ENV: &str = "GATEWAY_ASSETS_DIR";
pub const DEFAULT_ASSETS_DIR: &str = "services/gateway/static";

const REQUEST_ID_HEADER: &str = "x-request-id";
const PROTECTED_PAGE: &str = "restricted.html";

/// Bound on the outbound call; past it the client gets a 502 instead of a
/// request that hangs forever.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

pub struct AppState {
    pub auth: AuthClient,
    pub assets_dir: PathBuf,
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    ObsInit::init(SERVICE_NAME).map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;

    let port = service_port(PORT_ENV, DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let auth_url = env_string(AUTH_URL_ENV, DEFAULT_AUTH_URL);
    let assets_dir = PathBuf::from(env_string(ASSETS_DIR_ENV, DEFAULT_ASSETS_DIR));

    let auth = AuthClient::new(&auth_url, UPSTREAM_TIMEOUT)?;
    let state = Arc::new(AppState { auth, assets_dir });

    tracing::info!(
        event = "service_start",
        service = SERVICE_NAME,
        version = VERSION,
        listen_addr = %addr,
        auth_url = %auth_url,
        "starting service"
    );

    serve(addr, state).await
}

pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let assets = ServeDir::new(&state.assets_dir);
    Router::new()
        .route("/signin", post(signin))
        .route("/restricted", get(restricted))
        .route("/metrics", get(metrics))
        .with_state(state)
        .merge(health_router(SERVICE_NAME))
        .fallback_service(assets)
        .layer(from_fn(request_context))
}

async fn signin(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    forward_and_translate(&state, "/auth", request.into_body()).await
}

async fn restricted(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    forward_and_translate(&state, "/session", request.into_body()).await
}

/// The gateway's one real job: pipe the inbound body to the auth service
/// and map the status it answers with onto a client action. 200 serves the
/// protected page; anything else bounces the client back to the sign-in
/// page. No credential logic lives on this side of the wire.
async fn forward_and_translate(
    state: &AppState,
    path: &str,
    body: Body,
) -> Result<Response, GatewayError> {
    let status = state.auth.forward(path, body).await?;
    upstream_requests_total().inc(&[SERVICE_NAME, path, status.as_str()], 1);

    if status == StatusCode::OK {
        tracing::info!(event = "forward_allowed", endpoint = path, "auth service accepted");
        serve_protected(state).await
    } else {
        tracing::info!(
            event = "forward_denied",
            endpoint = path,
            status = status.as_u16(),
            "auth service declined"
        );
        Ok(Redirect::to("/").into_response())
    }
}

async fn serve_protected(state: &AppState) -> Result<Response, GatewayError> {
    let path = state.assets_dir.join(PROTECTED_PAGE);
    let page = tokio::fs::read_to_string(&path).await.map_err(|error| {
        tracing::error!(%error, path = %path.display(), "failed to read protected page");
        GatewayError::Internal
    })?;
    Ok(Html(page).into_response())
}

async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE),
        )],
        encode_prometheus(),
    )
}

async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| {
            let id = Uuid::new_v4().to_string();
            req.headers_mut()
                .insert(REQUEST_ID_HEADER, HeaderValue::from_str(&id).unwrap());
            id
        });

    let span = info_span!(
        "http.request",
        method = %method,
        path = %path,
        request_id = %request_id
    );

    tracing::info!(parent: &span, event = "request_start", method = %method, path = %path);

    let start = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;
    let latency = start.elapsed().as_secs_f64();
    let status = response.status();

    tracing::info!(
        parent: &span,
        event = "request_end",
        method = %method,
        path = %path,
        status = status.as_u16(),
        latency_ms = latency * 1000.0
    );

    http_requests_total().inc(&[SERVICE_NAME, route.as_str(), status.as_str()], 1);
    handler_latency_seconds().observe(&[SERVICE_NAME, route.as_str()], latency);

    response.headers_mut().insert(
        REQUEST_ID_HEADER,
        HeaderValue::from_str(&request_id).unwrap(),
    );

    response
}
