use std::net::SocketAddr;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{MatchedPath, State};
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use common_config::{env_string, service_port};
use common_obs::{
    auth_attempts_total, encode_prometheus, handler_latency_seconds, health_router,
    http_requests_total, ObsInit, PROMETHEUS_CONTENT_TYPE,
};
use tokio::net::TcpListener;

pub mod credentials;

use credentials::{CredentialRecord, SessionStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const SERVICE_NAME: &str = "auth-svc";
pub const PORT_ENV: &str = "AUTH_SVC_PORT";
pub const DEFAULT_PORT: u16 = 4000;
pub const USERNAME_ENV: &str = "AUTH_SVC_USERNAME";
pub const SECRET_ENV: &str = "AUTH_SVC_SECRET";
const DEFAULT_USERNAME: &str = "cat";
const DEFAULT_SECRET: &str = "dog";

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    ObsInit::init(SERVICE_NAME).map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;

    let port = service_port(PORT_ENV, DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let store = SessionStore::new(CredentialRecord {
        username: env_string(USERNAME_ENV, DEFAULT_USERNAME),
        secret: env_string(SECRET_ENV, DEFAULT_SECRET),
    });

    tracing::info!(
        event = "service_start",
        service = SERVICE_NAME,
        version = VERSION,
        listen_addr = %addr,
        "starting service"
    );

    serve(addr, store).await
}

pub async fn serve(addr: SocketAddr, store: SessionStore) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(store);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

pub fn build_router(store: SessionStore) -> Router {
    Router::new()
        .route("/auth", get(verify_credentials))
        .route("/session", get(query_session))
        .route("/metrics", get(metrics))
        .with_state(store)
        .merge(health_router(SERVICE_NAME))
        .layer(from_fn(track_http_metrics))
}

/// Verify a credential submission against the stored record.
///
/// The `Bytes` extractor resolves only once the request stream has ended,
/// so the check never runs on a partially delivered body. Responses carry
/// no payload either way; the status code is the whole contract.
async fn verify_credentials(State(store): State<SessionStore>, body: Bytes) -> StatusCode {
    if store.verify(&body).await {
        auth_attempts_total().inc(&[SERVICE_NAME, "accepted"], 1);
        tracing::info!(event = "credentials_verified", "credentials accepted");
        StatusCode::OK
    } else {
        auth_attempts_total().inc(&[SERVICE_NAME, "rejected"], 1);
        tracing::info!(event = "credentials_rejected", "credentials rejected");
        StatusCode::BAD_REQUEST
    }
}

/// Report whether the one supported identity has signed in.
///
/// Any body is drained to end-of-stream and ignored before answering, for
/// the same chunked-delivery reason as `/auth`. Pure read.
async fn query_session(State(store): State<SessionStore>, _body: Bytes) -> StatusCode {
    let signed_in = store.signed_in().await;
    tracing::debug!(event = "session_checked", signed_in, "session query");
    if signed_in {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    }
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

async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or(path);

    let start = Instant::now();
    let response = next.run(req).await;
    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    http_requests_total().inc(&[SERVICE_NAME, route.as_str(), status.as_str()], 1);
    handler_latency_seconds().observe(&[SERVICE_NAME, route.as_str()], latency);

    response
}
