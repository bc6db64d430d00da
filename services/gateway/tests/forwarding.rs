use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use gateway::auth_client::AuthClient;
use gateway::{build_router, AppState};
use http_body_util::BodyExt;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower::ServiceExt;

#[derive(Clone)]
struct StubAuth {
    accept: bool,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
}

async fn stub_endpoint(State(stub): State<StubAuth>, body: Bytes) -> StatusCode {
    stub.received.lock().await.push(body.to_vec());
    if stub.accept {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    }
}

async fn spawn_stub_auth(accept: bool) -> (SocketAddr, Arc<Mutex<Vec<Vec<u8>>>>) {
    let stub = StubAuth {
        accept,
        received: Arc::new(Mutex::new(Vec::new())),
    };
    let received = stub.received.clone();

    let app = Router::new()
        .route("/auth", get(stub_endpoint))
        .route("/session", get(stub_endpoint))
        .with_state(stub);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("serve stub");
    });

    (addr, received)
}

fn gateway_router(auth_addr: SocketAddr, timeout: Duration) -> Router {
    let auth = AuthClient::new(&format!("http://{auth_addr}"), timeout).expect("auth client");
    build_router(Arc::new(AppState {
        auth,
        assets_dir: Path::new(env!("CARGO_MANIFEST_DIR")).join("static"),
    }))
}

#[tokio::test]
async fn accepted_signin_serves_protected_content() {
    let (addr, received) = spawn_stub_auth(true).await;
    let router = gateway_router(addr, Duration::from_secs(5));

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/signin")
                .body(Body::from("name1=cat&name2=dog"))
                .unwrap(),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let page = String::from_utf8(body.to_vec()).expect("utf-8 page");
    assert!(page.contains("Restricted area"));

    let bodies = received.lock().await;
    assert_eq!(*bodies, vec![b"name1=cat&name2=dog".to_vec()]);
}

#[tokio::test]
async fn declined_signin_redirects_to_entry_page() {
    let (addr, _received) = spawn_stub_auth(false).await;
    let router = gateway_router(addr, Duration::from_secs(5));

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/signin")
                .body(Body::from("name1=cat&name2=wrongsecret"))
                .unwrap(),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok()),
        Some("/")
    );
}

#[tokio::test]
async fn body_bytes_pass_through_unmodified() {
    let (addr, received) = spawn_stub_auth(false).await;
    let router = gateway_router(addr, Duration::from_secs(5));

    // Not form-encoded, not UTF-8. The gateway must not care.
    let payload: Vec<u8> = (0u8..=255).collect();

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/signin")
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let bodies = received.lock().await;
    assert_eq!(*bodies, vec![payload]);
}

#[tokio::test]
async fn restricted_serves_content_once_signed_in() {
    let (addr, received) = spawn_stub_auth(true).await;
    let router = gateway_router(addr, Duration::from_secs(5));

    let response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/restricted")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8(body.to_vec())
        .expect("utf-8 page")
        .contains("Restricted area"));

    // The session query forwards an empty body.
    let bodies = received.lock().await;
    assert_eq!(*bodies, vec![Vec::<u8>::new()]);
}

#[tokio::test]
async fn restricted_redirects_without_session() {
    let (addr, _received) = spawn_stub_auth(false).await;
    let router = gateway_router(addr, Duration::from_secs(5));

    let response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/restricted")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok()),
        Some("/")
    );
}

#[tokio::test]
async fn unreachable_auth_service_yields_bad_gateway() {
    // Grab a port nobody is listening on by binding and dropping.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let router = gateway_router(addr, Duration::from_secs(1));

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/signin")
                .body(Body::from("name1=cat&name2=dog"))
                .unwrap(),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], "upstream_error");
}

#[tokio::test]
async fn entry_page_is_served_from_the_assets_root() {
    let (addr, _received) = spawn_stub_auth(true).await;
    let router = gateway_router(addr, Duration::from_secs(5));

    let response = router
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8(body.to_vec())
        .expect("utf-8 page")
        .contains("Sign in"));
}
