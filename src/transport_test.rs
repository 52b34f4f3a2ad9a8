use super::*;
use axum::Json;
use axum::Router;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};

// =============================================================================
// ApiRequest
// =============================================================================

#[test]
fn builders_set_method_path_and_body() {
    let req = ApiRequest::post("/api/auth/login").with_json(json!({ "username": "a" }));
    assert_eq!(req.method, Method::POST);
    assert_eq!(req.path, "/api/auth/login");
    assert_eq!(req.body, Some(json!({ "username": "a" })));
    assert!(ApiRequest::get("/x").body.is_none());
}

#[test]
fn with_bearer_leaves_original_untouched() {
    let req = ApiRequest::get("/api/data");
    let authed = req.with_bearer(&AccessToken::new("tok")).unwrap();
    assert_eq!(authed.bearer(), Some("tok"));
    assert_eq!(req.bearer(), None);
}

#[test]
fn with_bearer_replaces_existing_token() {
    let req = ApiRequest::get("/api/data")
        .with_bearer(&AccessToken::new("old"))
        .unwrap();
    let renewed = req.with_bearer(&AccessToken::new("new")).unwrap();
    assert_eq!(renewed.bearer(), Some("new"));
    assert_eq!(renewed.headers.get_all(AUTHORIZATION).iter().count(), 1);
}

#[test]
fn with_bearer_rejects_control_characters() {
    let err = ApiRequest::get("/x")
        .with_bearer(&AccessToken::new("bad\ntoken"))
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidHeader(_)));
}

// =============================================================================
// ApiResponse
// =============================================================================

#[test]
fn server_message_prefers_detail_string() {
    let resp = ApiResponse::from_json(401, &json!({ "detail": " Invalid credentials ", "message": "other" }));
    assert_eq!(resp.server_message().as_deref(), Some("Invalid credentials"));
}

#[test]
fn server_message_joins_validation_details() {
    let resp = ApiResponse::from_json(
        422,
        &json!({ "detail": [{ "msg": "field required" }, { "msg": "too short" }] }),
    );
    assert_eq!(resp.server_message().as_deref(), Some("field required; too short"));
}

#[test]
fn server_message_falls_back_to_message_then_error() {
    let resp = ApiResponse::from_json(400, &json!({ "message": "bad input" }));
    assert_eq!(resp.server_message().as_deref(), Some("bad input"));
    let resp = ApiResponse::from_json(400, &json!({ "error": "nope" }));
    assert_eq!(resp.server_message().as_deref(), Some("nope"));
}

#[test]
fn server_message_none_for_plain_text_or_blank() {
    assert_eq!(ApiResponse::new(500, "Internal Server Error").server_message(), None);
    assert_eq!(ApiResponse::from_json(500, &json!({ "detail": "   " })).server_message(), None);
    assert_eq!(ApiResponse::new(500, "").server_message(), None);
}

#[test]
fn rejection_maps_401_to_unauthorized() {
    let resp = ApiResponse::from_json(401, &json!({ "detail": "expired" }));
    assert_eq!(
        resp.rejection(),
        SessionError::Unauthorized { status: 401, message: Some("expired".into()) }
    );
}

#[test]
fn rejection_maps_other_status_to_rejected() {
    let resp = ApiResponse::new(503, "");
    assert_eq!(resp.rejection(), SessionError::Rejected { status: 503, message: "HTTP 503".into() });
}

#[test]
fn json_decode_error_is_typed() {
    let resp = ApiResponse::new(200, "<html>");
    let err = resp.json::<Value>().unwrap_err();
    assert!(matches!(err, SessionError::Decode(_)));
}

#[test]
fn success_range() {
    assert!(ApiResponse::new(200, "").is_success());
    assert!(ApiResponse::new(204, "").is_success());
    assert!(!ApiResponse::new(302, "").is_success());
    assert!(!ApiResponse::new(401, "").is_success());
}

// =============================================================================
// HttpTransport — against an in-process axum server
// =============================================================================

async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn login_handler(Json(body): Json<Value>) -> Response {
    if body["username"] == "alice" {
        (
            [(header::SET_COOKIE, "access_token=cookie-1; Path=/; HttpOnly")],
            Json(json!({ "user": { "id": "u1" } })),
        )
            .into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Invalid credentials" }))).into_response()
    }
}

async fn me_handler(headers: axum::http::HeaderMap) -> Response {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if cookie.contains("access_token=cookie-1") {
        Json(json!({ "user": { "id": "u1" } })).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Not authenticated" }))).into_response()
    }
}

async fn echo_auth_handler(headers: axum::http::HeaderMap) -> Json<Value> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    Json(json!({ "authorization": auth }))
}

fn test_app() -> Router {
    Router::new()
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/me", get(me_handler))
        .route("/echo", get(echo_auth_handler))
}

#[tokio::test]
async fn http_transport_carries_cookies_between_calls() {
    let base = spawn_server(test_app()).await;
    let transport = HttpTransport::new(&SessionConfig::new(base)).unwrap();

    let before = transport.send(&ApiRequest::get("/api/auth/me")).await.unwrap();
    assert_eq!(before.status, 401);

    let login = ApiRequest::post("/api/auth/login").with_json(json!({ "username": "alice", "password": "pw" }));
    let resp = transport.send(&login).await.unwrap();
    assert_eq!(resp.status, 200);

    let after = transport.send(&ApiRequest::get("/api/auth/me")).await.unwrap();
    assert_eq!(after.status, 200);
    assert_eq!(after.json::<Value>().unwrap()["user"]["id"], "u1");
}

#[tokio::test]
async fn http_transport_sends_request_headers() {
    let base = spawn_server(test_app()).await;
    let transport = HttpTransport::new(&SessionConfig::new(base)).unwrap();
    let req = ApiRequest::get("echo")
        .with_bearer(&AccessToken::new("abc"))
        .unwrap();
    let resp = transport.send(&req).await.unwrap();
    assert_eq!(resp.json::<Value>().unwrap()["authorization"], "Bearer abc");
}

#[tokio::test]
async fn http_transport_applies_default_headers() {
    let base = spawn_server(test_app()).await;
    let mut headers = HeaderMap::new();
    headers.insert(reqwest::header::COOKIE, HeaderValue::from_static("access_token=cookie-1"));
    let transport = HttpTransport::with_default_headers(&SessionConfig::new(base), headers).unwrap();
    let resp = transport.send(&ApiRequest::get("/api/auth/me")).await.unwrap();
    assert_eq!(resp.status, 200);
}

#[tokio::test]
async fn http_transport_reports_server_message_on_reject() {
    let base = spawn_server(test_app()).await;
    let transport = HttpTransport::new(&SessionConfig::new(base)).unwrap();
    let login = ApiRequest::post("/api/auth/login").with_json(json!({ "username": "mallory" }));
    let resp = transport.send(&login).await.unwrap();
    assert!(resp.is_unauthorized());
    assert_eq!(resp.server_message().as_deref(), Some("Invalid credentials"));
}

#[tokio::test]
async fn http_transport_connection_refused_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new(&SessionConfig::new(format!("http://{addr}"))).unwrap();
    let err = transport
        .send(&ApiRequest::get("/api/auth/me"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Network(_)));
}
