//! Server routing through `Mux` and `MuxService`.

use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use plexus::server::{self, HttpRequest, Mux, MuxService, RequestExt, handler_fn};
use plexus::{Method, StatusCode, header};
use tower::ServiceExt;

fn named(name: &'static str) -> server::Handler {
    handler_fn(move |request: HttpRequest| async move {
        let params: Vec<String> = request
            .params()
            .map(|params| params.iter().map(|(k, v)| format!("{k}={v}")).collect())
            .unwrap_or_default();
        server::text(StatusCode::OK, format!("{name}:{}", params.join(",")))
    })
}

fn users_mux() -> MuxService {
    Mux::new()
        .get("/users/:id", named("show"))
        .and_then(|mux| mux.get("/users/list", named("list")))
        .and_then(|mux| mux.get("/users/{id}/posts/{post}", named("post")))
        .and_then(|mux| mux.put("/users/{id}", named("update")))
        .and_then(|mux| mux.get("/", named("root")))
        .expect("valid routes")
        .build()
}

async fn call(mux: &MuxService, method: &str, path: &str) -> (StatusCode, http::HeaderMap, String) {
    let request = http::Request::builder()
        .method(method)
        .uri(path)
        .body(Full::new(Bytes::new()))
        .expect("request");
    let Ok(response) = mux.clone().oneshot(request).await;
    let (parts, body) = response.into_parts();
    let Ok(collected) = body.collect().await;
    let text = String::from_utf8_lossy(&collected.to_bytes()).into_owned();
    (parts.status, parts.headers, text)
}

#[tokio::test]
async fn test_static_beats_param_regardless_of_registration_order() {
    let mux = users_mux();

    let (status, _, body) = call(&mux, "GET", "/users/list").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "list:");

    let (_, _, body) = call(&mux, "GET", "/users/123").await;
    assert_eq!(body, "show:id=123");
}

#[tokio::test]
async fn test_multiple_params_and_root() {
    let mux = users_mux();

    let (_, _, body) = call(&mux, "GET", "/users/7/posts/hello%20world").await;
    assert_eq!(body, "post:id=7,post=hello world");

    let (_, _, body) = call(&mux, "GET", "/").await;
    assert_eq!(body, "root:");
}

#[tokio::test]
async fn test_not_found_vs_method_not_allowed() {
    let mux = users_mux();

    let (status, headers, _) = call(&mux, "GET", "/teams/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(headers.get(header::ALLOW).is_none());

    let (status, headers, _) = call(&mux, "DELETE", "/users/1").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(headers[header::ALLOW], "GET, PUT");

    // trailing slash is a different path
    let (status, _, _) = call(&mux, "GET", "/users/1/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test]
fn test_duplicate_shape_is_rejected() {
    let err = Mux::new()
        .get("/users/:id", named("a"))
        .and_then(|mux| mux.get("/users/{user}", named("b")))
        .expect_err("conflict");

    assert!(matches!(
        err,
        plexus::Error::RouteConflict { method: Method::Get, .. }
    ));
}

#[test]
fn test_malformed_pattern_is_rejected() {
    let err = Mux::new()
        .get("/users/{id", named("a"))
        .expect_err("malformed");

    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_route_pattern_visible_to_global_middleware() {
    let label = server::middleware::from_fn("label", |request: HttpRequest, next| async move {
        let pattern = request
            .route_pattern()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        let Ok(mut response) = next.run(request).await;
        response.headers_mut().insert(
            "x-route",
            http::HeaderValue::from_str(&pattern).unwrap_or(http::HeaderValue::from_static("?")),
        );
        Ok::<_, Infallible>(response)
    });

    let mux = Mux::new()
        .with(label)
        .get("/users/{id}", named("show"))
        .expect("valid route")
        .build();

    let (_, headers, _) = call(&mux, "GET", "/users/9").await;
    assert_eq!(headers["x-route"], "/users/{id}");

    let (_, headers, _) = call(&mux, "GET", "/elsewhere").await;
    assert_eq!(headers["x-route"], "-");
}
