//! Bridge behavior end to end: scripted stdio backends behind the router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::util::ServiceExt;

use mcp_compose_session::SessionConfig;
use mcp_compose_test_utils::{
    error_reply, forecast_tools_reply, scripted_backend, tool_result_reply,
};

use crate::support::{body_json, json_post, proxy, wait_ready, API_KEY};

/// Swap the manifest's `weather` session for a scripted backend and wait
/// for its handshake.
async fn install_backend(
    proxy: &mcp_compose_proxy::ProxyServer,
    replies: &[String],
) {
    let state = proxy.state();
    let session = state
        .manager
        .attach("weather", SessionConfig::new(scripted_backend(replies)))
        .await;
    wait_ready(&session).await;
}

#[tokio::test]
async fn tool_call_strips_mcp_envelope() {
    let mut proxy = proxy();
    proxy.start().await.unwrap();
    install_backend(&proxy, &[tool_result_reply(2, "72F and sunny")]).await;

    let response = proxy
        .router()
        .oneshot(json_post(
            "/weather/get_forecast",
            json!({"location": "NYC"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!([{"type": "text", "text": "72F and sunny"}]));
}

#[tokio::test]
async fn method_not_found_maps_to_404_with_error_code() {
    let mut proxy = proxy();
    proxy.start().await.unwrap();
    install_backend(&proxy, &[error_reply(2, -32601, "Method not found")]).await;

    let response = proxy
        .router()
        .oneshot(json_post("/weather/get_forecast", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-mcp-error-code"], "-32601");
}

#[tokio::test]
async fn invalid_params_maps_to_400() {
    let mut proxy = proxy();
    proxy.start().await.unwrap();
    install_backend(&proxy, &[error_reply(2, -32602, "Invalid params")]).await;

    let response = proxy
        .router()
        .oneshot(json_post("/weather/get_forecast", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["x-mcp-error-code"], "-32602");
}

#[tokio::test]
async fn internal_error_maps_to_502() {
    let mut proxy = proxy();
    proxy.start().await.unwrap();
    install_backend(&proxy, &[error_reply(2, -32603, "boom")]).await;

    let response = proxy
        .router()
        .oneshot(json_post("/weather/get_forecast", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers()["x-mcp-error-code"], "-32603");
}

#[tokio::test]
async fn not_ready_session_returns_503_with_retry_after() {
    let mut proxy = proxy();
    proxy.start().await.unwrap();
    // the manifest session talks to `cat`, which never answers initialize

    let response = proxy
        .router()
        .oneshot(json_post("/weather/get_forecast", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key("retry-after"));
    let body = body_json(response).await;
    assert_eq!(body["error"], "server_not_ready");
}

#[tokio::test]
async fn raw_json_rpc_forwarding_keeps_caller_id() {
    let mut proxy = proxy();
    proxy.start().await.unwrap();
    install_backend(&proxy, &[forecast_tools_reply(2)]).await;

    let request = Request::post("/weather")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {API_KEY}"))
        .body(Body::from(
            json!({"jsonrpc": "2.0", "method": "tools/list", "id": 99}).to_string(),
        ))
        .unwrap();
    let response = proxy.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], 99);
    assert_eq!(body["result"]["tools"][0]["name"], "get_forecast");
}

#[tokio::test]
async fn scope_denied_with_narrow_token() {
    use crate::support::form_post;
    use mcp_compose_test_utils::{PKCE_CHALLENGE_S256, PKCE_VERIFIER};

    let mut proxy = proxy();
    proxy.start().await.unwrap();

    // obtain a token carrying only mcp:resources
    let authorize = format!(
        "/oauth/authorize?response_type=code&client_id=pub1&redirect_uri=http://c/cb\
         &scope=mcp:resources&code_challenge={PKCE_CHALLENGE_S256}&code_challenge_method=S256"
    );
    let response = proxy
        .router()
        .oneshot(Request::get(authorize.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let location = response.headers()["location"].to_str().unwrap();
    let code = url::Url::parse(location)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "code")
        .unwrap()
        .1
        .to_string();
    let body = format!(
        "grant_type=authorization_code&code={code}&redirect_uri=http://c/cb\
         &client_id=pub1&code_verifier={PKCE_VERIFIER}"
    );
    let response = proxy
        .router()
        .oneshot(form_post("/oauth/token", body))
        .await
        .unwrap();
    let token = body_json(response).await["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    // tool routes require mcp:tools
    let request = Request::post("/weather/get_forecast")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from("{}"))
        .unwrap();
    let response = proxy.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "insufficient_scope");
}

#[tokio::test]
async fn discovery_and_openapi_reflect_backend_tools() {
    let mut proxy = proxy();
    proxy.start().await.unwrap();
    // discovery's tools/list is the first post-handshake request (id 2)
    install_backend(&proxy, &[forecast_tools_reply(2)]).await;

    let response = proxy
        .router()
        .oneshot(
            Request::get("/api/discovery")
                .header("authorization", format!("Bearer {API_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let inventory = body_json(response).await;
    assert_eq!(inventory["servers"][0]["name"], "weather");
    assert_eq!(
        inventory["servers"][0]["tools"][0]["name"],
        "get_forecast"
    );

    // the aggregate OpenAPI document carries the same tool (cached
    // discovery answers, so the backend is not asked again)
    let response = proxy
        .router()
        .oneshot(
            Request::get("/openapi.json")
                .header("authorization", format!("Bearer {API_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let document = body_json(response).await;
    assert!(document["paths"]
        .as_object()
        .unwrap()
        .contains_key("/weather/get_forecast"));
    assert_eq!(document["openapi"], "3.1.0");
}
