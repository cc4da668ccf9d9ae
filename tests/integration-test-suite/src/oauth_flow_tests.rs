//! OAuth 2.1 round trips through the mounted endpoints.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::util::ServiceExt;

use mcp_compose_test_utils::{PKCE_CHALLENGE_S256, PKCE_VERIFIER};

use crate::support::{body_json, form_post, proxy};

fn authorize_uri(scope: &str) -> String {
    format!(
        "/oauth/authorize?response_type=code&client_id=pub1&redirect_uri=http://c/cb\
         &scope={scope}&state=xyz&code_challenge={PKCE_CHALLENGE_S256}&code_challenge_method=S256"
    )
}

/// Drive `/oauth/authorize` and pull the code out of the redirect.
async fn obtain_code(proxy: &mcp_compose_proxy::ProxyServer, scope: &str) -> String {
    let response = proxy
        .router()
        .oneshot(
            Request::get(authorize_uri(scope))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()["location"].to_str().unwrap().to_string();
    let parsed = url::Url::parse(&location).unwrap();
    assert_eq!(
        parsed.query_pairs().find(|(k, _)| k == "state").unwrap().1,
        "xyz"
    );
    parsed
        .query_pairs()
        .find(|(k, _)| k == "code")
        .expect("code in redirect")
        .1
        .to_string()
}

async fn exchange_code(
    proxy: &mcp_compose_proxy::ProxyServer,
    code: &str,
) -> (StatusCode, Value) {
    let body = format!(
        "grant_type=authorization_code&code={code}&redirect_uri=http://c/cb\
         &client_id=pub1&code_verifier={PKCE_VERIFIER}"
    );
    let response = proxy
        .router()
        .oneshot(form_post("/oauth/token", body))
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn introspect(proxy: &mcp_compose_proxy::ProxyServer, token: &str) -> Value {
    let body = format!("token={token}&client_id=pub1");
    let response = proxy
        .router()
        .oneshot(form_post("/oauth/introspect", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn pkce_happy_path() {
    let proxy = proxy();
    let code = obtain_code(&proxy, "mcp:tools").await;

    let (status, tokens) = exchange_code(&proxy, &code).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["scope"], "mcp:tools");
    assert!(tokens["refresh_token"].is_string());

    let access = tokens["access_token"].as_str().unwrap();
    let info = introspect(&proxy, access).await;
    assert_eq!(info["active"], true);
    assert_eq!(info["client_id"], "pub1");
    assert_eq!(info["username"], "system_user");
    assert_eq!(info["scope"], "mcp:tools");
}

#[tokio::test]
async fn token_response_is_uncacheable() {
    let proxy = proxy();
    let code = obtain_code(&proxy, "mcp:tools").await;
    let body = format!(
        "grant_type=authorization_code&code={code}&redirect_uri=http://c/cb\
         &client_id=pub1&code_verifier={PKCE_VERIFIER}"
    );
    let response = proxy
        .router()
        .oneshot(form_post("/oauth/token", body))
        .await
        .unwrap();
    assert_eq!(response.headers()["cache-control"], "no-store");
    assert_eq!(response.headers()["pragma"], "no-cache");
}

#[tokio::test]
async fn code_replay_fails_and_revokes_first_grant() {
    let proxy = proxy();
    let code = obtain_code(&proxy, "mcp:tools").await;

    let (status, tokens) = exchange_code(&proxy, &code).await;
    assert_eq!(status, StatusCode::OK);
    let access = tokens["access_token"].as_str().unwrap().to_string();

    // second exchange of the same code
    let (status, error) = exchange_code(&proxy, &code).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "invalid_grant");

    // the tokens issued by the first exchange are dead
    let info = introspect(&proxy, &access).await;
    assert_eq!(info, serde_json::json!({"active": false}));
}

#[tokio::test]
async fn wrong_verifier_rejected() {
    let proxy = proxy();
    let code = obtain_code(&proxy, "mcp:tools").await;
    let body = format!(
        "grant_type=authorization_code&code={code}&redirect_uri=http://c/cb\
         &client_id=pub1&code_verifier={}",
        "a".repeat(50)
    );
    let response = proxy
        .router()
        .oneshot(form_post("/oauth/token", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn refresh_rotation_and_replay_hardening() {
    let proxy = proxy();
    let code = obtain_code(&proxy, "mcp:tools").await;
    let (_, tokens) = exchange_code(&proxy, &code).await;
    let r1 = tokens["refresh_token"].as_str().unwrap().to_string();

    // rotate: r1 -> r2
    let body = format!("grant_type=refresh_token&refresh_token={r1}&client_id=pub1");
    let response = proxy
        .router()
        .oneshot(form_post("/oauth/token", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = body_json(response).await;
    let r2 = rotated["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(r1, r2);

    // replaying r1 fails and kills r2 as well
    let body = format!("grant_type=refresh_token&refresh_token={r1}&client_id=pub1");
    let response = proxy
        .router()
        .oneshot(form_post("/oauth/token", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = format!("grant_type=refresh_token&refresh_token={r2}&client_id=pub1");
    let response = proxy
        .router()
        .oneshot(form_post("/oauth/token", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn revoke_makes_token_inactive() {
    let proxy = proxy();
    let code = obtain_code(&proxy, "mcp:tools").await;
    let (_, tokens) = exchange_code(&proxy, &code).await;
    let access = tokens["access_token"].as_str().unwrap().to_string();

    let body = format!("token={access}&client_id=pub1");
    let response = proxy
        .router()
        .oneshot(form_post("/oauth/revoke", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        introspect(&proxy, &access).await,
        serde_json::json!({"active": false})
    );
}

#[tokio::test]
async fn unregistered_redirect_uri_is_rejected_without_redirect() {
    let proxy = proxy();
    let uri = format!(
        "/oauth/authorize?response_type=code&client_id=pub1&redirect_uri=http://evil/cb\
         &code_challenge={PKCE_CHALLENGE_S256}&code_challenge_method=S256"
    );
    let response = proxy
        .router()
        .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn public_client_without_challenge_redirects_invalid_request() {
    let proxy = proxy();
    let uri = "/oauth/authorize?response_type=code&client_id=pub1&redirect_uri=http://c/cb&state=s1";
    let response = proxy
        .router()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()["location"].to_str().unwrap();
    assert!(location.starts_with("http://c/cb"));
    assert!(location.contains("error=invalid_request"));
    assert!(location.contains("state=s1"));
}

#[tokio::test]
async fn dynamic_registration_round_trip() {
    let proxy = proxy();
    let request = Request::post("/oauth/register")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "client_name": "generated",
                "redirect_uris": ["http://localhost:3000/cb"]
            })
            .to_string(),
        ))
        .unwrap();
    let response = proxy.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let registered = body_json(response).await;
    assert!(registered["client_id"]
        .as_str()
        .unwrap()
        .starts_with("mcp_"));
    let secret = registered["client_secret"].as_str().unwrap();
    assert!(secret.len() >= 64);
    assert!(registered["client_secret_expires_at"].as_u64().unwrap() > 0);

    // the new confidential client can run client_credentials
    let body = format!(
        "grant_type=client_credentials&client_id={}&client_secret={secret}&scope=mcp:tools",
        registered["client_id"].as_str().unwrap()
    );
    let response = proxy
        .router()
        .oneshot(form_post("/oauth/token", body))
        .await
        .unwrap();
    // default registration grants exclude client_credentials
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn discovery_metadata_only_answers_get() {
    let proxy = proxy();
    let response = proxy
        .router()
        .oneshot(
            Request::get("/.well-known/oauth-authorization-server")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let metadata = body_json(response).await;
    assert_eq!(metadata["issuer"], "http://localhost:9876");
    assert!(metadata["grant_types_supported"]
        .as_array()
        .unwrap()
        .iter()
        .any(|g| g == "refresh_token"));

    let response = proxy
        .router()
        .oneshot(
            Request::post("/.well-known/oauth-authorization-server")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn unknown_grant_type_reported() {
    let proxy = proxy();
    let response = proxy
        .router()
        .oneshot(form_post(
            "/oauth/token",
            "grant_type=password&client_id=pub1".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "unsupported_grant_type"
    );
}
