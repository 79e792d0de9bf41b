use super::support::{bearer, Harness, LOGIN, QUERY, REFRESH};
use futures::future::join_all;
use parley_core::api::FileAttachment;
use parley_core::error::{ErrorKind, HttpError};
use parley_core::http::SessionEvent;
use parley_core::refresh::RefreshError;
use parley_core::store::TokenStore;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn renewed_tokens() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "fresh",
        "refresh_token": "r2",
        "token_type": "bearer"
    }))
}

fn answer(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"response": text, "llm_used": "gpt-4o"}))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_expiries_share_one_refresh() {
    let harness = Harness::start().await.signed_in("stale", "r1");
    Mock::given(method("POST"))
        .and(path(QUERY))
        .and(header("authorization", bearer("stale").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .and(body_json(json!({"refresh_token": "r1"})))
        .respond_with(renewed_tokens().set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(QUERY))
        .and(header("authorization", bearer("fresh").as_str()))
        .respond_with(answer("ok"))
        .expect(5)
        .mount(&harness.server)
        .await;

    let calls = (0..5).map(|i| {
        let api = harness.api.clone();
        async move { api.send_query(&format!("question {i}"), &[]).await }
    });
    let results = join_all(calls).await;

    for result in results {
        assert_eq!(result.expect("query succeeds after refresh").response, "ok");
    }
    assert_eq!(harness.store.tokens().access_token.as_deref(), Some("fresh"));
    assert!(!harness.api.http().is_refreshing());
    harness.server.verify().await;
}

#[tokio::test]
async fn refresh_endpoint_401_is_not_retried() {
    let harness = Harness::start().await.signed_in("a", "r1");
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Refresh token revoked"})),
        )
        .expect(1)
        .mount(&harness.server)
        .await;

    let err = harness.api.refresh_token("r1").await.unwrap_err();
    assert!(
        matches!(err, HttpError::AuthExpired { ref message } if message == "Refresh token revoked")
    );
    assert!(harness.store.tokens().is_authenticated());
}

#[tokio::test]
async fn login_401_passes_through() {
    let mut harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid credentials"})),
        )
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(renewed_tokens())
        .expect(0)
        .mount(&harness.server)
        .await;

    let request = parley_core::auth::LoginRequest::new("ada@example.com", "wrong");
    let err = harness.api.login(&request).await.unwrap_err();
    assert_eq!(err.user_message(), "Invalid credentials");
    assert!(harness.drain_events().is_empty());
}

#[tokio::test]
async fn second_401_after_refresh_is_final() {
    let harness = Harness::start().await.signed_in("a", "r1");
    Mock::given(method("POST"))
        .and(path(QUERY))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Not allowed"})))
        .expect(2)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(renewed_tokens())
        .expect(1)
        .mount(&harness.server)
        .await;

    let err = harness.api.send_query("hi", &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthExpired);
    assert_eq!(harness.store.tokens().access_token.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn failed_refresh_clears_session_and_signals() {
    let mut harness = Harness::start().await.signed_in("stale", "r1");
    Mock::given(method("POST"))
        .and(path(QUERY))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Refresh token expired"})),
        )
        .expect(1)
        .mount(&harness.server)
        .await;

    let err = harness.api.send_query("hi", &[]).await.unwrap_err();
    assert!(matches!(
        err,
        HttpError::RefreshFailed(RefreshError::Rejected { status: 401, ref message })
            if message == "Refresh token expired"
    ));
    assert!(!harness.store.tokens().is_authenticated());
    assert!(harness.store.user().is_none());
    let events = harness.drain_events();
    assert!(matches!(
        events.as_slice(),
        [SessionEvent::Invalidated { .. }]
    ));
}

#[tokio::test]
async fn missing_refresh_token_skips_the_call() {
    let mut harness = Harness::start().await;
    std::fs::write(
        harness.store.root().join("session.json"),
        r#"{"auth_token":"only-access"}"#,
    )
    .expect("seed session");
    harness.store.reload();
    Mock::given(method("POST"))
        .and(path(QUERY))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(renewed_tokens())
        .expect(0)
        .mount(&harness.server)
        .await;

    let err = harness.api.send_query("hi", &[]).await.unwrap_err();
    assert!(matches!(
        err,
        HttpError::RefreshFailed(RefreshError::MissingRefreshToken)
    ));
    assert!(matches!(
        harness.drain_events().as_slice(),
        [SessionEvent::Invalidated { .. }]
    ));
}

#[tokio::test]
async fn forbidden_and_validation_errors_propagate() {
    let harness = Harness::start().await.signed_in("a", "r1");
    Mock::given(method("POST"))
        .and(path(QUERY))
        .and(body_json(json!({"query": "secret"})))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"detail": "Admins only"})),
        )
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(QUERY))
        .and(body_json(json!({"query": "bad"})))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": [
                {"loc": ["body", "query"], "msg": "field required"},
                {"loc": ["body", "files"], "msg": "too many files"}
            ]
        })))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(renewed_tokens())
        .expect(0)
        .mount(&harness.server)
        .await;

    let err = harness.api.send_query("secret", &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(err.user_message(), "Admins only");

    let err = harness.api.send_query("bad", &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.user_message(), "field required, too many files");
}

#[tokio::test]
async fn slow_backend_times_out() {
    let harness = Harness::with_timeout(Duration::from_millis(100))
        .await
        .signed_in("a", "r1");
    Mock::given(method("POST"))
        .and(path(QUERY))
        .respond_with(answer("late").set_delay(Duration::from_secs(2)))
        .mount(&harness.server)
        .await;

    let err = harness.api.send_query("hi", &[]).await.unwrap_err();
    assert!(matches!(err, HttpError::Timeout));
    assert_eq!(
        err.user_message(),
        "The request timed out. Please try again."
    );
}

#[tokio::test]
async fn multipart_body_is_replayed_intact() {
    let harness = Harness::start().await.signed_in("stale", "r1");
    Mock::given(method("POST"))
        .and(path(QUERY))
        .and(header("authorization", bearer("stale").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(renewed_tokens())
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(QUERY))
        .and(header("authorization", bearer("fresh").as_str()))
        .respond_with(answer("summarised"))
        .expect(1)
        .mount(&harness.server)
        .await;

    let attachment = FileAttachment::new("notes.txt", "text/plain", b"remember the milk".to_vec());
    let response = harness
        .api
        .send_query("summarise", &[attachment])
        .await
        .expect("query with attachment");
    assert_eq!(response.response, "summarised");

    let requests = harness.server.received_requests().await.expect("recording");
    let queries: Vec<_> = requests
        .iter()
        .filter(|request| request.url.path() == QUERY)
        .collect();
    assert_eq!(queries.len(), 2);
    for request in queries {
        let content_type = request
            .headers
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("multipart/form-data"));
        let body = String::from_utf8_lossy(&request.body);
        assert!(body.contains("name=\"query\""));
        assert!(body.contains("summarise"));
        assert!(body.contains("name=\"files\"; filename=\"notes.txt\""));
        assert!(body.contains("remember the milk"));
    }
}
