use super::support::{Harness, LOGIN, QUERY, REFRESH, REGISTER};
use parley_core::auth::{LoginRequest, RegisterRequest, User};
use parley_core::error::{ErrorKind, HttpError};
use parley_core::http::SessionEvent;
use parley_core::store::{SessionStore, TokenStore};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

fn ada() -> User {
    User {
        id: "u-1".into(),
        email: "ada@example.com".into(),
        display_name: "Ada".into(),
    }
}

fn session_body() -> serde_json::Value {
    json!({
        "token": "access-1",
        "refresh_token": "refresh-1",
        "user": {"id": "u-1", "email": "ada@example.com", "display_name": "Ada"}
    })
}

#[tokio::test]
async fn login_persists_session() {
    let mut harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .and(body_json(json!({"email": "ada@example.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
        .expect(1)
        .mount(&harness.server)
        .await;

    let response = harness
        .api
        .login(&LoginRequest::new("ada@example.com", "pw"))
        .await
        .expect("login");
    assert_eq!(response.user, ada());
    assert_eq!(harness.api.current_user(), Some(ada()));
    assert!(harness.api.is_authenticated());
    assert_eq!(
        harness.drain_events(),
        vec![SessionEvent::LoggedIn { user: ada() }]
    );

    let reopened = SessionStore::new(harness.store.root().to_path_buf());
    assert_eq!(reopened.tokens().access_token.as_deref(), Some("access-1"));
    assert_eq!(reopened.tokens().refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn register_persists_session() {
    let harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path(REGISTER))
        .and(body_json(json!({
            "display_name": "Ada",
            "email": "ada@example.com",
            "password": "Lovelace1843"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
        .expect(1)
        .mount(&harness.server)
        .await;

    harness
        .api
        .register(&RegisterRequest::new("Ada", "ada@example.com", "Lovelace1843"))
        .await
        .expect("register");
    assert_eq!(harness.store.user(), Some(ada()));
}

#[tokio::test]
async fn invalid_credentials_never_reach_backend() {
    let harness = Harness::start().await;
    let err = harness
        .api
        .register(&RegisterRequest::new("A", "not-an-email", "weak"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let HttpError::Validation(errors) = &err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(errors.fields.len(), 3);
    let requests = harness.server.received_requests().await.expect("recording");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn logout_clears_and_signals() {
    let mut harness = Harness::start().await.signed_in("a", "r");
    harness.store.set_user(&ada()).expect("seed user");

    harness.api.logout().expect("logout");
    assert!(!harness.api.is_authenticated());
    assert_eq!(harness.api.current_user(), None);
    assert_eq!(harness.drain_events(), vec![SessionEvent::LoggedOut]);
}

#[tokio::test]
async fn explicit_refresh_leaves_store_alone() {
    let harness = Harness::start().await.signed_in("a", "r1");
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .and(body_json(json!({"refresh_token": "r1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "b",
            "refresh_token": "r2"
        })))
        .expect(1)
        .mount(&harness.server)
        .await;

    let renewed = harness.api.refresh_token("r1").await.expect("refresh");
    assert_eq!(renewed.access_token, "b");
    assert_eq!(renewed.token_type, None);
    assert_eq!(harness.store.tokens().access_token.as_deref(), Some("a"));
}

#[tokio::test]
async fn token_rotated_elsewhere_is_reused() {
    let harness = Harness::start().await.signed_in("old", "r1");
    let rotate = harness.store.clone();
    Mock::given(method("POST"))
        .and(path(QUERY))
        .and(wiremock::matchers::header("authorization", "Bearer old"))
        .respond_with(move |_: &wiremock::Request| {
            rotate.set_tokens("new", "r2").expect("rotate");
            ResponseTemplate::new(401)
        })
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(QUERY))
        .and(wiremock::matchers::header("authorization", "Bearer new"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"response": "hi", "llm_used": null})),
        )
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&harness.server)
        .await;

    let response = harness.api.send_query("hello", &[]).await.expect("query");
    assert_eq!(response.response, "hi");
    assert_eq!(response.llm_used, None);
}
