use super::support::{Harness, QUERY};
use parley_core::format::{FormatterEngine, NodeKind};
use parley_core::media::MediaHints;
use parley_core::state::{ChatSession, Sender};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

fn session(harness: &Harness) -> ChatSession {
    ChatSession::new(harness.api.clone(), FormatterEngine::new(MediaHints::default()))
}

#[tokio::test]
async fn records_both_sides_of_the_exchange() {
    let harness = Harness::start().await.signed_in("a", "r");
    Mock::given(method("POST"))
        .and(path(QUERY))
        .and(body_json(json!({"query": "What is Rust?"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "A **systems** language.",
            "llm_used": "gpt-4o"
        })))
        .expect(1)
        .mount(&harness.server)
        .await;

    let chat = session(&harness);
    let reply = chat
        .send_message("  What is Rust?  ", &[])
        .await
        .expect("reply");
    assert_eq!(reply.sender, Sender::Assistant);
    assert_eq!(reply.llm_used.as_deref(), Some("gpt-4o"));

    let messages = chat.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender, Sender::User);
    assert_eq!(messages[0].text, "What is Rust?");
    assert_eq!(messages[1].text, "A **systems** language.");
    assert!(!chat.is_loading());
    assert_eq!(chat.last_error(), None);

    let nodes = chat.render(&messages[1]);
    assert!(nodes
        .iter()
        .any(|node| matches!(node.kind, NodeKind::Bold { .. })));
}

#[tokio::test]
async fn blank_input_is_ignored() {
    let harness = Harness::start().await.signed_in("a", "r");
    let chat = session(&harness);
    assert!(chat.send_message("   \n", &[]).await.is_none());
    assert!(chat.messages().is_empty());
    let requests = harness.server.received_requests().await.expect("recording");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn failures_become_error_messages() {
    let harness = Harness::start().await.signed_in("a", "r");
    Mock::given(method("POST"))
        .and(path(QUERY))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"detail": "Model unavailable"})),
        )
        .mount(&harness.server)
        .await;

    let chat = session(&harness);
    let reply = chat.send_message("hello", &[]).await.expect("reply");
    assert_eq!(reply.text, "Error: Model unavailable");
    assert_eq!(reply.llm_used, None);
    assert_eq!(chat.last_error().as_deref(), Some("Model unavailable"));
    assert_eq!(chat.messages().len(), 2);

    chat.clear_error();
    assert_eq!(chat.last_error(), None);
}

#[tokio::test]
async fn image_replies_render_as_media() {
    let harness = Harness::start().await.signed_in("a", "r");
    let payload = json!({"image_base64": "aGVsbG8=", "seed": "7"}).to_string();
    Mock::given(method("POST"))
        .and(path(QUERY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": payload,
            "llm_used": "stability"
        })))
        .mount(&harness.server)
        .await;

    let chat = session(&harness);
    let reply = chat.send_message("draw a cat", &[]).await.expect("reply");
    let nodes = chat.render(&reply);
    assert_eq!(nodes.len(), 1);
    let NodeKind::Media(media) = &nodes[0].kind else {
        panic!("expected media node, got {nodes:?}");
    };
    assert_eq!(media.metadata("seed"), Some("7"));
}
