use crate::api::{ApiClient, FileAttachment};
use crate::format::{DisplayNode, FormatterEngine};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::error;
use uuid::Uuid;

/// How long a send error stays visible before it clears itself.
pub const ERROR_DISPLAY: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub llm_used: Option<String>,
}

impl ChatMessage {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            text: text.into(),
            created_at: Utc::now(),
            llm_used: None,
        }
    }

    pub fn with_llm(mut self, llm_used: Option<String>) -> Self {
        self.llm_used = llm_used;
        self
    }
}

#[derive(Debug)]
struct SendError {
    message: String,
    raised_at: Instant,
}

#[derive(Debug, Default)]
struct SessionState {
    messages: Vec<ChatMessage>,
    loading: bool,
    error: Option<SendError>,
}

impl SessionState {
    fn visible_error(&self) -> Option<&SendError> {
        self.error
            .as_ref()
            .filter(|err| err.raised_at.elapsed() < ERROR_DISPLAY)
    }
}

/// Conversation with the backend: message history, loading flag and the latest error.
#[derive(Clone)]
pub struct ChatSession {
    api: ApiClient,
    formatter: Arc<FormatterEngine>,
    state: Arc<RwLock<SessionState>>,
}

impl ChatSession {
    pub fn new(api: ApiClient, formatter: FormatterEngine) -> Self {
        Self {
            api,
            formatter: Arc::new(formatter),
            state: Arc::new(RwLock::new(SessionState::default())),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state.read().messages.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().loading
    }

    /// The most recent send error, until it is cleared or [`ERROR_DISPLAY`] elapses.
    pub fn last_error(&self) -> Option<String> {
        self.state
            .read()
            .visible_error()
            .map(|err| err.message.clone())
    }

    pub fn clear_error(&self) {
        self.state.write().error = None;
    }

    /// Sends `text` as a query and records both sides of the exchange.
    ///
    /// Blank input is ignored and returns `None`. On failure the reply is an
    /// assistant message reading `Error: <message>`.
    pub async fn send_message(
        &self,
        text: &str,
        attachments: &[FileAttachment],
    ) -> Option<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        {
            let mut state = self.state.write();
            state.messages.push(ChatMessage::new(Sender::User, text));
            state.loading = true;
            state.error = None;
        }

        let outcome = self.api.send_query(text, attachments).await;

        let mut state = self.state.write();
        state.loading = false;
        let reply = match outcome {
            Ok(response) => {
                ChatMessage::new(Sender::Assistant, response.response).with_llm(response.llm_used)
            }
            Err(err) => {
                error!(%err, "error sending message");
                let message = err.user_message();
                state.error = Some(SendError {
                    message: message.clone(),
                    raised_at: Instant::now(),
                });
                ChatMessage::new(Sender::Assistant, format!("Error: {message}"))
            }
        };
        state.messages.push(reply.clone());
        Some(reply)
    }

    /// Display nodes for a message. Assistant replies use their model as the formatter hint.
    pub fn render(&self, message: &ChatMessage) -> Vec<DisplayNode> {
        match message.sender {
            Sender::User => self.formatter.format(&message.text, None),
            Sender::Assistant => self
                .formatter
                .format(&message.text, message.llm_used.as_deref()),
        }
    }
}
