//! Typed calls against the chat backend.

use crate::auth::{
    LoginRequest, LoginResponse, RefreshTokenRequest, RefreshTokenResponse, RegisterRequest, User,
    LOGIN_PATH, REFRESH_PATH, REGISTER_PATH,
};
use crate::error::HttpError;
use crate::http::{AuthHttpClient, MultipartBody, RequestBody, RequestOptions, SessionEvent};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const QUERY_PATH: &str = "/api/v1/query";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryResponse {
    pub response: String,
    /// Name of the model or provider that answered; doubles as the formatter hint.
    #[serde(default)]
    pub llm_used: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

/// A file sent alongside a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileAttachment {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let mime_type = guess_mime_type(path).to_string();
        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }
}

fn guess_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("txt") | Some("md") => "text/plain",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        _ => "application/octet-stream",
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: AuthHttpClient,
}

impl ApiClient {
    pub fn new(http: AuthHttpClient) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &AuthHttpClient {
        &self.http
    }

    pub fn is_authenticated(&self) -> bool {
        self.http.store().tokens().is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.http.store().user()
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, HttpError> {
        request.validate()?;
        let response: LoginResponse = self.http.post_json(LOGIN_PATH, request).await?.json()?;
        self.start_session(&response)?;
        Ok(response)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<LoginResponse, HttpError> {
        request.validate()?;
        let response: LoginResponse = self.http.post_json(REGISTER_PATH, request).await?.json()?;
        self.start_session(&response)?;
        Ok(response)
    }

    fn start_session(&self, response: &LoginResponse) -> Result<(), HttpError> {
        let store = self.http.store();
        store.set_tokens(&response.token, &response.refresh_token)?;
        store.set_user(&response.user)?;
        info!(user = %response.user.email, "session started");
        self.http.publish(SessionEvent::LoggedIn {
            user: response.user.clone(),
        });
        Ok(())
    }

    /// Exchanges a refresh token directly. The stored session is left untouched.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshTokenResponse, HttpError> {
        let body = RefreshTokenRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.http.post_json(REFRESH_PATH, &body).await?.json()
    }

    pub async fn send_query(
        &self,
        query: &str,
        attachments: &[FileAttachment],
    ) -> Result<QueryResponse, HttpError> {
        let body = if attachments.is_empty() {
            RequestBody::json(&QueryRequest { query })?
        } else {
            let form = attachments
                .iter()
                .fold(MultipartBody::new().text("query", query), |form, file| {
                    form.file(
                        "files",
                        file.file_name.clone(),
                        Some(file.mime_type.clone()),
                        file.bytes.clone(),
                    )
                });
            RequestBody::Multipart(form)
        };
        self.http
            .request(Method::POST, QUERY_PATH, body, RequestOptions::default())
            .await?
            .json()
    }

    pub fn logout(&self) -> Result<(), HttpError> {
        self.http.store().clear()?;
        info!("logged out");
        self.http.publish(SessionEvent::LoggedOut);
        Ok(())
    }
}
