use crate::auth::{is_auth_endpoint, RefreshTokenRequest, RefreshTokenResponse, User, REFRESH_PATH};
use crate::config::ApiSettings;
use crate::error::{extract_error_message, HttpError};
use crate::refresh::{RefreshCoordinator, RefreshError};
use crate::store::TokenStore;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use url::Url;

/// Session lifecycle notifications for the application shell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    LoggedIn { user: User },
    Refreshed,
    /// The session is gone and the user must sign in again.
    Invalidated { reason: String },
    LoggedOut,
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(MultipartBody),
}

impl RequestBody {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HttpError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }
}

/// Multipart fields held as owned data so the form can be rebuilt for a replay.
#[derive(Debug, Clone, Default)]
pub struct MultipartBody {
    parts: Vec<FormPart>,
}

#[derive(Debug, Clone)]
enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime_type: Option<String>,
        bytes: Vec<u8>,
    },
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(FormPart::File {
            name: name.into(),
            file_name: file_name.into(),
            mime_type,
            bytes,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn to_form(&self) -> Result<Form, HttpError> {
        let mut form = Form::new();
        for part in &self.parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
                FormPart::File {
                    name,
                    file_name,
                    mime_type,
                    bytes,
                } => {
                    let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                    if let Some(mime) = mime_type {
                        file = file.mime_str(mime).map_err(HttpError::Transport)?;
                    }
                    form.part(name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the client-wide timeout for this request.
    pub timeout: Option<Duration>,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// HTTP client that attaches the stored bearer token and renews it on 401.
#[derive(Clone)]
pub struct AuthHttpClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: Url,
    store: Arc<dyn TokenStore>,
    refresh: RefreshCoordinator,
    events_tx: UnboundedSender<SessionEvent>,
}

impl AuthHttpClient {
    pub fn new(
        settings: &ApiSettings,
        store: Arc<dyn TokenStore>,
    ) -> Result<(Self, UnboundedReceiver<SessionEvent>), HttpError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(HttpError::Transport)?;
        let mut base_url = settings.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let (events_tx, events_rx) = unbounded_channel();
        Ok((
            Self {
                inner: Arc::new(Inner {
                    http,
                    base_url,
                    store,
                    refresh: RefreshCoordinator::new(),
                    events_tx,
                }),
            },
            events_rx,
        ))
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.store
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh.is_refreshing()
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        if self.inner.events_tx.send(event).is_err() {
            debug!("no listener for session events");
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, HttpError> {
        self.request(Method::GET, path, RequestBody::Empty, RequestOptions::default())
            .await
    }

    pub async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<ApiResponse, HttpError> {
        self.request(
            Method::POST,
            path,
            RequestBody::json(body)?,
            RequestOptions::default(),
        )
        .await
    }

    /// Sends a request, renewing the access token once if the backend answers 401.
    ///
    /// Auth endpoints are never renewed. A request replayed with a fresh token
    /// that still gets 401 fails with [`HttpError::AuthExpired`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> Result<ApiResponse, HttpError> {
        let sent_with = self.inner.store.tokens().access_token;
        let response = self
            .send(&method, path, &body, &options, sent_with.as_deref())
            .await?;
        if response.status != StatusCode::UNAUTHORIZED || is_auth_endpoint(path) {
            return finish(path, response);
        }

        info!(%method, path, "access token rejected, renewing session");
        let token = self.renew(sent_with.as_deref()).await?;
        let replay = self
            .send(&method, path, &body, &options, Some(&token))
            .await?;
        if replay.status == StatusCode::UNAUTHORIZED {
            warn!(%method, path, "request rejected again after token refresh");
        }
        finish(path, replay)
    }

    async fn renew(&self, sent_with: Option<&str>) -> Result<String, HttpError> {
        if let Some(current) = self.inner.store.tokens().access_token {
            if sent_with != Some(current.as_str()) {
                debug!("access token rotated while request was in flight");
                return Ok(current);
            }
        }
        let token = self
            .inner
            .refresh
            .run(|| self.refresh_session())
            .await?;
        Ok(token)
    }

    /// Leader side of a refresh: exchange the token and apply the outcome to the session.
    async fn refresh_session(&self) -> Result<String, RefreshError> {
        let outcome = self.exchange_refresh_token().await;
        match &outcome {
            Ok(_) => {
                info!("session refreshed");
                self.publish(SessionEvent::Refreshed);
            }
            Err(err) => {
                warn!(%err, "token refresh failed, clearing session");
                if let Err(store_err) = self.inner.store.clear() {
                    warn!(%store_err, "failed to clear session store");
                }
                self.publish(SessionEvent::Invalidated {
                    reason: err.to_string(),
                });
            }
        }
        outcome
    }

    async fn exchange_refresh_token(&self) -> Result<String, RefreshError> {
        let tokens = self.inner.store.tokens();
        let refresh_token = tokens
            .refresh_token
            .ok_or(RefreshError::MissingRefreshToken)?;
        let body = RequestBody::json(&RefreshTokenRequest { refresh_token })
            .map_err(|err| RefreshError::Malformed(err.to_string()))?;
        let response = self
            .send(
                &Method::POST,
                REFRESH_PATH,
                &body,
                &RequestOptions::default(),
                tokens.access_token.as_deref(),
            )
            .await
            .map_err(|err| RefreshError::Transport(err.to_string()))?;
        if !response.status.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status.as_u16(),
                message: extract_error_message(&response.body),
            });
        }
        let renewed: RefreshTokenResponse = response
            .json()
            .map_err(|err| RefreshError::Malformed(err.to_string()))?;
        self.inner
            .store
            .set_tokens(&renewed.access_token, &renewed.refresh_token)
            .map_err(|err| RefreshError::Store(err.to_string()))?;
        Ok(renewed.access_token)
    }

    async fn send(
        &self,
        method: &Method,
        path: &str,
        body: &RequestBody,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> Result<ApiResponse, HttpError> {
        let url = self.inner.base_url.join(path.trim_start_matches('/'))?;
        let mut builder = self.inner.http.request(method.clone(), url);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(parts) => builder.multipart(parts.to_form()?),
        };

        debug!(%method, path, "API request");
        let response = builder.send().await.map_err(|err| {
            let err = HttpError::from_transport(err);
            if matches!(err, HttpError::Timeout) {
                warn!(%method, path, "request timeout");
            } else {
                warn!(%method, path, %err, "request failed");
            }
            err
        })?;
        let status = response.status();
        let body = response.text().await.map_err(HttpError::from_transport)?;
        debug!(%status, path, "API response");
        Ok(ApiResponse { status, body })
    }
}

fn finish(path: &str, response: ApiResponse) -> Result<ApiResponse, HttpError> {
    if response.status.is_success() {
        return Ok(response);
    }
    let err = HttpError::from_status(response.status, &response.body);
    match &err {
        HttpError::Forbidden { .. } => warn!(path, "access denied"),
        _ => warn!(path, status = %response.status, "API error"),
    }
    Err(err)
}
