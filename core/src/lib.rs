pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod format;
pub mod http;
pub mod media;
pub mod refresh;
pub mod state;
pub mod store;
pub mod telemetry;

pub use api::{ApiClient, FileAttachment, QueryResponse};
pub use auth::{LoginRequest, LoginResponse, RegisterRequest, TokenState, User};
pub use config::{ApiSettings, ClientSettings, ConfigError};
pub use error::{extract_error_message, ErrorKind, HttpError};
pub use format::{format_response, DisplayNode, FormatterEngine, ListKind, NodeKind};
pub use http::{AuthHttpClient, MultipartBody, RequestBody, RequestOptions, SessionEvent};
pub use media::{MediaHints, MediaKind, StructuredMedia};
pub use refresh::{RefreshCoordinator, RefreshError};
pub use state::{ChatMessage, ChatSession, Sender};
pub use store::{SessionStore, StoreError, TokenStore};
