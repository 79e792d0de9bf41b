use crate::auth::{TokenState, User};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

const SESSION_FILE: &str = "session.json";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("session store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session record could not be encoded: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persisted credentials read before every outbound request.
pub trait TokenStore: Send + Sync {
    fn tokens(&self) -> TokenState;
    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StoreError>;
    fn user(&self) -> Option<User>;
    fn set_user(&self, user: &User) -> Result<(), StoreError>;
    /// Removes tokens and user.
    fn clear(&self) -> Result<(), StoreError>;
    /// Notified whenever the token pair changes, including when it is cleared.
    fn subscribe(&self) -> watch::Receiver<TokenState>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionRecord {
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

impl SessionRecord {
    fn tokens(&self) -> TokenState {
        TokenState {
            access_token: self.auth_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

/// File-backed session kept in `session.json` under a root directory.
#[derive(Clone)]
pub struct SessionStore {
    root: PathBuf,
    record: Arc<RwLock<SessionRecord>>,
    changes: Arc<watch::Sender<TokenState>>,
}

impl SessionStore {
    pub fn new(root: PathBuf) -> Self {
        fs::create_dir_all(&root).ok();
        let record = read_record(&root.join(SESSION_FILE));
        let (changes, _) = watch::channel(record.tokens());
        Self {
            root,
            record: Arc::new(RwLock::new(record)),
            changes: Arc::new(changes),
        }
    }

    pub fn in_memory() -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("parley-{}", Uuid::new_v4()));
        Self::new(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_path(&self) -> PathBuf {
        self.root.join(SESSION_FILE)
    }

    /// Re-reads the session file so changes made by another process are observed.
    pub fn reload(&self) -> TokenState {
        let fresh = read_record(&self.session_path());
        let tokens = fresh.tokens();
        *self.record.write() = fresh;
        self.publish(tokens.clone());
        tokens
    }

    fn publish(&self, tokens: TokenState) {
        self.changes.send_if_modified(|current| {
            if *current == tokens {
                false
            } else {
                *current = tokens;
                true
            }
        });
    }

    fn persist(&self, record: &SessionRecord) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let serialized = serde_json::to_vec_pretty(record)?;
        fs::write(self.session_path(), serialized)?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut SessionRecord)) -> Result<(), StoreError> {
        let tokens = {
            let mut record = self.record.write();
            apply(&mut record);
            self.persist(&record)?;
            record.tokens()
        };
        self.publish(tokens);
        Ok(())
    }
}

fn read_record(path: &Path) -> SessionRecord {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(%err, path = %path.display(), "discarding malformed session file");
            SessionRecord::default()
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => SessionRecord::default(),
        Err(err) => {
            tracing::warn!(%err, path = %path.display(), "failed to read session file");
            SessionRecord::default()
        }
    }
}

impl TokenStore for SessionStore {
    fn tokens(&self) -> TokenState {
        self.record.read().tokens()
    }

    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StoreError> {
        self.update(|record| {
            record.auth_token = Some(access_token.to_string());
            record.refresh_token = Some(refresh_token.to_string());
        })
    }

    fn user(&self) -> Option<User> {
        self.record.read().user.clone()
    }

    fn set_user(&self, user: &User) -> Result<(), StoreError> {
        self.update(|record| record.user = Some(user.clone()))
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.record.write() = SessionRecord::default();
        match fs::remove_file(self.session_path()) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        self.publish(TokenState::default());
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<TokenState> {
        self.changes.subscribe()
    }
}
