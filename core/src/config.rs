use crate::media::MediaHints;
use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

const ENV_API_URL: &str = "PARLEY_API_URL";
const ENV_TIMEOUT_SECS: &str = "PARLEY_TIMEOUT_SECS";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api: ApiSettings,
    pub session_dir: PathBuf,
    pub media: MediaHints,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub timeout: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    Missing(PathBuf),
    #[error("configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Missing(path) => format!("No configuration at {}.", path.display()),
            Self::Invalid(detail) => format!("Configuration invalid: {detail}. Update parley.yaml."),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

fn default_base_url() -> Url {
    match Url::parse(DEFAULT_BASE_URL) {
        Ok(url) => url,
        Err(err) => unreachable!("default base url is valid: {err}"),
    }
}

impl ClientSettings {
    /// Loads `parley.yaml` from the first standard location that has one,
    /// falling back to defaults, then applies `PARLEY_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let file = match locate_config_file() {
            Some(path) => read_config(&path)?,
            None => ParleyConfig::default(),
        };
        let settings = resolve_settings(file, default_session_dir())?;
        apply_env_overrides(settings, |key| std::env::var(key).ok())
    }

    /// Loads an explicitly named file. Unlike [`ClientSettings::load`] the file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let settings = resolve_settings(read_config(path)?, default_session_dir())?;
        apply_env_overrides(settings, |key| std::env::var(key).ok())
    }
}

fn read_config(path: &Path) -> Result<ParleyConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| {
        ConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
    })?;
    parse_config(&contents)
}

fn parse_config(contents: &str) -> Result<ParleyConfig, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(ParleyConfig::default());
    }
    serde_yaml::from_str(contents)
        .map_err(|err| ConfigError::Invalid(format!("invalid parley.yaml: {err}")))
}

fn resolve_settings(
    config: ParleyConfig,
    default_session_dir: PathBuf,
) -> Result<ClientSettings, ConfigError> {
    let api_section = config.api.unwrap_or_default();
    let mut api = ApiSettings::default();
    if let Some(raw) = api_section.base_url {
        api.base_url = parse_base_url(&raw)?;
    }
    if let Some(secs) = api_section.timeout_secs {
        api.timeout = parse_timeout(secs)?;
    }
    let session_dir = config
        .session
        .and_then(|section| section.dir)
        .unwrap_or(default_session_dir);
    Ok(ClientSettings {
        api,
        session_dir,
        media: config.media.unwrap_or_default(),
    })
}

fn apply_env_overrides(
    mut settings: ClientSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ClientSettings, ConfigError> {
    if let Some(raw) = lookup(ENV_API_URL).filter(|value| !value.trim().is_empty()) {
        settings.api.base_url = parse_base_url(&raw)?;
    }
    if let Some(raw) = lookup(ENV_TIMEOUT_SECS).filter(|value| !value.trim().is_empty()) {
        let secs = raw.trim().parse::<u64>().map_err(|_| {
            ConfigError::Invalid(format!("{ENV_TIMEOUT_SECS} must be a whole number of seconds"))
        })?;
        settings.api.timeout = parse_timeout(secs)?;
    }
    Ok(settings)
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|err| ConfigError::Invalid(format!("invalid api base url `{raw}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!(
            "api base url must be http or https, got `{}`",
            url.scheme()
        )));
    }
    Ok(url)
}

fn parse_timeout(secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid(
            "api timeout must be at least one second".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

fn default_session_dir() -> PathBuf {
    match BaseDirs::new() {
        Some(base) => base.data_local_dir().join("parley"),
        None => PathBuf::from(".parley"),
    }
}

fn locate_config_file() -> Option<PathBuf> {
    parley_yaml_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn parley_yaml_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("parley");
        paths.push(config_dir.join("parley.yaml"));
        paths.push(config_dir.join("parley.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".parley").join("parley.yaml"));
        paths.push(home_dir.join(".parley").join("parley.yml"));
    } else {
        paths.push(PathBuf::from("parley.yaml"));
        paths.push(PathBuf::from("parley.yml"));
    }
    paths
}

#[derive(Debug, Default, Deserialize)]
struct ParleyConfig {
    api: Option<ApiSection>,
    session: Option<SessionSection>,
    media: Option<MediaHints>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSection {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionSection {
    dir: Option<PathBuf>,
}
