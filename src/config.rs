use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::cli::{ConnectionArgs, MigrateArgs};
use crate::retry::RetryConfig;
use crate::types::UploadFailurePolicy;

/// Shape of the JSON credentials file:
/// `{"photoprism": {"url", "accessToken"}, "immich": {"url", "apiKey"}}`.
#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    photoprism: PhotoprismSection,
    #[serde(default)]
    immich: ImmichSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhotoprismSection {
    url: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImmichSection {
    url: Option<String>,
    api_key: Option<String>,
}

pub struct PhotoprismConfig {
    pub url: String,
    pub access_token: String,
}

impl std::fmt::Debug for PhotoprismConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoprismConfig")
            .field("url", &self.url)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

pub struct ImmichConfig {
    pub url: String,
    pub api_key: String,
}

impl std::fmt::Debug for ImmichConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmichConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Resolved connection settings for both services.
#[derive(Debug)]
pub struct ConnectionConfig {
    pub photoprism: PhotoprismConfig,
    pub immich: ImmichConfig,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

/// Application configuration for a migration run.
#[derive(Debug)]
pub struct MigrateConfig {
    pub connection: ConnectionConfig,
    pub originals_dir: PathBuf,
    pub log_dir: PathBuf,
    pub state_db: Option<PathBuf>,
    pub upload_timeout: Duration,
    pub on_upload_failure: UploadFailurePolicy,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Read the credentials file. A missing file is not an error because every
/// value can also come from flags or the environment.
fn load_credentials_file(path: &Path) -> anyhow::Result<CredentialsFile> {
    if !path.exists() {
        tracing::debug!("No credentials file at {}", path.display());
        return Ok(CredentialsFile::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Invalid credentials file {}", path.display()))
}

fn require(value: Option<String>, what: &str, flag: &str, env: &str, key: &str) -> anyhow::Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => anyhow::bail!(
            "Missing {}: pass --{}, set {}, or add `{}` to the credentials file",
            what,
            flag,
            env,
            key
        ),
    }
}

impl ConnectionConfig {
    pub fn from_args(args: &ConnectionArgs) -> anyhow::Result<Self> {
        let file = load_credentials_file(&expand_tilde(&args.config_file))?;

        let photoprism_url = require(
            args.photoprism_url.clone().or(file.photoprism.url),
            "PhotoPrism URL",
            "photoprism-url",
            "PHOTOPRISM_URL",
            "photoprism.url",
        )?;
        let access_token = require(
            args.photoprism_token.clone().or(file.photoprism.access_token),
            "PhotoPrism access token",
            "photoprism-token",
            "PHOTOPRISM_ACCESS_TOKEN",
            "photoprism.accessToken",
        )?;
        let immich_url = require(
            args.immich_url.clone().or(file.immich.url),
            "Immich URL",
            "immich-url",
            "IMMICH_URL",
            "immich.url",
        )?;
        let api_key = require(
            args.immich_api_key.clone().or(file.immich.api_key),
            "Immich API key",
            "immich-api-key",
            "IMMICH_API_KEY",
            "immich.apiKey",
        )?;

        Ok(Self {
            photoprism: PhotoprismConfig {
                url: normalize_url(&photoprism_url),
                access_token,
            },
            immich: ImmichConfig {
                url: normalize_url(&immich_url),
                api_key,
            },
            request_timeout: Duration::from_secs(args.request_timeout),
            retry: RetryConfig {
                max_retries: args.max_retries,
                base_delay_secs: args.retry_delay,
                max_delay_secs: 60,
            },
        })
    }
}

impl MigrateConfig {
    pub fn from_args(args: &MigrateArgs) -> anyhow::Result<Self> {
        Ok(Self {
            connection: ConnectionConfig::from_args(&args.connection)?,
            originals_dir: expand_tilde(&args.originals_dir),
            log_dir: expand_tilde(&args.log_dir),
            state_db: (!args.no_state).then(|| expand_tilde(&args.state_db)),
            upload_timeout: Duration::from_secs(args.upload_timeout),
            on_upload_failure: args.on_upload_failure,
            dry_run: args.dry_run,
            no_progress_bar: args.no_progress_bar,
        })
    }
}
