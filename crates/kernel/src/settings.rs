use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};

pub use shelf_db::{DatabaseSettings, StoreBackend};

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "SHELF_ENV";
const CONFIG_DIR_ENV: &str = "SHELF_CONFIG_DIR";
const DEFAULT_TOKEN_SECRET: &str = "shelf-local-development-secret";
const REDACTED: &str = "***";

/// Deployment environment the application is running in.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub listing: ListingSettings,
    #[serde(default)]
    pub media: MediaSettings,
    #[serde(default)]
    pub mail: MailSettings,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, environment overlay
    /// and `SHELF_*` variables (`SHELF_AUTH__TOKEN_SECRET` sets
    /// `auth.token_secret`).
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::current_dir()
                .context("unable to resolve current directory")?
                .join("config"),
        };

        let base_path = config_dir.join("base.toml");
        let environment_path = config_dir.join(format!("{environment}.toml"));

        let cfg = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(
                config::Environment::with_prefix("SHELF")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        // Override environment field with parsed enum variant.
        settings.environment = match environment.as_str() {
            "local" => Environment::Local,
            "staging" => Environment::Staging,
            "production" => Environment::Production,
            other => {
                return Err(anyhow!(
                    "unsupported environment '{}'; expected local/staging/production",
                    other
                ));
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject combinations that cannot work at runtime.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.environment.is_production() && self.auth.token_secret == DEFAULT_TOKEN_SECRET {
            bail!("auth.token_secret must be set in production");
        }
        if self.auth.token_secret.len() < 16 {
            bail!("auth.token_secret must be at least 16 bytes");
        }
        if self.auth.token_ttl_secs == 0 {
            bail!("auth.token_ttl_secs must be positive");
        }
        if self.listing.default_limit == 0 || self.listing.max_limit < self.listing.default_limit {
            bail!("listing limits must satisfy 0 < default_limit <= max_limit");
        }
        if self.media.provider == MediaProvider::Cloudinary
            && (self.media.cloud_name.is_none()
                || self.media.api_key.is_none()
                || self.media.api_secret.is_none())
        {
            bail!("media.cloud_name, media.api_key and media.api_secret are required for cloudinary");
        }
        if self.mail.provider == MailProvider::Sendgrid && self.mail.api_key.is_none() {
            bail!("mail.api_key is required for sendgrid");
        }
        Ok(())
    }

    /// Settings as JSON with secrets masked, for operator output.
    pub fn redacted(&self) -> serde_json::Value {
        let mut copy = self.clone();
        copy.auth.token_secret = REDACTED.to_string();
        if copy.media.api_secret.is_some() {
            copy.media.api_secret = Some(REDACTED.to_string());
        }
        if copy.mail.api_key.is_some() {
            copy.mail.api_key = Some(REDACTED.to_string());
        }
        if copy.database.uri.contains('@') {
            copy.database.uri = REDACTED.to_string();
        }
        serde_json::to_value(copy).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "ServerSettings::default_api_prefix")]
    pub api_prefix: String,
    /// Browser origin allowed to call the API with credentials. Any origin
    /// (without credentials) when unset.
    #[serde(default)]
    pub cors_origin: Option<String>,
    /// Directory served under `/static`.
    #[serde(default = "ServerSettings::default_public_dir")]
    pub public_dir: String,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_request_timeout_ms() -> u64 {
        15000
    }

    fn default_api_prefix() -> String {
        "/api/v1".to_string()
    }

    fn default_public_dir() -> String {
        "public".to_string()
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_ms: Self::default_request_timeout_ms(),
            api_prefix: Self::default_api_prefix(),
            cors_origin: None,
            public_dir: Self::default_public_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetrySettings {
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    #[serde(default = "TelemetrySettings::default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl TelemetrySettings {
    fn default_log_filter() -> String {
        "info,tower_http=info".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_filter: Self::default_log_filter(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthSettings {
    #[serde(default = "AuthSettings::default_token_secret")]
    pub token_secret: String,
    /// Lifetime of issued tokens and of the session cookie.
    #[serde(default = "AuthSettings::default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    #[serde(default = "AuthSettings::default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    #[serde(default = "AuthSettings::default_cookie_name")]
    pub cookie_name: String,
}

impl AuthSettings {
    fn default_token_secret() -> String {
        DEFAULT_TOKEN_SECRET.to_string()
    }

    fn default_token_ttl_secs() -> u64 {
        86_400
    }

    fn default_bcrypt_cost() -> u32 {
        10
    }

    fn default_cookie_name() -> String {
        "token".to_string()
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_secret: Self::default_token_secret(),
            token_ttl_secs: Self::default_token_ttl_secs(),
            bcrypt_cost: Self::default_bcrypt_cost(),
            cookie_name: Self::default_cookie_name(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ListingSettings {
    #[serde(default = "ListingSettings::default_limit")]
    pub default_limit: u64,
    #[serde(default = "ListingSettings::default_max_limit")]
    pub max_limit: u64,
}

impl ListingSettings {
    fn default_limit() -> u64 {
        20
    }

    fn default_max_limit() -> u64 {
        100
    }
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            default_limit: Self::default_limit(),
            max_limit: Self::default_max_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaProvider {
    /// Files are copied under `local_dir` and served by this process.
    #[default]
    Local,
    Cloudinary,
}

/// Digest used to sign Cloudinary uploads. Must match the account's
/// signature setting; Cloudinary accounts default to SHA-1.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaSettings {
    #[serde(default)]
    pub provider: MediaProvider,
    #[serde(default)]
    pub cloud_name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub signature_algorithm: SignatureAlgorithm,
    /// Where multipart uploads are staged before being handed to the host.
    #[serde(default = "MediaSettings::default_temp_dir")]
    pub temp_dir: String,
    #[serde(default = "MediaSettings::default_local_dir")]
    pub local_dir: String,
    #[serde(default = "MediaSettings::default_public_base_url")]
    pub public_base_url: String,
    #[serde(default = "MediaSettings::default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl MediaSettings {
    fn default_temp_dir() -> String {
        "public/temp".to_string()
    }

    fn default_local_dir() -> String {
        "public/uploads".to_string()
    }

    fn default_public_base_url() -> String {
        "http://127.0.0.1:8080/static/uploads".to_string()
    }

    fn default_max_upload_bytes() -> usize {
        5 * 1024 * 1024
    }
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            provider: MediaProvider::default(),
            cloud_name: None,
            api_key: None,
            api_secret: None,
            signature_algorithm: SignatureAlgorithm::default(),
            temp_dir: Self::default_temp_dir(),
            local_dir: Self::default_local_dir(),
            public_base_url: Self::default_public_base_url(),
            max_upload_bytes: Self::default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    /// Messages are logged (recipient and subject only) instead of sent.
    #[default]
    Log,
    Sendgrid,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailSettings {
    #[serde(default)]
    pub provider: MailProvider,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "MailSettings::default_from_email")]
    pub from_email: String,
}

impl MailSettings {
    fn default_from_email() -> String {
        "no-reply@shelf.local".to_string()
    }
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            provider: MailProvider::default(),
            api_key: None,
            from_email: Self::default_from_email(),
        }
    }
}
