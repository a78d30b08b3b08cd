use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default model used for the consultative diagnosis.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Matrix file name, resolved next to the crate manifest when `MATRIZ_FILE` is unset.
pub const DEFAULT_MATRIX_FILE: &str = "matriz.xlsx";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    /// Shared bearer secret required by `POST /diagnostico`.
    pub auth_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub matrix_path: PathBuf,
    /// `None` when host or credentials are missing; notifications are then skipped.
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
    /// Sales mailbox that receives every lead.
    pub to: String,
    /// STARTTLS on a plain connection.
    pub use_tls: bool,
    /// Implicit TLS (usually port 465). Takes precedence over `use_tls`.
    pub use_ssl: bool,
}

/// Reads an env var, treating blank values as absent.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn bool_var(name: &str, default: bool) -> anyhow::Result<bool> {
    match optional_var(name) {
        None => Ok(default),
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("{} must be a boolean (true/false), got '{}'", name, raw),
        },
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            auth_token: optional_var("ASFIES_TOKEN"),
            openai_api_key: optional_var("OPENAI_API_KEY"),
            openai_model: optional_var("OPENAI_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url: optional_var("OPENAI_BASE_URL")
                .map(|url| {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("OPENAI_BASE_URL must start with http:// or https://");
                    }
                    Ok(url.trim_end_matches('/').to_string())
                })
                .transpose()?
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            matrix_path: optional_var("MATRIZ_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(default_matrix_path),
            smtp: SmtpConfig::from_env()?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        if config.auth_token.is_none() {
            tracing::warn!("ASFIES_TOKEN not set: /diagnostico will answer 500 until configured");
        }
        if config.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set: diagnoses will use the fallback text");
        }
        tracing::debug!("OpenAI model: {}", config.openai_model);
        tracing::debug!("Matrix path: {}", config.matrix_path.display());
        match config.smtp {
            Some(ref smtp) => tracing::debug!("SMTP relay: {}:{}", smtp.host, smtp.port),
            None => tracing::warn!("SMTP not configured: lead notifications will be skipped"),
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Configuration used by tests and tooling: nothing optional is set.
    pub fn with_matrix(matrix_path: impl AsRef<Path>) -> Self {
        Self {
            port: 5000,
            auth_token: None,
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            matrix_path: matrix_path.as_ref().to_path_buf(),
            smtp: None,
        }
    }
}

impl SmtpConfig {
    fn from_env() -> anyhow::Result<Option<Self>> {
        let (Some(host), Some(user), Some(password)) = (
            optional_var("SMTP_HOST"),
            optional_var("SMTP_USER"),
            optional_var("SMTP_PASSWORD"),
        ) else {
            return Ok(None);
        };

        let port = optional_var("SMTP_PORT")
            .map(|p| {
                p.parse::<u16>()
                    .map_err(|_| anyhow::anyhow!("SMTP_PORT must be a valid port number"))
            })
            .transpose()?
            .unwrap_or(587);
        let from = optional_var("SMTP_FROM").unwrap_or_else(|| user.clone());
        let to = optional_var("LEAD_EMAIL_TO").unwrap_or_else(|| from.clone());

        Ok(Some(Self {
            host,
            port,
            user,
            password,
            from,
            to,
            use_tls: bool_var("SMTP_USE_TLS", true)?,
            use_ssl: bool_var("SMTP_USE_SSL", false)?,
        }))
    }
}

fn default_matrix_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_MATRIX_FILE)
}
