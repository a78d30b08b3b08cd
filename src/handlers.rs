use crate::config::Config;
use crate::errors::AppError;
use crate::mailer::{LeadMailer, SmtpMailer};
use crate::matcher::match_offers;
use crate::matrix::MatrixCache;
use crate::models::{DiagnosisResponse, DiagnosisStatus, Profile};
use crate::narrative::{generate_diagnosis, OpenAiClient, TextGenerator};
use crate::notifier::{notify_lead, should_notify};
use crate::presenter::{header_for, present};
use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Largest accepted profile payload.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub const NOT_FOUND_HEADER: &str = "Revisión manual de su perfil";
pub const NOT_FOUND_MESSAGE: &str = "No se encontraron financieras que coincidan exactamente \
    con el perfil, pero un consultor revisará su caso manualmente.";

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Financing matrix, loaded once per process.
    pub matrix: MatrixCache,
    /// Diagnosis text provider (optional; fallback text when absent).
    pub text_generator: Option<Arc<dyn TextGenerator>>,
    /// Lead mail transport (optional; notifications skipped when absent).
    pub mailer: Option<Arc<dyn LeadMailer>>,
}

impl AppState {
    /// Builds the state and the external clients the configuration enables.
    ///
    /// A client that cannot be constructed is logged and left out.
    pub fn from_config(config: Config) -> Self {
        let text_generator: Option<Arc<dyn TextGenerator>> = match config.openai_api_key {
            Some(ref key) => match OpenAiClient::new(
                key.clone(),
                config.openai_model.clone(),
                config.openai_base_url.clone(),
            ) {
                Ok(client) => {
                    tracing::info!("✓ Text generation client initialized: {}", config.openai_model);
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!("Failed to initialize text generation client: {}", e);
                    None
                }
            },
            None => None,
        };

        let mailer: Option<Arc<dyn LeadMailer>> = match config.smtp {
            Some(ref smtp) => match SmtpMailer::new(smtp) {
                Ok(mailer) => {
                    tracing::info!("✓ SMTP mailer initialized: {}:{}", smtp.host, smtp.port);
                    Some(Arc::new(mailer))
                }
                Err(e) => {
                    tracing::error!("Failed to initialize SMTP mailer: {}", e);
                    None
                }
            },
            None => None,
        };

        Self {
            matrix: MatrixCache::new(config.matrix_path.clone()),
            config,
            text_generator,
            mailer,
        }
    }
}

/// Health check endpoint.
///
/// Reports which parts of the configuration are present. Answers 500 when
/// the auth secret or the matrix file is missing.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let token_configured = state.config.auth_token.is_some();
    let matriz_exists = state.matrix.is_available();
    let healthy = token_configured && matriz_exists;

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "token_configured": token_configured,
            "openai_configured": state.text_generator.is_some(),
            "smtp_configured": state.mailer.is_some(),
            "matriz_exists": matriz_exists,
        })),
    )
}

/// POST /diagnostico
///
/// Authorizes the caller, matches the submitted profile against the matrix,
/// phrases a diagnosis and forwards qualified leads by email.
///
/// The body is only read after the token check, so an unauthorized caller
/// gets 401 whatever it sends.
pub async fn diagnostico(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<DiagnosisResponse>, AppError> {
    authorize(&state.config, &headers)?;

    let body = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
        AppError::PayloadTooLarge(format!(
            "Request body exceeds {} bytes or could not be read: {}",
            MAX_BODY_BYTES, e
        ))
    })?;
    let profile = parse_profile(&body)?;
    tracing::info!(
        "POST /diagnostico - empresa='{}', ventas='{}', garantia={}, contacto={}",
        profile.nombre_empresa,
        profile.ventas_rango,
        profile.tiene_garantia_inmueble,
        profile.solicita_contacto
    );

    let response = run_diagnosis(&state, &profile).await?;
    Ok(Json(response))
}

/// Runs the matching pipeline for an authorized profile.
pub async fn run_diagnosis(
    state: &AppState,
    profile: &Profile,
) -> Result<DiagnosisResponse, AppError> {
    let table = state.matrix.get().await?;
    let rows = match_offers(profile, &table);

    let (status, header, diagnosis, matches) = if rows.is_empty() {
        tracing::info!("No matrix offers match the profile");
        (
            DiagnosisStatus::NotFound,
            NOT_FOUND_HEADER.to_string(),
            NOT_FOUND_MESSAGE.to_string(),
            Vec::new(),
        )
    } else {
        let matches = present(&rows, profile);
        let diagnosis =
            generate_diagnosis(state.text_generator.as_deref(), profile, &matches).await;
        (
            DiagnosisStatus::Success,
            header_for(profile).to_string(),
            diagnosis,
            matches,
        )
    };

    let email_enviado = if should_notify(profile) {
        let sent = notify_lead(state.mailer.as_deref(), profile, &matches, &diagnosis).await;
        tracing::info!("Lead notification sent: {}", sent);
        Some(sent)
    } else {
        None
    };

    Ok(DiagnosisResponse {
        status,
        header,
        diagnostico_ia: diagnosis,
        recomendaciones: matches,
        email_enviado,
    })
}

/// Checks `Authorization: Bearer <ASFIES_TOKEN>`.
fn authorize(config: &Config, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(ref secret) = config.auth_token else {
        return Err(AppError::ServerMisconfigured(
            "Server token not configured (ASFIES_TOKEN missing)".to_string(),
        ));
    };

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    if !constant_time_compare(provided, &format!("Bearer {}", secret)) {
        return Err(AppError::Unauthorized("Invalid bearer token".to_string()));
    }

    Ok(())
}

/// Constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Empty bodies and `null` yield the default profile.
fn parse_profile(body: &[u8]) -> Result<Profile, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Profile::default());
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))?;

    match value {
        Value::Null => Ok(Profile::default()),
        Value::Object(_) => serde_json::from_value(value)
            .map_err(|e| AppError::BadRequest(format!("Invalid profile: {}", e))),
        _ => Err(AppError::BadRequest(
            "Request body must be a JSON object".to_string(),
        )),
    }
}
