/// Consultative diagnosis text.
///
/// The text comes from an OpenAI-compatible chat completion endpoint when a
/// key is configured. Any failure degrades to a fixed fallback selected by
/// the collateral flag; the caller always gets a string.
use crate::models::{MatchResult, Profile};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TEMPERATURE: f32 = 0.7;

pub const FALLBACK_WITH_COLLATERAL: &str = "Gracias por compartir la información de su empresa. \
    Al contar con garantía inmobiliaria, uno de nuestros especialistas se pondrá en contacto \
    con usted para diseñar la estrategia de financiamiento más adecuada a su perfil.";

pub const FALLBACK_WITHOUT_COLLATERAL: &str = "Este diagnóstico es preliminar y de carácter \
    informativo. Nuestro equipo de analistas procesará su información detalladamente para \
    entregarle el reporte final vía correo electrónico.";

#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Text generation returned empty content")]
    EmptyContent,
}

/// External text-generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, NarrativeError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for the OpenAI chat completions API. Single attempt, no retries.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    /// Creates a new `OpenAiClient`.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Bearer key for the provider.
    /// * `model` - Chat model name, e.g. `gpt-4o-mini`.
    /// * `base_url` - API root without trailing slash, e.g. `https://api.openai.com/v1`.
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self, NarrativeError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, NarrativeError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NarrativeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(NarrativeError::EmptyContent);
        }

        tracing::debug!("Diagnosis generated with model {}", self.model);
        Ok(text)
    }
}

/// Fixed text used whenever generation is unavailable.
pub fn fallback_for(profile: &Profile) -> &'static str {
    if profile.tiene_garantia_inmueble {
        FALLBACK_WITH_COLLATERAL
    } else {
        FALLBACK_WITHOUT_COLLATERAL
    }
}

/// Prompt asking for a consultative diagnosis of at most two paragraphs.
pub fn build_prompt(profile: &Profile, matches: &[MatchResult]) -> String {
    let collateral_context = if profile.tiene_garantia_inmueble {
        "con garantía inmobiliaria bajo la metodología CAOM"
    } else {
        "sin garantía inmobiliaria"
    };
    let options = serde_json::to_string_pretty(matches).unwrap_or_else(|_| "[]".to_string());

    let mut prompt = format!(
        "Eres un asesor financiero experto de ASFIES Negocios Consulting.\n\
         Analiza el siguiente perfil empresarial y las opciones encontradas:\n\n\
         CLIENTE: {}\n\
         ACTIVIDAD: {}\n\
         VENTAS: {}\n\
         ANTIGÜEDAD: {}\n\
         MONTO SOLICITADO: {}\n\
         PLAZO SOLICITADO: {}\n\
         ESTADO: Financiamiento {}.\n\n\
         OPCIONES ENCONTRADAS (JSON):\n{}\n\n\
         TAREA:\n\
         Escribe un diagnóstico profesional de máximo 2 párrafos.\n\
         Explica por qué estas opciones son estratégicas para su situación.\n\
         Usa un tono consultivo, elegante y técnico.",
        profile.nombre_empresa,
        profile.actividad_economica,
        profile.ventas_rango,
        profile.antiguedad,
        profile.monto_solicitado,
        profile.plazo_solicitado,
        collateral_context,
        options,
    );

    if profile.tiene_garantia_inmueble {
        prompt.push_str(
            "\nMenciona que se aplicará la 'Arquitectura y Optimización de Capital (CAOM)'. \
             No reveles nombres de instituciones financieras.",
        );
    }

    prompt
}

/// Produces the diagnosis text, falling back when the generator is absent or fails.
pub async fn generate_diagnosis(
    generator: Option<&dyn TextGenerator>,
    profile: &Profile,
    matches: &[MatchResult],
) -> String {
    let Some(generator) = generator else {
        tracing::warn!("Text generation not configured, using fallback diagnosis");
        return fallback_for(profile).to_string();
    };

    let prompt = build_prompt(profile, matches);
    match generator.generate(&prompt).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            tracing::warn!("Text generation returned blank output, using fallback diagnosis");
            fallback_for(profile).to_string()
        }
        Err(e) => {
            tracing::error!("Diagnosis generation failed: {}", e);
            fallback_for(profile).to_string()
        }
    }
}
