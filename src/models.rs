use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============ Request Models ============

/// Business profile submitted to `POST /diagnostico`.
///
/// Every field is optional. Text fields accept strings, numbers or booleans
/// and default to an empty string; flags go through [`parse_flag`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    #[serde(deserialize_with = "lenient_text")]
    pub nombre_empresa: String,
    /// Contact first name.
    #[serde(deserialize_with = "lenient_text")]
    pub nombre: String,
    /// Contact surname.
    #[serde(deserialize_with = "lenient_text")]
    pub apellido: String,
    #[serde(deserialize_with = "lenient_text")]
    pub telefono: String,
    #[serde(deserialize_with = "lenient_text")]
    pub email: String,
    #[serde(deserialize_with = "lenient_text")]
    pub actividad_economica: String,
    /// Sales bucket label; must equal a matrix column header to filter.
    #[serde(deserialize_with = "lenient_text")]
    pub ventas_rango: String,
    /// Years-in-business label, e.g. "Entre 1 y 3 años".
    #[serde(deserialize_with = "lenient_text")]
    pub antiguedad: String,
    #[serde(deserialize_with = "lenient_text")]
    pub tipo_financiamiento: String,
    /// Applicant offers real-estate collateral.
    #[serde(deserialize_with = "lenient_flag")]
    pub tiene_garantia_inmueble: bool,
    /// Applicant explicitly asked to be contacted.
    #[serde(deserialize_with = "lenient_flag")]
    pub solicita_contacto: bool,
    #[serde(deserialize_with = "lenient_text")]
    pub monto_solicitado: String,
    #[serde(deserialize_with = "lenient_text")]
    pub plazo_solicitado: String,
    #[serde(deserialize_with = "lenient_text")]
    pub tipo_inmueble: String,
    #[serde(deserialize_with = "lenient_text")]
    pub valor_inmueble: String,
    #[serde(deserialize_with = "lenient_text")]
    pub ubicacion_inmueble: String,
}

impl Profile {
    /// Contact full name, skipping empty parts.
    pub fn contact_name(&self) -> String {
        [self.nombre.trim(), self.apellido.trim()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Tokens accepted as `true` when a flag arrives as a string.
pub const TRUTHY_TOKENS: [&str; 6] = ["true", "1", "yes", "si", "sí", "y"];

/// Permissive boolean parsing for inbound flags.
///
/// Accepts native booleans, non-zero numbers and the strings in
/// [`TRUTHY_TOKENS`] (trimmed, case-insensitive). Anything else is `false`.
pub fn parse_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => {
            let token = s.trim().to_lowercase();
            TRUTHY_TOKENS.contains(&token.as_str())
        }
        _ => false,
    }
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_flag(&value))
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}

// ============ Response Models ============

/// One recommended offer as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Institution name, or a generic strategy label under collateral.
    pub financiera: String,
    pub tipo: String,
    pub ventaja: String,
    pub monto: String,
    pub plazo: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisStatus {
    Success,
    NotFound,
}

/// Body of a successful `POST /diagnostico` (both matched and not found).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisResponse {
    pub status: DiagnosisStatus,
    pub header: String,
    pub diagnostico_ia: String,
    pub recomendaciones: Vec<MatchResult>,
    /// Present only when the lead qualified for notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_enviado: Option<bool>,
}
