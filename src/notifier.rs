/// Lead notification for the sales mailbox.
///
/// A lead is forwarded when it offers real-estate collateral or explicitly
/// asks to be contacted. Delivery problems are logged and reported as
/// `false`; they never affect the HTTP response.
use crate::mailer::{LeadEmail, LeadMailer};
use crate::models::{MatchResult, Profile};
use chrono::Utc;
use regex::Regex;
use std::fmt::Write;
use std::sync::OnceLock;

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .expect("email pattern is valid")
    })
}

/// Whether `email` looks like a real contact address.
///
/// Rejects malformed input and the placeholder patterns web forms tend to
/// receive (long runs of repeated or sequential digits).
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    let fake_patterns = ["999999", "111111", "000000", "123456789"];
    if fake_patterns.iter().any(|p| email.contains(p)) {
        tracing::debug!("Placeholder email pattern detected: {}", email);
        return false;
    }

    email_pattern().is_match(email)
}

/// Collateral or an explicit contact request qualifies a lead.
pub fn should_notify(profile: &Profile) -> bool {
    profile.tiene_garantia_inmueble || profile.solicita_contacto
}

fn or_dash(value: &str) -> &str {
    let value = value.trim();
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Sí"
    } else {
        "No"
    }
}

/// Builds the plain-text lead summary.
///
/// `matches` are expected already presented, so collateral leads carry
/// strategy labels rather than institution names.
pub fn compose_lead_email(
    profile: &Profile,
    matches: &[MatchResult],
    diagnosis: &str,
) -> LeadEmail {
    let company = or_dash(&profile.nombre_empresa);
    let subject = if profile.tiene_garantia_inmueble {
        format!("Nuevo lead con garantía inmobiliaria: {}", company)
    } else {
        format!("Nuevo lead solicita contacto: {}", company)
    };

    // Writing to a String cannot fail.
    let mut body = String::new();
    let _ = writeln!(body, "DATOS DEL PROSPECTO");
    let _ = writeln!(body, "Empresa: {}", company);
    let _ = writeln!(body, "Contacto: {}", or_dash(&profile.contact_name()));
    let _ = writeln!(body, "Teléfono: {}", or_dash(&profile.telefono));
    let _ = writeln!(body, "Email: {}", or_dash(&profile.email));
    let _ = writeln!(body, "Actividad económica: {}", or_dash(&profile.actividad_economica));
    let _ = writeln!(body, "Rango de ventas: {}", or_dash(&profile.ventas_rango));
    let _ = writeln!(body, "Antigüedad: {}", or_dash(&profile.antiguedad));
    let _ = writeln!(body, "Tipo de financiamiento: {}", or_dash(&profile.tipo_financiamiento));
    let _ = writeln!(body, "Monto solicitado: {}", or_dash(&profile.monto_solicitado));
    let _ = writeln!(body, "Plazo solicitado: {}", or_dash(&profile.plazo_solicitado));
    let _ = writeln!(body, "Garantía inmobiliaria: {}", yes_no(profile.tiene_garantia_inmueble));
    let _ = writeln!(body, "Solicita contacto: {}", yes_no(profile.solicita_contacto));

    if profile.tiene_garantia_inmueble {
        let _ = writeln!(body, "\nINMUEBLE EN GARANTÍA");
        let _ = writeln!(body, "Tipo: {}", or_dash(&profile.tipo_inmueble));
        let _ = writeln!(body, "Valor: {}", or_dash(&profile.valor_inmueble));
        let _ = writeln!(body, "Ubicación: {}", or_dash(&profile.ubicacion_inmueble));
    }

    let _ = writeln!(body, "\nOPCIONES IDENTIFICADAS");
    if matches.is_empty() {
        let _ = writeln!(body, "Sin coincidencias en la matriz; requiere revisión manual.");
    }
    for (i, m) in matches.iter().enumerate() {
        let _ = writeln!(
            body,
            "{}. {} | {} | Monto: {} | Plazo: {}",
            i + 1,
            or_dash(&m.financiera),
            or_dash(&m.tipo),
            or_dash(&m.monto),
            or_dash(&m.plazo)
        );
        if !m.ventaja.trim().is_empty() {
            let _ = writeln!(body, "   {}", m.ventaja.trim());
        }
    }

    let _ = writeln!(body, "\nDIAGNÓSTICO ENVIADO AL PROSPECTO");
    let _ = writeln!(body, "{}", diagnosis.trim());
    let _ = writeln!(
        body,
        "\nRecibido: {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );

    let reply_to = Some(profile.email.trim())
        .filter(|e| is_valid_email(e))
        .map(str::to_string);

    LeadEmail {
        subject,
        body,
        reply_to,
    }
}

/// Forwards a qualified lead. Returns whether the email was delivered.
pub async fn notify_lead(
    mailer: Option<&dyn LeadMailer>,
    profile: &Profile,
    matches: &[MatchResult],
    diagnosis: &str,
) -> bool {
    if !should_notify(profile) {
        return false;
    }

    let Some(mailer) = mailer else {
        tracing::warn!(
            "Lead '{}' qualifies for notification but SMTP is not configured",
            profile.nombre_empresa
        );
        return false;
    };

    let email = compose_lead_email(profile, matches, diagnosis);
    match mailer.send(&email).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Failed to send lead email: {}", e);
            false
        }
    }
}
