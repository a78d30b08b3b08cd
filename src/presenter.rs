use crate::matrix::OfferRow;
use crate::models::{MatchResult, Profile};

/// Generic names shown instead of institutions when collateral is offered.
pub const STRATEGY_LABELS: &[&str] = &["Estrategia Alfa", "Estrategia Beta", "Estrategia Delta"];

pub const HEADER_WITH_COLLATERAL: &str = "Tenemos las siguientes estrategias";
pub const HEADER_WITHOUT_COLLATERAL: &str = "Opciones de Financiamiento Identificadas";

/// Label for the `index`-th (0-based) anonymized offer.
///
/// Past the named labels the strategies are numbered: "Estrategia 4", ...
pub fn strategy_label(index: usize) -> String {
    STRATEGY_LABELS
        .get(index)
        .map(|label| label.to_string())
        .unwrap_or_else(|| format!("Estrategia {}", index + 1))
}

/// Response header chosen by the collateral flag.
pub fn header_for(profile: &Profile) -> &'static str {
    if profile.tiene_garantia_inmueble {
        HEADER_WITH_COLLATERAL
    } else {
        HEADER_WITHOUT_COLLATERAL
    }
}

/// Shapes matched rows into response records.
///
/// Institution identity is never disclosed for collateral-backed profiles.
pub fn present(rows: &[OfferRow], profile: &Profile) -> Vec<MatchResult> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| MatchResult {
            financiera: if profile.tiene_garantia_inmueble {
                strategy_label(index)
            } else {
                row.institution.clone()
            },
            tipo: row.financing_type.clone(),
            ventaja: row.benefit.clone(),
            monto: row.amount.clone(),
            plazo: row.term.clone(),
        })
        .collect()
}
