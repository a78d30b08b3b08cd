/// Profile matching against the financing matrix.
///
/// Filters run in a fixed order (sales bucket, years in business, financing
/// type) and the survivors are truncated to the first three in table order.
use crate::matrix::{ColumnMap, OfferRow, OfferTable};
use crate::models::Profile;
use regex::Regex;
use std::sync::OnceLock;

/// Maximum number of offers returned per request.
pub const MAX_MATCHES: usize = 3;

/// Cell value marking an offer as eligible for a sales bucket.
pub const ELIGIBLE_MARKER: &str = "X";

/// Years-in-business labels and the minimum years they guarantee.
pub const YEARS_IN_BUSINESS: &[(&str, u64)] = &[
    ("Menos de 1 año", 0),
    ("Entre 1 y 3 años", 1),
    ("Entre 3 y 5 años", 3),
    ("Más de 5 años", 5),
];

fn digits_pattern() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"[0-9]+").expect("digit pattern is valid"))
}

/// Minimum years represented by a profile label. Unknown labels map to 0.
pub fn years_for_label(label: &str) -> u64 {
    let label = label.trim();
    YEARS_IN_BUSINESS
        .iter()
        .find(|(known, _)| *known == label)
        .map(|(_, years)| *years)
        .unwrap_or(0)
}

/// First run of digits in an age-requirement cell, 0 when there is none.
///
/// Runs too large for `u64` saturate so the row can never qualify.
pub fn min_years_required(text: &str) -> u64 {
    digits_pattern()
        .find(text)
        .map(|m| m.as_str().parse().unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Returns up to [`MAX_MATCHES`] offers matching `profile`, in table order.
pub fn match_offers(profile: &Profile, table: &OfferTable) -> Vec<OfferRow> {
    let columns = ColumnMap::resolve(table);
    let mut candidates: Vec<usize> = (0..table.len())
        .filter(|&i| columns.institution.is_none() || !table.cell(i, columns.institution).is_empty())
        .collect();

    // 1) Sales bucket
    let sales_range = profile.ventas_rango.trim();
    if !sales_range.is_empty() {
        match table.column_index(sales_range) {
            Some(bucket) => {
                candidates.retain(|&i| {
                    table
                        .cell(i, Some(bucket))
                        .eq_ignore_ascii_case(ELIGIBLE_MARKER)
                });
            }
            None => tracing::debug!(
                "Sales range '{}' is not a matrix column, skipping bucket filter",
                sales_range
            ),
        }
    }

    // 2) Years in business
    let user_years = years_for_label(&profile.antiguedad);
    match columns.age_requirement {
        Some(_) => {
            candidates.retain(|&i| {
                min_years_required(table.cell(i, columns.age_requirement)) <= user_years
            });
        }
        None => tracing::warn!(
            "Matrix has no age-requirement column, skipping years-in-business filter"
        ),
    }

    // 3) Financing type
    let wanted_type = profile.tipo_financiamiento.trim().to_lowercase();
    if !wanted_type.is_empty() && columns.financing_type.is_some() {
        candidates.retain(|&i| {
            table
                .cell(i, columns.financing_type)
                .to_lowercase()
                .contains(&wanted_type)
        });
    }

    tracing::debug!(
        "Matrix filter kept {} of {} rows (sales='{}', years={}, type='{}')",
        candidates.len(),
        table.len(),
        sales_range,
        user_years,
        wanted_type
    );

    candidates
        .into_iter()
        .take(MAX_MATCHES)
        .map(|i| columns.offer_row(table, i))
        .collect()
}
