/// Router-level tests for /diagnostico and /health
/// Drives the full application in-process against the CSV fixture matrix
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_diagnostico_api::config::Config;
use rust_diagnostico_api::handlers::{AppState, MAX_BODY_BYTES, NOT_FOUND_MESSAGE};
use rust_diagnostico_api::mailer::{LeadEmail, LeadMailer, NotificationError};
use rust_diagnostico_api::matrix::MatrixCache;
use rust_diagnostico_api::narrative::{FALLBACK_WITHOUT_COLLATERAL, FALLBACK_WITH_COLLATERAL};
use rust_diagnostico_api::routes::build_router;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

const TOKEN: &str = "test-token";
const FIXTURE_INSTITUTIONS: [&str; 5] = [
    "Banco Norte",
    "Financiera Sur",
    "Capital Express",
    "Inversiones Delta",
    "Grupo Aval",
];

fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/matriz.csv")
}

/// Mailer that counts attempts and optionally fails them.
#[derive(Default)]
struct CountingMailer {
    attempts: AtomicUsize,
    fail: bool,
}

#[async_trait::async_trait]
impl LeadMailer for CountingMailer {
    async fn send(&self, _email: &LeadEmail) -> Result<(), NotificationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            let err = "not-an-address".parse::<lettre::Address>().unwrap_err();
            return Err(err.into());
        }
        Ok(())
    }
}

fn create_state(
    token: Option<&str>,
    matrix_path: PathBuf,
    mailer: Option<Arc<CountingMailer>>,
) -> Arc<AppState> {
    let mut config = Config::with_matrix(&matrix_path);
    config.auth_token = token.map(str::to_string);
    Arc::new(AppState {
        matrix: MatrixCache::new(matrix_path),
        config,
        text_generator: None,
        mailer: mailer.map(|m| m as Arc<dyn LeadMailer>),
    })
}

fn create_app(state: Arc<AppState>) -> Router {
    build_router(state, false).unwrap()
}

async fn post_diagnostico(app: Router, auth: Option<&str>, body: &str) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri("/diagnostico")
        .header("content-type", "application/json");
    if let Some(auth) = auth {
        request = request.header("authorization", auth);
    }

    let response = app
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn bearer() -> String {
    format!("Bearer {}", TOKEN)
}

fn financieras(body: &Value) -> Vec<String> {
    body["recomendaciones"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["financiera"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_success_response_shape() {
    let app = create_app(create_state(Some(TOKEN), fixture_path(), None));
    let body = json!({
        "nombre_empresa": "Acme SA de CV",
        "ventas_rango": "1M-10M",
        "antiguedad": "Más de 5 años"
    });

    let (status, body) = post_diagnostico(app, Some(&bearer()), &body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["header"], "Opciones de Financiamiento Identificadas");
    assert_eq!(body["diagnostico_ia"], FALLBACK_WITHOUT_COLLATERAL);
    assert_eq!(
        financieras(&body),
        vec!["Banco Norte", "Financiera Sur", "Capital Express"]
    );
    let first = &body["recomendaciones"][0];
    assert_eq!(first["tipo"], "Crédito simple");
    assert_eq!(first["ventaja"], "Capital de trabajo para operación");
    assert_eq!(first["monto"], "$100,000 - $1,000,000");
    assert_eq!(first["plazo"], "12 a 36 meses");
    assert!(body.get("email_enviado").is_none());
}

#[tokio::test]
async fn test_age_filter_through_api() {
    let app = create_app(create_state(Some(TOKEN), fixture_path(), None));
    let body = json!({ "ventas_rango": "1M-10M", "antiguedad": "Entre 1 y 3 años" });

    let (_, body) = post_diagnostico(app, Some(&bearer()), &body.to_string()).await;

    assert_eq!(financieras(&body), vec!["Banco Norte", "Capital Express"]);
}

#[tokio::test]
async fn test_financing_type_filter_through_api() {
    let app = create_app(create_state(Some(TOKEN), fixture_path(), None));
    let body = json!({ "antiguedad": "Más de 5 años", "tipo_financiamiento": "crédito SIMPLE" });

    let (_, body) = post_diagnostico(app, Some(&bearer()), &body.to_string()).await;

    assert_eq!(financieras(&body), vec!["Banco Norte", "Grupo Aval"]);
}

#[tokio::test]
async fn test_not_found_is_success_status() {
    let app = create_app(create_state(Some(TOKEN), fixture_path(), None));
    let body = json!({ "tipo_financiamiento": "Arrendamiento" });

    let (status, body) = post_diagnostico(app, Some(&bearer()), &body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "not_found");
    assert_eq!(body["diagnostico_ia"], NOT_FOUND_MESSAGE);
    assert!(body["header"].is_string());
    assert_eq!(body["recomendaciones"], json!([]));
}

#[tokio::test]
async fn test_empty_body_is_processed() {
    let app = create_app(create_state(Some(TOKEN), fixture_path(), None));

    let (status, body) = post_diagnostico(app, Some(&bearer()), "").await;

    // Defaults: no bucket filter, 0 years -> only the offer without requirement
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(financieras(&body), vec!["Capital Express"]);
}

#[tokio::test]
async fn test_wrong_or_missing_token_is_401() {
    let state = create_state(Some(TOKEN), fixture_path(), None);
    let cases = [
        (None, "{}"),
        (Some("Bearer wrong"), "{}"),
        (Some(TOKEN), "{}"),
        (Some("Bearer wrong"), "this is not json"),
        (Some("bearer test-token"), r#"{"ventas_rango": "1M-10M"}"#),
    ];

    for (auth, body) in cases {
        let (status, body) = post_diagnostico(create_app(state.clone()), auth, body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "auth={:?}", auth);
        assert_eq!(body, json!({ "error": "Unauthorized" }));
    }
}

#[tokio::test]
async fn test_missing_secret_is_500() {
    let app = create_app(create_state(None, fixture_path(), None));

    let (status, body) = post_diagnostico(app, Some("Bearer anything"), "{}").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("ASFIES_TOKEN"));
}

#[tokio::test]
async fn test_invalid_json_is_400() {
    let app = create_app(create_state(Some(TOKEN), fixture_path(), None));

    let (status, body) = post_diagnostico(app, Some(&bearer()), "[1, 2, 3]").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_missing_matrix_is_generic_500() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(create_state(
        Some(TOKEN),
        dir.path().join("matriz.xlsx"),
        None,
    ));

    let (status, body) = post_diagnostico(app, Some(&bearer()), "{}").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["recomendaciones"], json!([]));
    assert!(!body["error"].as_str().unwrap().contains("matriz.xlsx"));
}

#[tokio::test]
async fn test_collateral_masks_institutions() {
    let mailer = Arc::new(CountingMailer::default());
    let app = create_app(create_state(Some(TOKEN), fixture_path(), Some(mailer.clone())));
    let body = json!({
        "ventas_rango": "10M+",
        "antiguedad": "Más de 5 años",
        "tiene_garantia_inmueble": true,
        "tipo_inmueble": "Nave industrial"
    });

    let (status, body) = post_diagnostico(app, Some(&bearer()), &body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["header"], "Tenemos las siguientes estrategias");
    assert_eq!(body["diagnostico_ia"], FALLBACK_WITH_COLLATERAL);
    let labels = financieras(&body);
    assert_eq!(
        labels,
        vec!["Estrategia Alfa", "Estrategia Beta", "Estrategia Delta"]
    );
    for label in &labels {
        assert!(!FIXTURE_INSTITUTIONS.contains(&label.as_str()));
    }
    assert_eq!(body["email_enviado"], true);
    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_notification_gating() {
    let mailer = Arc::new(CountingMailer::default());
    let state = create_state(Some(TOKEN), fixture_path(), Some(mailer.clone()));

    let (_, body) = post_diagnostico(
        create_app(state.clone()),
        Some(&bearer()),
        r#"{"solicita_contacto": "no", "tiene_garantia_inmueble": false}"#,
    )
    .await;
    assert!(body.get("email_enviado").is_none());
    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 0);

    let (status, body) = post_diagnostico(
        create_app(state.clone()),
        Some(&bearer()),
        r#"{"solicita_contacto": "sí"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email_enviado"], true);
    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_notification_also_fires_without_matches() {
    let mailer = Arc::new(CountingMailer::default());
    let app = create_app(create_state(Some(TOKEN), fixture_path(), Some(mailer.clone())));

    let (status, body) = post_diagnostico(
        app,
        Some(&bearer()),
        r#"{"solicita_contacto": true, "tipo_financiamiento": "hipoteca"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "not_found");
    assert_eq!(body["email_enviado"], true);
    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_delivery_keeps_200() {
    let mailer = Arc::new(CountingMailer {
        fail: true,
        ..Default::default()
    });
    let app = create_app(create_state(Some(TOKEN), fixture_path(), Some(mailer.clone())));

    let (status, body) = post_diagnostico(
        app,
        Some(&bearer()),
        r#"{"tiene_garantia_inmueble": "1"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email_enviado"], false);
    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_notification_without_mailer_is_false() {
    let app = create_app(create_state(Some(TOKEN), fixture_path(), None));

    let (status, body) =
        post_diagnostico(app, Some(&bearer()), r#"{"solicita_contacto": "yes"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email_enviado"], false);
}

#[tokio::test]
async fn test_matches_against_workbook_matrix() {
    let matrix = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/matriz.xlsx");
    let app = create_app(create_state(Some(TOKEN), matrix, None));
    let body = json!({ "ventas_rango": "0-1M", "antiguedad": "Entre 3 y 5 años" });

    let (status, body) = post_diagnostico(app, Some(&bearer()), &body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(financieras(&body), vec!["Banco Norte"]);
}

fn oversized_body() -> String {
    format!(r#"{{"nombre_empresa": "{}"}}"#, "a".repeat(2 * MAX_BODY_BYTES))
}

#[tokio::test]
async fn test_oversized_body_with_wrong_token_is_unauthorized() {
    let app = create_app(create_state(Some(TOKEN), fixture_path(), None));

    let (status, body) = post_diagnostico(app, Some("Bearer wrong"), &oversized_body()).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn test_oversized_body_with_valid_token_is_json_413() {
    let app = create_app(create_state(Some(TOKEN), fixture_path(), None));

    let (status, body) = post_diagnostico(app, Some(&bearer()), &oversized_body()).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].as_str().unwrap().contains("exceeds"));
}

#[tokio::test]
async fn test_rate_limited_requests_get_json_429() {
    let app = build_router(create_state(Some(TOKEN), fixture_path(), None), true).unwrap();

    let mut last = None;
    for _ in 0..11 {
        let request = Request::builder()
            .method("POST")
            .uri("/diagnostico")
            .header("x-forwarded-for", "203.0.113.7")
            .header("authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        last = Some(app.clone().oneshot(request).await.unwrap());
    }

    let response = last.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Too many requests"));
}

async fn get_health(app: Router) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_ok() {
    let app = create_app(create_state(Some(TOKEN), fixture_path(), None));

    let (status, body) = get_health(app).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["token_configured"], true);
    assert_eq!(body["matriz_exists"], true);
    assert_eq!(body["openai_configured"], false);
    assert_eq!(body["smtp_configured"], false);
}

#[tokio::test]
async fn test_health_degraded_without_token_or_matrix() {
    let app = create_app(create_state(None, fixture_path(), None));
    let (status, body) = get_health(app).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["token_configured"], false);

    let dir = tempfile::tempdir().unwrap();
    let app = create_app(create_state(Some(TOKEN), dir.path().join("matriz.xlsx"), None));
    let (status, body) = get_health(app).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["matriz_exists"], false);
}
