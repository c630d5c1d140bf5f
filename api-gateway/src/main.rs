// ==============================================================================
// main.rs - Exomiser Portal Web Server Entry Point
// ==============================================================================
// Description: Axum web server for individuals, Exomiser analyses and reports
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use exomiser_core::config::Settings;
use exomiser_core::validator::MAX_VCF_FILE_SIZE;

mod handlers;
mod middleware;
mod models;
mod state;

use handlers::{admin, analyses, auth, individuals, system};
use state::AppState;

/// Request body cap: a full-size VCF plus multipart framing and form fields,
/// so oversize files reach the validator's "File too large" message
const MAX_BODY_BYTES: usize = MAX_VCF_FILE_SIZE + 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting Exomiser Portal v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::from_env().context("Invalid configuration")?;
    let server_port = settings.server_port;

    // Initialize application state
    let state = AppState::new(settings)
        .await
        .context("Failed to initialize application state")?;

    let app = build_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], server_port));
    info!("Exomiser Portal listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.runner().wait_idle().await;
    info!("Shutdown complete");

    Ok(())
}

/// Compact human-readable logs, or JSON lines with `LOG_FORMAT=json`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("exomiser_web=info,exomiser_worker=info,exomiser_core=info,tower_http=info")
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, finishing running analyses"),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
}

fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let individual_routes = Router::new()
        .route(
            "/individuals",
            get(individuals::list_individuals).post(individuals::add_individual),
        )
        .route(
            "/individuals/{id}",
            get(individuals::view_individual)
                .post(individuals::edit_individual)
                .delete(individuals::delete_individual),
        )
        .route("/individuals/{id}/vcf", get(individuals::download_vcf));

    let analysis_routes = Router::new()
        .route(
            "/analyses",
            get(analyses::list_analyses).post(analyses::add_analysis),
        )
        .route("/analyses/results", get(analyses::list_results))
        .route("/analyses/search", get(analyses::search_analyses))
        .route(
            "/analyses/{id}",
            get(analyses::view_analysis)
                .put(analyses::edit_analysis)
                .delete(analyses::delete_analysis),
        )
        .route("/analyses/{id}/run", post(analyses::run_analysis))
        .route("/analyses/{id}/rerun", post(analyses::rerun_analysis))
        .route("/analyses/{id}/cancel", post(analyses::cancel_analysis))
        .route("/analyses/{id}/output", get(analyses::analysis_output))
        .route("/analyses/{id}/download", get(analyses::download_report))
        .route("/analyses/{id}/html", get(analyses::report_html));

    let admin_routes = Router::new()
        .route("/admin/users", get(admin::list_users).post(admin::add_user))
        .route(
            "/admin/users/{id}",
            put(admin::edit_user).delete(admin::delete_user),
        )
        .route("/admin/users/{id}/toggle-status", post(admin::toggle_status))
        .route("/admin/users/{id}/toggle-admin", post(admin::toggle_admin))
        .route("/admin/users/{id}/reset-password", post(admin::reset_password));

    // Origins are configured via CORS_ALLOWED_ORIGINS (comma-separated)
    let allowed_origins: Vec<HeaderValue> = state
        .settings()
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        // Session cookie must accompany cross-origin AJAX calls
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health_check))
        .route("/ready", get(system::readiness_check))
        .merge(auth_routes)
        .merge(individual_routes)
        .merge(analysis_routes)
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                // Request tracing
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                // Request body size limit (500MB for large VCF files)
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::SESSION_COOKIE;
    use crate::state::test_support;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, Response, StatusCode};
    use exomiser_core::db::users;
    use exomiser_core::security::hash_password;
    use serde_json::{json, Value};
    use std::path::Path;
    use tower::ServiceExt;

    const BOUNDARY: &str = "exomiser-test-boundary";
    const VCF: &[u8] = b"##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";

    async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response<Body>) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    }

    fn cookie(token: &str) -> String {
        format!("{}={}", SESSION_COOKIE, token)
    }

    fn get_with(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::COOKIE, cookie(token))
            .body(Body::empty())
            .unwrap()
    }

    fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, cookie(token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn multipart_request(
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
    ) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((filename, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"vcf_file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::COOKIE, cookie(token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn individual_fields(identity: &str) -> Vec<(&'static str, String)> {
        vec![
            ("individual_id", identity.to_string()),
            ("full_name", "Jane Doe".to_string()),
            ("sex", "FEMALE".to_string()),
            ("age_years", "10".to_string()),
            (
                "hpo_terms",
                r#"[{"id":"HP:0001250","label":"Seizures"}]"#.to_string(),
            ),
        ]
    }

    async fn add_individual(app: &Router, token: &str, identity: &str) -> Response<Body> {
        let fields = individual_fields(identity);
        let borrowed: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        send(
            app,
            multipart_request("/individuals", token, &borrowed, Some(("sample.vcf", VCF))),
        )
        .await
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[test]
    fn test_body_limit_leaves_room_for_framing() {
        let headroom = MAX_BODY_BYTES - MAX_VCF_FILE_SIZE;
        assert_eq!(headroom, 1024 * 1024);
    }

    #[tokio::test]
    async fn test_router_builds() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_support::state(dir.path()).await);

        let response = send(&app, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, Request::builder().uri("/ready").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["database"], json!(true));
    }

    #[tokio::test]
    async fn test_protected_routes_require_login() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_support::state(dir.path()).await);

        for uri in ["/individuals", "/analyses", "/analyses/1/output", "/me", "/admin/users"] {
            let response = send(&app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_register_login_logout() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path()).await;
        let app = build_router(state.clone());

        let response = send(
            &app,
            json_request(
                Method::POST,
                "/register",
                None,
                json!({"email": " New@Example.org ", "password": "longenough", "confirm_password": "longenough", "full_name": "New User"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let stored = users::find_by_email(state.db_pool(), "new@example.org")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored.password_hash, "longenough");
        assert!(stored.is_active && !stored.is_admin);

        let response = send(
            &app,
            json_request(
                Method::POST,
                "/login",
                None,
                json!({"email": "new@example.org", "password": "wrong-password"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], json!("Invalid credentials"));

        let response = send(
            &app,
            json_request(
                Method::POST,
                "/login",
                None,
                json!({"email": "NEW@example.org", "password": "longenough", "remember": true}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));
        assert!(set_cookie.contains("Max-Age=2592000"));

        let pair = set_cookie.split(';').next().unwrap();
        let token = pair.trim_start_matches(&format!("{}=", SESSION_COOKIE));

        let response = send(&app, get_with("/me", token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["user"]["email"], json!("new@example.org"));

        let response = send(
            &app,
            Request::builder()
                .method(Method::POST)
                .uri("/logout")
                .header(header::COOKIE, cookie(token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, get_with("/me", token)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_disabled_account_gets_distinct_message() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path()).await;
        let app = build_router(state.clone());

        let hash = hash_password("correct-horse").unwrap();
        users::create(state.db_pool(), "off@example.org", &hash, None, false, false)
            .await
            .unwrap();

        let response = send(
            &app,
            json_request(
                Method::POST,
                "/login",
                None,
                json!({"email": "off@example.org", "password": "correct-horse"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            json_body(response).await["error"],
            json!("Account is disabled. Contact admin.")
        );
    }

    #[tokio::test]
    async fn test_add_individual_and_duplicate_identity() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path()).await;
        let app = build_router(state.clone());
        let (user, token) = test_support::signed_in(&state, "lab@example.org", false).await;

        let response = add_individual(&app, &token, "P0001").await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["identity"], json!("P0001"));
        assert_eq!(created["vcf_filename"], json!("sample.vcf"));
        let yaml = created["phenopacket_yaml"].as_str().unwrap();
        assert!(yaml.starts_with("id: P0001\n"));
        assert!(yaml.contains("label: Seizures"));

        let stored = created["vcf_file_path"].as_str().unwrap();
        let stored_name = Path::new(stored).file_name().unwrap().to_string_lossy().into_owned();
        assert!(stored_name.starts_with(&format!("{}_P0001_", user.id)));
        assert_eq!(file_count(&state.storage().upload_dir), 1);

        // Re-fetched YAML carries exactly the submitted terms and age
        let id = created["id"].as_i64().unwrap();
        let response = send(&app, get_with(&format!("/individuals/{}", id), &token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let detail = json_body(response).await;
        let yaml: serde_yaml::Value =
            serde_yaml::from_str(detail["phenopacket_yaml"].as_str().unwrap()).unwrap();
        let features = yaml["phenotypicFeatures"].as_sequence().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["type"]["id"].as_str(), Some("HP:0001250"));
        assert_eq!(features[0]["type"]["label"].as_str(), Some("Seizures"));
        assert_eq!(yaml["subject"]["age"]["age"].as_str(), Some("10Y"));
        assert_eq!(yaml["subject"]["id"].as_str(), Some("P0001"));

        let response = add_individual(&app, &token, "P0001").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            json_body(response).await["error"],
            json!("Individual ID 'P0001' already exists")
        );
        assert_eq!(file_count(&state.storage().upload_dir), 1);

        let response = send(&app, get_with("/individuals", &token)).await;
        let list = json_body(response).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["hpo_count"], json!(1));
    }

    #[tokio::test]
    async fn test_add_individual_reports_all_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path()).await;
        let app = build_router(state.clone());
        let (_, token) = test_support::signed_in(&state, "lab@example.org", false).await;

        let response = send(
            &app,
            multipart_request("/individuals", &token, &[("sex", "MALE")], None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let details = json_body(response).await["details"].as_str().unwrap().to_string();
        for expected in [
            "Individual ID is required",
            "Full name is required",
            "Age is required",
            "At least one HPO term is required",
            "VCF file is required",
        ] {
            assert!(details.contains(expected), "missing '{}' in {}", expected, details);
        }
        assert_eq!(file_count(&state.storage().upload_dir), 0);
    }

    #[tokio::test]
    async fn test_rejects_non_vcf_upload() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path()).await;
        let app = build_router(state.clone());
        let (_, token) = test_support::signed_in(&state, "lab@example.org", false).await;

        let fields = individual_fields("P0002");
        let borrowed: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let response = send(
            &app,
            multipart_request("/individuals", &token, &borrowed, Some(("notes.txt", b"hello"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(file_count(&state.storage().upload_dir), 0);
    }

    #[tokio::test]
    async fn test_delete_individual_blocked_by_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path()).await;
        let app = build_router(state.clone());
        let (_, token) = test_support::signed_in(&state, "lab@example.org", false).await;

        let individual = json_body(add_individual(&app, &token, "P0003").await).await;
        let individual_id = individual["id"].as_i64().unwrap();

        let response = send(
            &app,
            json_request(
                Method::POST,
                "/analyses",
                Some(&token),
                json!({"name": "Exome", "individual_id": individual_id}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let analysis = json_body(response).await;
        assert_eq!(analysis["status"], json!("PENDING"));
        assert_eq!(analysis["genome_assembly"], json!("hg19"));
        assert_eq!(analysis["frequency_threshold"], json!(1.0));
        assert_eq!(analysis["individual_identity"], json!("P0003"));

        let response = send(
            &app,
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/individuals/{}", individual_id))
                .header(header::COOKIE, cookie(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let error = json_body(response).await["error"].as_str().unwrap().to_string();
        assert!(error.contains("1 analysis task(s) are associated"));
    }

    #[tokio::test]
    async fn test_download_vcf_uses_identity_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path()).await;
        let app = build_router(state.clone());
        let (_, token) = test_support::signed_in(&state, "lab@example.org", false).await;

        let individual = json_body(add_individual(&app, &token, "P0004").await).await;
        let stored = individual["vcf_file_path"].as_str().unwrap();
        let basename = Path::new(stored).file_name().unwrap().to_string_lossy().into_owned();

        let response = send(
            &app,
            get_with(&format!("/individuals/{}/vcf", individual["id"]), &token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(disposition, format!("attachment; filename=\"P0004_{}\"", basename));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], VCF);
    }

    #[tokio::test]
    async fn test_output_and_search_never_fail_for_unknown_data() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path()).await;
        let app = build_router(state.clone());
        let (_, token) = test_support::signed_in(&state, "lab@example.org", false).await;

        let response = send(&app, get_with("/analyses/999/output", &token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"lines": [], "count": 0}));

        let response = send(&app, get_with("/analyses/search?q=anything", &token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["count"], json!(0));

        let response = send(&app, get_with("/analyses/999/download", &token)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_toggles_and_self_protection() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path()).await;
        let app = build_router(state.clone());
        let (admin, admin_token) = test_support::signed_in(&state, "admin@example.org", true).await;
        let (user, user_token) = test_support::signed_in(&state, "user@example.org", false).await;

        let response = send(
            &app,
            json_request(
                Method::POST,
                &format!("/admin/users/{}/toggle-status", admin.id),
                Some(&user_token),
                json!({"action": "inactive"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(
            &app,
            json_request(
                Method::POST,
                &format!("/admin/users/{}/toggle-status", admin.id),
                Some(&admin_token),
                json!({"action": "inactive"}),
            ),
        )
        .await;
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("Cannot modify your own account"));

        let response = send(
            &app,
            json_request(
                Method::POST,
                &format!("/admin/users/{}/toggle-admin", admin.id),
                Some(&admin_token),
                json!({"action": "user"}),
            ),
        )
        .await;
        assert_eq!(json_body(response).await["success"], json!(false));

        let response = send(
            &app,
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/admin/users/{}", admin.id))
                .header(header::COOKIE, cookie(&admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(json_body(response).await["success"], json!(false));

        let response = send(
            &app,
            json_request(
                Method::POST,
                &format!("/admin/users/{}/toggle-status", user.id),
                Some(&admin_token),
                json!({"action": "bogus"}),
            ),
        )
        .await;
        assert_eq!(json_body(response).await["message"], json!("Invalid action"));

        let response = send(
            &app,
            json_request(
                Method::POST,
                &format!("/admin/users/{}/toggle-status", user.id),
                Some(&admin_token),
                json!({"action": "inactive"}),
            ),
        )
        .await;
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["is_active"], json!(false));

        // Deactivated user is logged out on the next request
        let response = send(&app, get_with("/individuals", &user_token)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            &app,
            json_request(
                Method::POST,
                &format!("/admin/users/{}/reset-password", user.id),
                Some(&admin_token),
                json!({"password": "short"}),
            ),
        )
        .await;
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("Password must be at least 8 characters"));
    }

    #[cfg(unix)]
    mod runs {
        use super::*;
        use exomiser_core::config::ExomiserConfig;
        use std::path::PathBuf;
        use std::time::{Duration, Instant};

        /// Exomiser stand-in: `/bin/sh <script>` with the usual arguments
        async fn app_with_script(root: &Path, script: &str) -> (AppState, Router) {
            let script_path = root.join("fake-exomiser.sh");
            std::fs::write(&script_path, script).unwrap();

            let exomiser = ExomiserConfig {
                java_bin: PathBuf::from("/bin/sh"),
                jar_path: PathBuf::from("exomiser-cli.jar"),
                memory_flags: vec![script_path.to_string_lossy().into_owned()],
                analysis_config: PathBuf::from("analysis.yml"),
                application_properties: None,
                work_dir: None,
            };
            let state = test_support::state_with(root, exomiser).await;
            let app = build_router(state.clone());
            (state, app)
        }

        async fn create_analysis(app: &Router, token: &str, identity: &str) -> i64 {
            let individual = json_body(add_individual(app, token, identity).await).await;
            let response = send(
                app,
                json_request(
                    Method::POST,
                    "/analyses",
                    Some(token),
                    json!({"name": "Trio exome", "individual_id": individual["id"]}),
                ),
            )
            .await;
            json_body(response).await["id"].as_i64().unwrap()
        }

        async fn wait_for_output(app: &Router, token: &str, id: i64, needle: &str) {
            let deadline = Instant::now() + Duration::from_secs(15);
            loop {
                let body = json_body(send(app, get_with(&format!("/analyses/{}/output", id), token)).await).await;
                let seen = body["lines"]
                    .as_array()
                    .map(|lines| lines.iter().any(|line| line == needle))
                    .unwrap_or(false);
                if seen {
                    return;
                }
                assert!(Instant::now() < deadline, "output '{}' never appeared", needle);
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        }

        #[tokio::test]
        async fn test_run_completes_and_serves_report() {
            let dir = tempfile::tempdir().unwrap();
            let results = dir.path().join("results");
            let script = format!(
                "echo 'Exomiser starting'\necho '<html>P0010 report</html>' > '{}/P0010_exomiser.html'\necho 'done' 1>&2\n",
                results.display()
            );
            let (state, app) = app_with_script(dir.path(), &script).await;
            let (_, token) = test_support::signed_in(&state, "lab@example.org", false).await;
            let id = create_analysis(&app, &token, "P0010").await;

            let response = send(
                &app,
                json_request(Method::POST, &format!("/analyses/{}/run", id), Some(&token), json!({})),
            )
            .await;
            assert_eq!(response.status(), StatusCode::ACCEPTED);
            assert_eq!(json_body(response).await["status"], json!("RUNNING"));

            state.runner().wait_idle().await;

            let analysis = json_body(send(&app, get_with(&format!("/analyses/{}", id), &token)).await).await;
            assert_eq!(analysis["status"], json!("COMPLETED"));
            assert_eq!(analysis["has_report"], json!(true));
            assert!(analysis["error_message"].is_null());
            assert!(analysis["phenopacket_path"]
                .as_str()
                .unwrap()
                .ends_with(&format!("analysis_{}.yml", id)));

            let output = json_body(send(&app, get_with(&format!("/analyses/{}/output", id), &token)).await).await;
            // stdout and stderr interleave in arrival order
            let lines = output["lines"].as_array().unwrap();
            assert_eq!(output["count"], json!(2));
            assert!(lines.contains(&json!("Exomiser starting")));
            assert!(lines.contains(&json!("done")));

            let response = send(&app, get_with(&format!("/analyses/{}/download", id), &token)).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
                "attachment; filename=\"sample_analysis.html\""
            );

            let response = send(&app, get_with(&format!("/analyses/{}/html", id), &token)).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response
                .headers()
                .get(header::CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/html"));
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&bytes[..], b"<html>P0010 report</html>\n");

            let response = send(&app, get_with("/analyses/search?q=p0010", &token)).await;
            let hits = json_body(response).await;
            assert_eq!(hits["count"], json!(1));
            assert_eq!(hits["results"][0]["individual_identity"], json!("P0010"));

            // COMPLETED is not runnable; rerun is
            let response = send(
                &app,
                json_request(Method::POST, &format!("/analyses/{}/run", id), Some(&token), json!({})),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CONFLICT);

            let response = send(
                &app,
                json_request(Method::POST, &format!("/analyses/{}/rerun", id), Some(&token), json!({})),
            )
            .await;
            assert_eq!(response.status(), StatusCode::ACCEPTED);
            let rerun = json_body(response).await;
            assert_eq!(rerun["status"], json!("RUNNING"));
            assert!(rerun["completed_at"].is_null());
            assert!(rerun["output_html"].is_null());
            state.runner().wait_idle().await;
        }

        #[tokio::test]
        async fn test_failed_run_records_exit_code() {
            let dir = tempfile::tempdir().unwrap();
            let (state, app) = app_with_script(dir.path(), "echo 'bad input' 1>&2\nexit 3\n").await;
            let (_, token) = test_support::signed_in(&state, "lab@example.org", false).await;
            let id = create_analysis(&app, &token, "P0011").await;

            send(
                &app,
                json_request(Method::POST, &format!("/analyses/{}/run", id), Some(&token), json!({})),
            )
            .await;
            state.runner().wait_idle().await;

            let analysis = json_body(send(&app, get_with(&format!("/analyses/{}", id), &token)).await).await;
            assert_eq!(analysis["status"], json!("FAILED"));
            assert!(analysis["error_message"]
                .as_str()
                .unwrap()
                .contains("exited with code 3"));

            // Editing a FAILED analysis puts it back to PENDING
            let response = send(
                &app,
                json_request(
                    Method::PUT,
                    &format!("/analyses/{}", id),
                    Some(&token),
                    json!({"name": "Trio exome v2", "individual_id": analysis["individual_id"]}),
                ),
            )
            .await;
            assert_eq!(response.status(), StatusCode::OK);
            let edited = json_body(response).await;
            assert_eq!(edited["status"], json!("PENDING"));
            assert!(edited["error_message"].is_null());
        }

        #[tokio::test]
        async fn test_running_analysis_is_locked_until_cancelled() {
            let dir = tempfile::tempdir().unwrap();
            let (state, app) = app_with_script(dir.path(), "echo 'started'\nexec sleep 30\n").await;
            let (_, token) = test_support::signed_in(&state, "lab@example.org", false).await;
            let id = create_analysis(&app, &token, "P0012").await;

            send(
                &app,
                json_request(Method::POST, &format!("/analyses/{}/run", id), Some(&token), json!({})),
            )
            .await;
            wait_for_output(&app, &token, id, "started").await;

            let response = send(
                &app,
                json_request(
                    Method::PUT,
                    &format!("/analyses/{}", id),
                    Some(&token),
                    json!({"name": "Renamed", "individual_id": 1}),
                ),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CONFLICT);

            let response = send(
                &app,
                Request::builder()
                    .method(Method::DELETE)
                    .uri(format!("/analyses/{}", id))
                    .header(header::COOKIE, cookie(&token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CONFLICT);

            let started = Instant::now();
            let response = send(
                &app,
                json_request(Method::POST, &format!("/analyses/{}/cancel", id), Some(&token), json!({})),
            )
            .await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["status"], json!("CANCELLED"));

            state.runner().wait_idle().await;
            assert!(started.elapsed() < Duration::from_secs(20));

            let analysis = json_body(send(&app, get_with(&format!("/analyses/{}", id), &token)).await).await;
            assert_eq!(analysis["status"], json!("CANCELLED"));
            assert!(!analysis["completed_at"].is_null());
        }
    }
}
