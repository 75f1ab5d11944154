mod auth;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use log::{error, info};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use proxy_core::bridges::BridgePatcher;
use proxy_core::config::ControlConfig;
use proxy_core::control::ControlChannel;
use proxy_core::engine::docker::DockerEngine;
use proxy_core::engine::{ContainerEngine, EngineError};
use proxy_core::lifecycle::LifecycleOrchestrator;
use proxy_core::status::{ExitIpProbe, SocksIpProbe, StatusAggregator};
use proxy_core::unit::{CommandOutcome, ServiceStatus, UnitKind};

use auth::Credentials;

// App State
#[derive(Clone)]
struct AppState {
    engine: Arc<dyn ContainerEngine>,
    lifecycle: Arc<LifecycleOrchestrator>,
    control: Arc<ControlChannel>,
    bridges: Arc<BridgePatcher>,
    status: Arc<StatusAggregator>,
    config: Arc<ControlConfig>,
}

/// Internal faults surface as a plain 500 with the fault's description;
/// per-field error codes are deliberately not part of this API.
struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("=== Tor Proxy Control Plane Starting ===");

    let config = Arc::new(ControlConfig::from_env());

    let engine: Arc<dyn ContainerEngine> = Arc::new(DockerEngine::connect()?);
    let probe: Arc<dyn ExitIpProbe> = Arc::new(SocksIpProbe::new(
        &config.socks_proxy_url,
        &config.ip_check_url,
        Duration::from_secs(config.ip_check_timeout_secs),
    )?);

    let creds = Arc::new(Credentials {
        username: config.admin_user.clone(),
        password: config.admin_pass.clone(),
    });
    let state = build_state(config.clone(), engine, probe);
    let app = router(state, creds);

    let addr = format!("0.0.0.0:{}", config.server_port);
    info!("Tor Proxy API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_state(
    config: Arc<ControlConfig>,
    engine: Arc<dyn ContainerEngine>,
    probe: Arc<dyn ExitIpProbe>,
) -> AppState {
    let lifecycle = Arc::new(LifecycleOrchestrator::new(engine.clone(), config.units()));
    let control = Arc::new(ControlChannel::new(
        engine.clone(),
        config.tor_container_name.clone(),
        config.control_port,
    ));
    let bridges = Arc::new(BridgePatcher::new(
        engine.clone(),
        config.tor_container_name.clone(),
        config.torrc_path.clone(),
        config.torrc_dir.clone(),
    ));
    let status = Arc::new(StatusAggregator::new(
        engine.clone(),
        probe,
        config.tor_container_name.clone(),
        config.lyrebird_container_name.clone(),
        config.torrc_path.clone(),
    ));
    AppState {
        engine,
        lifecycle,
        control,
        bridges,
        status,
        config,
    }
}

fn router(state: AppState, creds: Arc<Credentials>) -> Router {
    let api = Router::new()
        .route("/api/status", get(get_status))
        .route("/api/start", post(start_services))
        .route("/api/stop", post(stop_services))
        .route("/api/restart", post(restart_services))
        .route("/api/newnym", post(new_nym))
        .route("/api/logs", get(get_all_logs))
        .route("/api/logs/:service", get(get_service_logs))
        .route("/api/bridges", post(add_bridge))
        .route_layer(middleware::from_fn_with_state(creds, auth::basic_auth));

    Router::new()
        .merge(api)
        .route("/", get(root))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Unauthenticated liveness probe.
async fn root() -> Json<Value> {
    Json(json!({
        "message": "Tor Proxy API is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn get_status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.status.snapshot().await)
}

async fn start_services(State(state): State<AppState>) -> Result<Json<CommandOutcome>, ApiError> {
    Ok(Json(state.lifecycle.start().await?))
}

async fn stop_services(State(state): State<AppState>) -> Result<Json<CommandOutcome>, ApiError> {
    Ok(Json(state.lifecycle.stop().await?))
}

async fn restart_services(State(state): State<AppState>) -> Result<Json<CommandOutcome>, ApiError> {
    Ok(Json(state.lifecycle.restart().await?))
}

async fn new_nym(State(state): State<AppState>) -> Result<Json<CommandOutcome>, ApiError> {
    Ok(Json(state.control.signal_new_circuit().await?))
}

async fn get_service_logs(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Response, ApiError> {
    let name = if service == UnitKind::Primary.api_alias() {
        &state.config.tor_container_name
    } else if service == UnitKind::TransportHelper.api_alias() {
        &state.config.lyrebird_container_name
    } else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": format!("Service {} not found", service) })),
        )
            .into_response());
    };

    let logs = state
        .engine
        .logs(name, state.config.service_log_tail)
        .await?;
    Ok(Json(json!({ "service": service, "logs": logs })).into_response())
}

/// Combined log view: each service degrades to an error string on its own.
async fn get_all_logs(State(state): State<AppState>) -> Json<Value> {
    let mut out = serde_json::Map::new();
    let services = [
        (UnitKind::Primary, &state.config.tor_container_name),
        (UnitKind::TransportHelper, &state.config.lyrebird_container_name),
    ];
    for (kind, name) in services {
        let text = match state.engine.logs(name, state.config.combined_log_tail).await {
            Ok(t) => t,
            Err(e) => {
                error!("Error getting {} logs: {}", kind, e);
                format!("Error: {}", e)
            }
        };
        out.insert(kind.api_alias().to_string(), Value::String(text));
    }
    Json(Value::Object(out))
}

#[derive(Debug, Deserialize)]
struct BridgeConfig {
    bridge_line: String,
}

async fn add_bridge(
    State(state): State<AppState>,
    Json(body): Json<BridgeConfig>,
) -> Result<Json<CommandOutcome>, ApiError> {
    Ok(Json(state.bridges.add_bridge(&body.bridge_line).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use base64::Engine as _;
    use http_body_util::BodyExt;
    use proxy_core::engine::mock::MockEngine;
    use proxy_core::unit::UnitState;
    use tower::ServiceExt;

    const TOR: &str = "tor_proxy_tor";
    const LYREBIRD: &str = "tor_proxy_lyrebird";

    struct StubProbe;

    #[async_trait::async_trait]
    impl ExitIpProbe for StubProbe {
        async fn current_ip(&self) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("no proxy in tests"))
        }
    }

    fn test_app(engine: Arc<MockEngine>) -> Router {
        let config = Arc::new(ControlConfig::default());
        let creds = Arc::new(Credentials {
            username: config.admin_user.clone(),
            password: config.admin_pass.clone(),
        });
        let state = build_state(config, engine, Arc::new(StubProbe));
        router(state, creds)
    }

    fn auth_header() -> String {
        let cfg = ControlConfig::default();
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", cfg.admin_user, cfg.admin_pass));
        format!("Basic {}", encoded)
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn root_requires_no_auth() {
        let app = test_app(Arc::new(MockEngine::new()));
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["message"], "Tor Proxy API is running");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn api_rejects_missing_credentials() {
        let app = test_app(Arc::new(MockEngine::new()));
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Basic"
        );
    }

    #[tokio::test]
    async fn api_rejects_wrong_password() {
        let app = test_app(Arc::new(MockEngine::new()));
        let bogus = base64::engine::general_purpose::STANDARD.encode("admin:wrong");
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .header(header::AUTHORIZATION, format!("Basic {}", bogus))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn status_reports_states_and_degrades_ip() {
        let engine = Arc::new(
            MockEngine::new()
                .with_unit(TOR, UnitState::Running)
                .with_unit(LYREBIRD, UnitState::Exited),
        );
        engine.set_exec_output(TOR, "Tor version 0.4.8.10.\n");
        engine.set_file(TOR, "/etc/tor/torrc", "SocksPort 9050\n");

        let app = test_app(engine);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .header(header::AUTHORIZATION, auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["tor_status"], "running");
        assert_eq!(body["lyrebird_status"], "exited");
        assert_eq!(body["current_ip"], Value::Null);
        assert_eq!(body["tor_version"], "Tor version 0.4.8.10.");
        assert_eq!(body["bridges_enabled"], false);
    }

    #[tokio::test]
    async fn start_endpoint_reports_missing_container() {
        let app = test_app(Arc::new(MockEngine::new()));
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/start")
                    .header(header::AUTHORIZATION, auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn unknown_log_service_is_404() {
        let app = test_app(Arc::new(MockEngine::new()));
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/logs/postgres")
                    .header(header::AUTHORIZATION, auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn service_logs_returned_for_known_alias() {
        let engine = Arc::new(MockEngine::new().with_unit(TOR, UnitState::Running));
        engine.set_logs(TOR, "Bootstrapped 100% (done): Done\n");

        let app = test_app(engine);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/logs/tor")
                    .header(header::AUTHORIZATION, auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["service"], "tor");
        assert!(body["logs"].as_str().unwrap().contains("Bootstrapped"));
    }

    #[tokio::test]
    async fn combined_logs_degrade_per_service() {
        let engine = Arc::new(MockEngine::new().with_unit(TOR, UnitState::Running));
        engine.set_logs(TOR, "tor log line\n");
        // lyrebird is absent: its entry becomes an error string

        let app = test_app(engine);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/logs")
                    .header(header::AUTHORIZATION, auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["tor"], "tor log line\n");
        assert!(body["lyrebird"].as_str().unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn duplicate_bridge_is_rejected_without_restart() {
        let engine = Arc::new(MockEngine::new().with_unit(TOR, UnitState::Running));
        let line = "Bridge obfs4 1.2.3.4:443 FPR cert=X";
        engine.set_file(TOR, "/etc/tor/torrc", &format!("UseBridges 1\n{}\n", line));

        let app = test_app(engine.clone());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/bridges")
                    .header(header::AUTHORIZATION, auth_header())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "bridge_line": line }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(engine.call_count("restart:"), 0);
    }

    #[tokio::test]
    async fn newnym_reports_control_reply() {
        let engine = Arc::new(MockEngine::new().with_unit(TOR, UnitState::Running));
        engine.set_exec_output(TOR, "250 OK\r\n");

        let app = test_app(engine);
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/newnym")
                    .header(header::AUTHORIZATION, auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn engine_outage_is_a_500() {
        let engine = Arc::new(
            MockEngine::new()
                .with_unit(TOR, UnitState::Running)
                .with_unit(LYREBIRD, UnitState::Running),
        );
        engine.set_unavailable();

        let app = test_app(engine);
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/restart")
                    .header(header::AUTHORIZATION, auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
