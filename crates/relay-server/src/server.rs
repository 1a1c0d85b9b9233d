//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_auth::SessionValidator;
use relay_bus::EventBus;
use relay_store::ConversationStore;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::event_bridge::EventBridge;
use crate::websocket::handler::CommandProcessor;
use crate::websocket::presence::PresenceBroadcaster;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::{SessionContext, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Dependencies handed to each upgraded session.
    pub session: Arc<SessionContext>,
    /// Token validation, run before every upgrade.
    pub validator: SessionValidator,
    /// Shutdown coordinator.
    pub shutdown: ShutdownCoordinator,
    /// Max inbound frame and message size.
    pub max_frame_bytes: usize,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed and metrics are enabled.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay server: one per process.
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceBroadcaster>,
    processor: Arc<CommandProcessor>,
    validator: SessionValidator,
    bus: Arc<dyn EventBus>,
    shutdown: ShutdownCoordinator,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a new server.
    pub fn new(
        config: ServerConfig,
        validator: SessionValidator,
        store: Arc<dyn ConversationStore>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = Arc::new(PresenceBroadcaster::new(registry.clone()));
        let processor = Arc::new(CommandProcessor::new(store, bus.clone(), config.command_timeout));
        Self {
            config,
            registry,
            presence,
            processor,
            validator,
            bus,
            shutdown: ShutdownCoordinator::new(),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `handle` at `/metrics` (ignored when metrics are disabled).
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        if self.config.metrics_enabled {
            self.metrics = Some(handle);
        }
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            session: Arc::new(SessionContext {
                presence: self.presence.clone(),
                processor: self.processor.clone(),
                limits: self.config.session_limits(),
            }),
            validator: self.validator.clone(),
            shutdown: self.shutdown.clone(),
            max_frame_bytes: self.config.max_frame_bytes,
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bus bridge for this server's registry, stopped by its shutdown token.
    pub fn event_bridge(&self, resubscribe_delay: Duration) -> EventBridge {
        EventBridge::new(
            self.bus.clone(),
            self.registry.clone(),
            self.shutdown.token(),
            resubscribe_delay,
        )
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the server task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();
        info!(%addr, "relay listening");

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// Stop accepting, close every session, and wait for `handles`.
    pub async fn shutdown_gracefully(&self, handles: Vec<JoinHandle<()>>) {
        self.shutdown
            .graceful_shutdown(&self.registry, handles, self.config.shutdown_timeout)
            .await;
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the presence broadcaster.
    pub fn presence(&self) -> &Arc<PresenceBroadcaster> {
        &self.presence
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[derive(Debug, Default, Deserialize)]
struct WsQuery {
    #[serde(default)]
    token: String,
}

/// GET /ws?token=…
///
/// The token is validated before the upgrade is attempted, so a bad token is
/// a plain 401 whether or not the request carried upgrade headers.
async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        counter!(WS_REJECTED_TOTAL, "reason" => "shutting_down").increment(1);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let identity = match state.validator.validate(&query.token).await {
        Ok(identity) => identity,
        Err(e) if e.is_upstream() => {
            warn!(error = %e, "session validation failed");
            counter!(WS_REJECTED_TOTAL, "reason" => "upstream").increment(1);
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        Err(_) => {
            debug!("rejected unauthenticated upgrade");
            counter!(WS_REJECTED_TOTAL, "reason" => "unauthenticated").increment(1);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            debug!(identity = %identity, "request is not a websocket upgrade");
            return rejection.into_response();
        }
    };

    let ctx = state.session.clone();
    upgrade
        .max_message_size(state.max_frame_bytes)
        .max_frame_size(state.max_frame_bytes)
        .on_upgrade(move |ws| run_ws_session(ws, identity, ctx))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.registry.len()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use relay_auth::{AuthError, InMemorySessionStore, SessionRecord, SessionStore};
    use relay_bus::InMemoryBus;
    use relay_store::InMemoryConversationStore;
    use tower::ServiceExt;

    fn validator() -> SessionValidator {
        let sessions = Arc::new(InMemorySessionStore::new());
        sessions.insert(
            "tok-alice",
            SessionRecord {
                identity: "alice".into(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            },
        );
        SessionValidator::new(sessions, Duration::from_secs(5))
    }

    fn make_server_with(validator: SessionValidator) -> RelayServer {
        RelayServer::new(
            ServerConfig::default(),
            validator,
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(InMemoryBus::new(8)),
        )
    }

    fn make_server() -> RelayServer {
        make_server_with(validator())
    }

    async fn get(app: Router, uri: &str) -> Response {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let resp = get(make_server().router(), "/health").await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
    }

    #[tokio::test]
    async fn ws_without_token_is_401() {
        let resp = get(make_server().router(), "/ws").await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ws_with_unknown_token_is_401() {
        let resp = get(make_server().router(), "/ws?token=nope").await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ws_with_valid_token_but_no_upgrade_is_rejected() {
        let resp = get(make_server().router(), "/ws?token=tok-alice").await;
        assert!(resp.status().is_client_error());
        assert_ne!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn lookup(&self, _token: &str) -> relay_auth::Result<Option<SessionRecord>> {
            Err(AuthError::Store("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn ws_with_broken_session_store_is_503() {
        let server = make_server_with(SessionValidator::new(
            Arc::new(BrokenStore),
            Duration::from_secs(5),
        ));
        let resp = get(server.router(), "/ws?token=tok-alice").await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn ws_during_shutdown_is_503() {
        let server = make_server();
        server.shutdown().shutdown();
        let resp = get(server.router(), "/ws?token=tok-alice").await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let resp = get(make_server().router(), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_handle_renders() {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let server = make_server().with_metrics(handle);
        let resp = get(server.router(), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_disabled_ignores_handle() {
        let config = ServerConfig {
            metrics_enabled: false,
            ..ServerConfig::default()
        };
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let server = RelayServer::new(
            config,
            validator(),
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(InMemoryBus::new(8)),
        )
        .with_metrics(handle);
        let resp = get(server.router(), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let resp = get(make_server().router(), "/nonexistent").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown_gracefully(vec![handle]).await;
        assert!(server.shutdown().is_shutting_down());
    }
}
