//! `NodelightServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{Json, Response};
use axum::routing::get;
use nodelight_core::{Device, Frame};
use nodelight_settings::ServerSettings;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::hub::HubHandle;
use crate::router::MessageRouter;
use crate::session::run_session;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Hub front door.
    pub hub: HubHandle,
    /// Inbound frame dispatcher.
    pub router: Arc<MessageRouter>,
    /// Outbound queue size per client.
    pub client_queue_capacity: usize,
    /// Heartbeat interval.
    pub ping_interval: Duration,
    /// When the server started.
    pub start_time: Instant,
}

/// The relay server.
pub struct NodelightServer {
    settings: ServerSettings,
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
}

impl NodelightServer {
    /// Create a server fronting `hub`, with `device` as the optional bridge.
    pub fn new(
        settings: ServerSettings,
        hub: HubHandle,
        device: Option<Arc<dyn Device>>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        let router = MessageRouter::new(Arc::new(hub.clone()), device);
        let state = AppState {
            hub,
            router: Arc::new(router),
            client_queue_capacity: settings.client_queue_capacity,
            ping_interval: Duration::from_secs(settings.ping_interval_secs.max(1)),
            start_time: Instant::now(),
        };
        Self {
            settings,
            state,
            shutdown,
        }
    }

    /// Build the Axum router with all routes.
    ///
    /// Any path not matched by the API falls through to the static directory.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.settings.ws_path, get(ws_handler))
            .route("/health", get(health_handler))
            .route("/api/states", get(states_handler))
            .fallback_service(ServeDir::new(&self.settings.static_dir))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until shutdown is signalled.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(
        &self,
    ) -> Result<(SocketAddr, JoinHandle<Result<(), ServerError>>), ServerError> {
        let address = self.settings.bind_addr();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;
        let local = listener.local_addr()?;
        info!(%local, ws_path = %self.settings.ws_path, "server listening");

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
                .map_err(|e| {
                    warn!(error = %e, "server stopped with error");
                    ServerError::Serve(e)
                })
        });
        Ok((local, handle))
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }
}

/// GET <ws path>
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let device = state.router.device();
    Json(health::health_check(
        state.start_time,
        state.hub.client_count(),
        device.map(|d| d.kind()),
        device.map_or(0, |d| d.all_node_states().len()),
    ))
}

/// GET /api/states
async fn states_handler(State(state): State<AppState>) -> Json<Frame> {
    let states = state
        .router
        .device()
        .map(|d| d.all_node_states())
        .unwrap_or_default();
    Json(Frame::AllStates { states })
}
