//! HTTP and WebSocket server
//!
//! `/ws/chat` carries the chat stream, `/auth/*` manages login sessions
//! issued on top of the identity proxy.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::auth::{
    clear_cookie, complete_login, cookie_value, logout_url, session_cookie, AuthSessions,
    IdentityProvider, ProxyHeaderProvider,
};
use crate::config::{AppConfig, AuthConfig, SessionSettings};
use crate::error::FintrackError;
use crate::orchestrator::Orchestrator;
use crate::services::AccountService;
use crate::session::{ChatSession, DeliveryHub, OutboundFrame};
use crate::store::LedgerStore;
use crate::tools::CallerContext;

/// Frames queued per connection before the hub drops it as stalled.
const OUTBOUND_CAPACITY: usize = 128;

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse::error(message))).into_response()
}

/// =============================
/// App State
/// =============================

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn LedgerStore>,
    pub accounts: AccountService,
    pub hub: DeliveryHub,
    pub sessions: AuthSessions,
    pub identity: Arc<dyn IdentityProvider>,
    pub settings: SessionSettings,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn LedgerStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            orchestrator,
            accounts: AccountService::new(store.clone()),
            store,
            hub: DeliveryHub::new(),
            sessions: AuthSessions::new(),
            identity: Arc::new(ProxyHeaderProvider::from_config(&config.auth)),
            settings: config.session.clone(),
            auth: config.auth.clone(),
        }
    }

    /// Caller bound to the request's session cookie, if it names an active user.
    async fn resolve_caller(&self, headers: &HeaderMap) -> Option<CallerContext> {
        let token = cookie_value(headers, &self.auth.cookie_name)?;
        let user_id = self.sessions.resolve(&token).await?;

        match self.store.get_user(user_id).await {
            Ok(Some(user)) if user.is_active => Some(CallerContext::new(
                user.id,
                &self.settings.currency,
                &self.settings.timezone,
            )),
            Ok(_) => None,
            Err(e) => {
                warn!(%user_id, error = %e, "Failed to load session user");
                None
            }
        }
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Stream
/// =============================

async fn ws_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(caller) = state.resolve_caller(&headers).await else {
        warn!("Rejected unauthenticated chat connection");
        return error_response(StatusCode::UNAUTHORIZED, "Not authenticated".to_string());
    };

    let Some(ws) = ws else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Expected a WebSocket upgrade".to_string(),
        );
    };

    info!(user_id = %caller.user_id, connection_id = %caller.connection_id, "Upgrading chat connection");
    ws.on_upgrade(move |socket| handle_socket(state, caller, socket))
}

async fn handle_socket(state: AppState, caller: CallerContext, socket: WebSocket) {
    let connection_id = caller.connection_id;
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_CAPACITY);

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match frame.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(%connection_id, error = %e, "Failed to encode frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                debug!(%connection_id, "Socket closed while writing");
                break;
            }
        }
    });

    let mut session = match ChatSession::open(
        Some(caller),
        state.orchestrator.clone(),
        state.hub.clone(),
        state.settings.clone(),
        tx,
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            warn!(%connection_id, error = %e, "Could not open chat session");
            writer.abort();
            return;
        }
    };

    // The writer ends when the socket fails or the hub drops this connection.
    let mut writer_done = false;
    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    // Failures were already reported to the client as an error frame.
                    if let Err(e) = session.handle_message(&text).await {
                        debug!(%connection_id, error = %e, "Turn ended with error");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%connection_id, error = %e, "Chat socket error");
                    break;
                }
            },
            _ = &mut writer => {
                info!(%connection_id, "Outbound queue closed; ending chat connection");
                writer_done = true;
                break;
            }
        }
    }

    session.close().await;
    if !writer_done {
        if let Err(e) = writer.await {
            debug!(%connection_id, error = %e, "Writer task ended abnormally");
        }
    }
}

/// =============================
/// Auth Endpoints
/// =============================

async fn auth_callback(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let identity = match state.identity.identify(&headers).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "Login callback without a verified identity");
            return error_response(StatusCode::UNAUTHORIZED, e.to_string());
        }
    };

    match complete_login(&state.accounts, &identity).await {
        Ok(user) => {
            let token = state.sessions.issue(user.id).await;
            (
                [(header::SET_COOKIE, session_cookie(&state.auth.cookie_name, &token))],
                Redirect::to(&state.auth.home_url),
            )
                .into_response()
        }
        Err(FintrackError::Validation(msg)) => error_response(StatusCode::BAD_REQUEST, msg),
        Err(e) => {
            warn!(error = %e, "Login failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string())
        }
    }
}

async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = cookie_value(&headers, &state.auth.cookie_name) {
        if state.sessions.revoke(&token).await {
            info!("Session revoked");
        }
    }

    let target = logout_url(&state.auth, &state.auth.home_url);
    (
        [(header::SET_COOKIE, clear_cookie(&state.auth.cookie_name))],
        Redirect::to(&target),
    )
        .into_response()
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/chat", get(ws_chat))
        .route("/auth/callback", get(auth_callback))
        .route("/auth/logout", get(auth_logout))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: AppState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Chat stream: ws://127.0.0.1:{}/ws/chat", port);

    axum::serve(listener, router).await?;

    Ok(())
}
