use crate::rtdb_logic::config::ServerConfig;
use crate::rtdb_logic::rest;
use crate::rtdb_logic::state::AppState;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};

pub fn router(state: AppState, rest_enabled: bool) -> Router {
    let app = Router::new()
        .route("/", get(ws_handler))
        .route("/.ws", get(ws_handler))
        .route("/health", get(health_handler));

    let app = if rest_enabled {
        app.fallback(rest::rest_handler)
            .layer(DefaultBodyLimit::max(rest::MAX_BODY_BYTES))
    } else {
        app
    };
    app.with_state(state)
}

pub async fn run(config: ServerConfig, state: AppState) -> Result<()> {
    let mut shutdown = state.shutdown.subscribe();
    let app = router(state, config.rest_enabled());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    log::info!(
        "Listening on {} (REST adapter {})",
        addr,
        if config.rest_enabled() { "enabled" } else { "disabled" }
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("Listener shutting down.");
        })
        .await
        .context("Server error")?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let active = state.server.connections().active_sessions();
    (axum::http::StatusCode::OK, format!("OK {active}"))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let mut session = state.server.connections().accept(outbound_tx);
    let session_id = session.id();
    log::info!("Client {} connected", session_id);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break; // client disconnected
            }
        }
        let _ = sink.close().await;
    });

    let mut shutdown = state.shutdown.subscribe();
    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = session.receive(text.as_str()) {
                            log::warn!("Client {} dropped: {}", session_id, e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::debug!("Client {} socket error: {}", session_id, e);
                        break;
                    }
                }
            }
            result = shutdown.recv() => {
                if !matches!(result, Err(broadcast::error::RecvError::Lagged(_))) {
                    break;
                }
            }
        }
    }

    session.close().await;
    drop(session);
    writer.abort();
    log::info!("Client {} disconnected", session_id);
}
