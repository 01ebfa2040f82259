//! inkroom Relay Server
//!
//! Serves board snapshots and the project list over HTTP, and relays live
//! board events between the peers connected to the same board.
//!
//! ## Endpoints
//!
//! - `GET /api/projects/` (bearer token): `[{ "slug": ..., "name": ... }]`
//! - `POST /api/projects/` (bearer token): register a board
//! - `GET /api/board/{slug}/state/` (bearer token): `{ "events": [...], "notes": [...] }`
//! - `GET /ws/board/{slug}/?token=...`: WebSocket relay. Every valid message
//!   is forwarded to the other peers on the board, never back to its sender.

mod state;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use inkroom_core::{BoardSnapshot, Project};
use serde::Deserialize;
use state::AppState;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::broadcast::error::RecvError;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

const ADDR_ENV: &str = "INKROOM_ADDR";
const TOKENS_ENV: &str = "INKROOM_TOKENS";
const BOARDS_ENV: &str = "INKROOM_BOARDS";
const DEFAULT_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_BOARDS: &str = "welcome=Welcome";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkroom_server=info,tower_http=info".into()),
        )
        .init();

    let tokens = std::env::var(TOKENS_ENV).unwrap_or_default();
    let state = Arc::new(AppState::new(split_list(&tokens).map(str::to_string)));
    if tokens.is_empty() {
        warn!("{} not set; accepting any non-empty token", TOKENS_ENV);
    }

    let boards = std::env::var(BOARDS_ENV).unwrap_or_else(|_| DEFAULT_BOARDS.to_string());
    for (slug, name) in parse_boards(&boards) {
        state.create_board(slug, name);
        info!("Board {} ({})", slug, name);
    }

    let addr: SocketAddr = std::env::var(ADDR_ENV)
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/projects/", get(list_projects).post(create_project))
        .route("/api/board/{slug}/state/", get(board_state))
        .route("/ws/board/{slug}/", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("inkroom relay listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Comma-separated, trimmed, non-empty entries.
fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Parse `slug=Name,slug2=Name2`. A bare slug is its own name.
fn parse_boards(list: &str) -> Vec<(&str, &str)> {
    split_list(list)
        .map(|entry| match entry.split_once('=') {
            Some((slug, name)) => (slug.trim(), name.trim()),
            None => (entry, entry),
        })
        .filter(|(slug, _)| !slug.is_empty())
        .collect()
}

fn bearer_token(headers: &HeaderMap) -> &str {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or("")
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

async fn list_projects(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Project>>, StatusCode> {
    if !state.authorize(bearer_token(&headers)) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(state.projects()))
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(project): Json<Project>,
) -> StatusCode {
    if !state.authorize(bearer_token(&headers)) {
        return StatusCode::UNAUTHORIZED;
    }
    if project.slug.is_empty() || project.slug.contains('/') {
        return StatusCode::BAD_REQUEST;
    }
    if state.create_board(&project.slug, &project.name) {
        info!("Created board {}", project.slug);
        StatusCode::CREATED
    } else {
        StatusCode::CONFLICT
    }
}

async fn board_state(
    Path(slug): Path<String>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<BoardSnapshot>, StatusCode> {
    if !state.authorize(bearer_token(&headers)) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    state.snapshot(&slug).map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    #[serde(default)]
    token: String,
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(slug): Path<String>,
    Query(query): Query<TokenQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if !state.authorize(&query.token) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if !state.has_board(&slug) {
        return StatusCode::NOT_FOUND.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, slug))
}

/// Relay one peer's connection until either side closes
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, slug: String) {
    let peer_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (mut room_rx, peer_count) = state.join_room(&slug, &peer_id);
    info!("Peer {} joined {} ({} connected)", peer_id, slug, peer_count);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        state.relay(&slug, &peer_id, text.as_str());
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!("Ignoring binary message from {}", peer_id);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                }
            }

            relayed = room_rx.recv() => {
                match relayed {
                    // Don't echo back to sender
                    Ok((from, _)) if from == peer_id => {}
                    Ok((_, json)) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Peer {} missed {} messages on {}", peer_id, skipped, slug);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    state.leave_room(&slug, &peer_id);
    info!("Peer {} left {}", peer_id, slug);
}
