/**
 * API HTTP + WEBSOCKET - Transport des opérations du coordinateur
 *
 * ROUTES :
 * - GET  /                        : parkings ouverts et en ligne + places libres
 * - GET  /lots                    : registre complet
 * - GET  /parking/{id}            : fiche + snapshot capteurs
 * - POST /parking/{id}            : snapshot poussé par le contrôleur
 * - POST /parking/{id}/book       : {book: holder} → {mac}
 * - POST /parking/{id}/unbook     : {book: holder} → {mac}
 * - GET  /bookings/{holder}       : parkings où holder a une place
 * - POST /parking/{id}/threshold  : {min_threshold, max_threshold} → entier
 * - POST /parking/{id}/close      : {close: bool}
 * - GET  /health, /system/health
 * - GET  /ws                      : flux des notifications + commandes client
 *
 * Les erreurs métier sortent en JSON {error_code, message} avec le status
 * HTTP correspondant (voir `KernelError`).
 */

use crate::coordinator::{Coordinator, LotDetail};
use crate::error::{KernelError, Result};
use crate::health::{HealthTracker, KernelHealth};
use crate::hub::Notification;
use crate::models::{Lot, LotSummary, SensorMap};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub kernel: Arc<Coordinator>,
    pub health: HealthTracker,
}

#[derive(Debug, Deserialize)]
struct BookRequest {
    book: String,
}

#[derive(Debug, Deserialize)]
struct ThresholdRequest {
    min_threshold: i64,
    max_threshold: i64,
}

#[derive(Debug, Deserialize)]
struct CloseRequest {
    close: bool,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(get_summary))
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/lots", get(get_lots))
        .route("/parking/{id}", get(get_lot).post(ingest_snapshot))
        .route("/parking/{id}/book", post(book))
        .route("/parking/{id}/unbook", post(unbook))
        .route("/parking/{id}/threshold", post(compute_threshold))
        .route("/parking/{id}/close", post(set_closed))
        .route("/bookings/{holder}", get(get_bookings))
        .route("/ws", get(ws_upgrade))
        .with_state(app_state)
}

// GET /
async fn get_summary(State(app): State<AppState>) -> Json<BTreeMap<String, LotSummary>> {
    Json(app.kernel.list_lots_summary())
}

async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health.get_health(app.kernel.registry(), app.kernel.hub()))
}

async fn get_lots(State(app): State<AppState>) -> Json<Vec<Lot>> {
    Json(app.kernel.lots())
}

// GET /parking/{id}
async fn get_lot(State(app): State<AppState>, Path(id): Path<String>) -> Result<Json<LotDetail>> {
    Ok(Json(app.kernel.lot_detail(&id)?))
}

// POST /parking/{id} (push contrôleur)
async fn ingest_snapshot(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(entries): Json<SensorMap>,
) -> Result<Json<Value>> {
    app.kernel.ingest_snapshot(&id, entries).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn book(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<BookRequest>,
) -> Result<Json<Value>> {
    let mac = app.kernel.book(&id, &req.book).await?;
    Ok(Json(json!({ "mac": mac })))
}

async fn unbook(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<BookRequest>,
) -> Result<Json<Value>> {
    let mac = app.kernel.unbook(&id, &req.book).await?;
    Ok(Json(json!({ "mac": mac })))
}

async fn get_bookings(State(app): State<AppState>, Path(holder): Path<String>) -> Json<Value> {
    let bookings = app.kernel.list_bookings_for(&holder);
    Json(json!({ "bookings": bookings }))
}

async fn compute_threshold(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ThresholdRequest>,
) -> Result<Json<i64>> {
    let value = app
        .kernel
        .compute_threshold(&id, req.min_threshold, req.max_threshold)
        .await?;
    Ok(Json(value))
}

async fn set_closed(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CloseRequest>,
) -> Result<Json<Lot>> {
    Ok(Json(app.kernel.set_closed(&id, req.close).await?))
}

// ---- WebSocket ----

/// Messages envoyés par les clients (tableau de bord, bot)
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientMessage {
    /// target = "home" pour le résumé, sinon un id de parking
    GetData { target: String },
    Close { target: String },
    Open { target: String },
}

/// Réponses directes à un client, hors diffusion
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum Reply {
    Summary(BTreeMap<String, LotSummary>),
    Error { error_code: &'static str, message: String },
}

impl From<KernelError> for Reply {
    fn from(e: KernelError) -> Self {
        Reply::Error {
            error_code: e.error_code(),
            message: e.to_string(),
        }
    }
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| ws_session(socket, app))
}

async fn ws_session(mut socket: WebSocket, app: AppState) {
    let mut rx = app.kernel.hub().subscribe();
    info!("[http] client WebSocket connecté ({} abonnés)", app.kernel.hub().subscribers());

    loop {
        tokio::select! {
            notification = rx.recv() => {
                match notification {
                    Ok(n) => {
                        let Ok(txt) = serde_json::to_string(&n) else { continue };
                        if socket.send(Message::Text(txt.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("[http] client WebSocket en retard, {skipped} notifications perdues");
                    }
                    Err(RecvError::Closed) => break,
                }
            },
            incoming = socket.recv() => {
                let txt = match incoming {
                    Some(Ok(Message::Text(txt))) => txt,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };
                let frames = match serde_json::from_str::<ClientMessage>(txt.as_str()) {
                    Ok(msg) => handle_client_message(&app.kernel, msg).await,
                    Err(e) => {
                        debug!("[http] message WebSocket ignoré: {e}");
                        continue;
                    }
                };
                for frame in frames {
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
    info!("[http] client WebSocket déconnecté");
}

/// Trames JSON à renvoyer au seul client émetteur
pub async fn handle_client_message(kernel: &Coordinator, msg: ClientMessage) -> Vec<String> {
    let mut frames = Vec::new();
    let mut push = |frame: std::result::Result<String, serde_json::Error>| match frame {
        Ok(txt) => frames.push(txt),
        Err(e) => warn!("[http] sérialisation impossible: {e}"),
    };

    match msg {
        ClientMessage::GetData { target } if target == "home" => {
            push(serde_json::to_string(&Reply::Summary(kernel.list_lots_summary())));
        }
        ClientMessage::GetData { target } => match kernel.lot_detail(&target) {
            Ok(detail) => {
                if let Some(network) = detail.network {
                    push(serde_json::to_string(&Notification::LotNetwork { lot_id: target, network }));
                }
                push(serde_json::to_string(&Notification::LotInfo(detail.info)));
            }
            Err(e) => push(serde_json::to_string(&Reply::from(e))),
        },
        // succès diffusé à tous via le hub
        ClientMessage::Close { target } => {
            if let Err(e) = kernel.set_closed(&target, true).await {
                push(serde_json::to_string(&Reply::from(e)));
            }
        }
        ClientMessage::Open { target } => {
            if let Err(e) = kernel.set_closed(&target, false).await {
                push(serde_json::to_string(&Reply::from(e)));
            }
        }
    }
    frames
}
