/*!
Mock du contrôleur de parking pour développement sans matériel

Sert le protocole du contrôleur sur 127.0.0.1 (port éphémère) :
- `GET /`      → snapshot JSON des capteurs
- `POST /book` → `{mac, book}` (book = utilisateur ou "false" pour libérer)
- `POST /close`→ `{close: bool}`

Enregistre toutes les commandes reçues et permet de simuler pannes,
lenteurs et réponses corrompues.
*/

use crate::fixtures::MockSensor;
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Commande reçue par le contrôleur simulé
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCommand {
    Book { mac: String, book: String },
    Close { close: bool },
}

#[derive(Debug, Default)]
struct DeviceState {
    sensors: BTreeMap<String, MockSensor>,
    commands: Vec<MockCommand>,
    closed: bool,
    /// Si défini, toutes les routes répondent avec ce status
    failing: Option<u16>,
    delay: Duration,
    malformed: bool,
}

type SharedDevice = Arc<Mutex<DeviceState>>;

#[derive(Debug, Deserialize)]
struct BookBody {
    mac: String,
    book: String,
}

#[derive(Debug, Deserialize)]
struct CloseBody {
    close: bool,
}

/// Contrôleur de parking simulé, arrêté automatiquement au drop
pub struct MockDevice {
    addr: SocketAddr,
    state: SharedDevice,
    handle: JoinHandle<()>,
}

impl MockDevice {
    /// Démarre le contrôleur simulé avec les capteurs donnés
    pub async fn start(sensors: BTreeMap<String, MockSensor>) -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        let state: SharedDevice = Arc::new(Mutex::new(DeviceState {
            sensors,
            ..DeviceState::default()
        }));

        let app = Router::new()
            .route("/", get(snapshot))
            .route("/book", post(book))
            .route("/close", post(close))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("[MOCK] device server stopped: {}", e);
            }
        });

        log::info!("[MOCK] device listening on {}", addr);
        Ok(Self { addr, state, handle })
    }

    /// Adresse à enregistrer comme `ipAddress` du parking
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn sensor(&self, mac: &str) -> Option<MockSensor> {
        self.state.lock().unwrap().sensors.get(mac).cloned()
    }

    pub fn set_sensor(&self, mac: &str, sensor: MockSensor) {
        self.state.lock().unwrap().sensors.insert(mac.to_string(), sensor);
    }

    /// Toutes les commandes reçues, dans l'ordre d'arrivée
    pub fn commands(&self) -> Vec<MockCommand> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Simule un contrôleur en erreur (None = fonctionnement normal)
    pub fn set_failing(&self, status: Option<u16>) {
        self.state.lock().unwrap().failing = status;
    }

    /// Ajoute une latence avant chaque réponse
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    /// Répond au snapshot avec un corps qui n'est pas du JSON
    pub fn set_malformed(&self, malformed: bool) {
        self.state.lock().unwrap().malformed = malformed;
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Applique latence et panne simulée, retourne la réponse d'erreur éventuelle
async fn simulate_conditions(state: &SharedDevice) -> Option<Response> {
    let (delay, failing) = {
        let st = state.lock().unwrap();
        (st.delay, st.failing)
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    failing.map(|code| {
        StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response()
    })
}

async fn snapshot(State(state): State<SharedDevice>) -> Response {
    if let Some(resp) = simulate_conditions(&state).await {
        return resp;
    }
    let st = state.lock().unwrap();
    if st.malformed {
        return (StatusCode::OK, "<html>not a snapshot</html>").into_response();
    }
    Json(st.sensors.clone()).into_response()
}

async fn book(State(state): State<SharedDevice>, Json(body): Json<BookBody>) -> Response {
    if let Some(resp) = simulate_conditions(&state).await {
        return resp;
    }
    let mut st = state.lock().unwrap();
    st.commands.push(MockCommand::Book {
        mac: body.mac.clone(),
        book: body.book.clone(),
    });
    match st.sensors.get_mut(&body.mac) {
        Some(sensor) => {
            log::info!("[MOCK] book {} -> {}", body.mac, body.book);
            sensor.booked = body.book;
            (StatusCode::OK, "OK").into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn close(State(state): State<SharedDevice>, Json(body): Json<CloseBody>) -> Response {
    if let Some(resp) = simulate_conditions(&state).await {
        return resp;
    }
    let mut st = state.lock().unwrap();
    st.commands.push(MockCommand::Close { close: body.close });
    st.closed = body.close;
    (StatusCode::OK, "OK").into_response()
}
