/**
 * PARKING KERNEL - Point d'entrée du coordinateur de parkings
 *
 * RÔLE : orchestration de tous les modules : config, registre, synchro
 * périodique des contrôleurs, réservations, seuils météo, notifications
 * (WebSocket + MQTT) et API HTTP.
 *
 * ARCHITECTURE : un état partagé par parking (verrou dédié), une tâche de
 * synchro indépendante, un hub de diffusion vers les clients temps réel.
 */

mod booking;
mod config;
mod coordinator;
mod device;
mod error;
mod health;
mod http;
mod hub;
mod models;
mod mqtt;
mod network;
mod registry;
mod store;
mod sync;
mod threshold;
mod weather;

#[cfg(test)]
mod testing;

use crate::config::load_config;
use crate::coordinator::Coordinator;
use crate::device::HttpDeviceClient;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::hub::NotificationHub;
use crate::network::NetworkStore;
use crate::registry::LotRegistry;
use crate::store::YamlLotStore;
use crate::sync::Synchronizer;
use crate::weather::OpenWeatherMap;

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;

    // collaborateurs externes
    let store = Arc::new(YamlLotStore::new(&cfg.store.path));
    let device = Arc::new(HttpDeviceClient::new(
        cfg.sync.poll_timeout(),
        cfg.device.command_timeout(),
    ));
    let weather = Arc::new(OpenWeatherMap::new(
        cfg.weather.base_url.clone(),
        cfg.weather.token.clone(),
        cfg.weather.timeout(),
    ));

    // état partagé
    let registry = Arc::new(LotRegistry::new(store, device.clone(), cfg.device.command_timeout()));
    let network = Arc::new(NetworkStore::new());
    let hub = NotificationHub::new(cfg.notifications.capacity);
    let health_tracker = HealthTracker::new();

    let kernel = Arc::new(Coordinator::new(
        registry.clone(),
        network.clone(),
        device.clone(),
        weather,
        hub.clone(),
        cfg.device.command_timeout(),
        cfg.weather.timeout(),
    ));

    // démarre la synchro périodique (premier cycle immédiat)
    let synchronizer = Arc::new(Synchronizer::new(
        registry,
        network,
        device,
        hub.clone(),
        health_tracker.clone(),
        cfg.sync.poll_timeout(),
    ));
    synchronizer.spawn(cfg.sync.interval());

    // bridge MQTT optionnel
    match cfg.mqtt.clone() {
        Some(mqtt_cfg) => {
            mqtt::spawn_mqtt_bridge(mqtt_cfg, &hub, health_tracker.clone());
        }
        None => info!("[kernel] pas de section mqtt, bridge désactivé"),
    }

    // HTTP
    let app = http::build_router(AppState {
        kernel,
        health: health_tracker,
    });

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("bind {}", cfg.http.bind))?;
    info!("[kernel] listening on http://{}", cfg.http.bind);
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
