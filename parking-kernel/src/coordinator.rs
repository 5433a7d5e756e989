/**
 * COORDINATOR - Façade des opérations publiques
 *
 * RÔLE : point d'entrée unique de la couche transport (HTTP, WebSocket).
 * Délègue au registre, au store réseau, à l'allocateur et au calcul de seuil,
 * puis notifie les abonnés après chaque mutation réussie d'un parking.
 */

use crate::booking::BookingAllocator;
use crate::device::DeviceClient;
use crate::error::{KernelError, Result};
use crate::hub::{Notification, NotificationHub};
use crate::models::{Lot, LotSummary, SensorMap};
use crate::network::NetworkStore;
use crate::registry::LotRegistry;
use crate::threshold::threshold;
use crate::weather::WeatherSource;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Fiche + snapshot d'un parking
#[derive(Debug, Clone, Serialize)]
pub struct LotDetail {
    pub info: Lot,
    pub network: Option<SensorMap>,
}

pub struct Coordinator {
    registry: Arc<LotRegistry>,
    network: Arc<NetworkStore>,
    allocator: BookingAllocator,
    weather: Arc<dyn WeatherSource>,
    weather_timeout: Duration,
    hub: NotificationHub,
}

impl Coordinator {
    pub fn new(
        registry: Arc<LotRegistry>,
        network: Arc<NetworkStore>,
        device: Arc<dyn DeviceClient>,
        weather: Arc<dyn WeatherSource>,
        hub: NotificationHub,
        command_timeout: Duration,
        weather_timeout: Duration,
    ) -> Self {
        let allocator = BookingAllocator::new(registry.clone(), network.clone(), device, command_timeout);
        Self {
            registry,
            network,
            allocator,
            weather,
            weather_timeout,
            hub,
        }
    }

    pub fn registry(&self) -> &LotRegistry {
        &self.registry
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn lots(&self) -> Vec<Lot> {
        self.registry.list()
    }

    pub fn lot_detail(&self, lot_id: &str) -> Result<LotDetail> {
        let info = self.registry.get(lot_id)?;
        let network = self.network.get(lot_id).ok();
        Ok(LotDetail { info, network })
    }

    /// Snapshot poussé par un contrôleur, alternative au poll
    pub async fn ingest_snapshot(&self, lot_id: &str, entries: SensorMap) -> Result<()> {
        self.registry.get(lot_id)?;
        debug!(lot_id, sensors = entries.len(), "[kernel] snapshot reçu");
        self.network.replace_lot(lot_id, entries).await;
        self.registry.mark_polled(lot_id, true);
        self.notify_lot(lot_id);
        Ok(())
    }

    pub async fn book(&self, lot_id: &str, holder: &str) -> Result<String> {
        let mac = self.allocator.book(lot_id, holder).await?;
        self.notify_lot(lot_id);
        Ok(mac)
    }

    pub async fn unbook(&self, lot_id: &str, holder: &str) -> Result<String> {
        let mac = self.allocator.unbook(lot_id, holder).await?;
        self.notify_lot(lot_id);
        Ok(mac)
    }

    pub fn list_bookings_for(&self, holder: &str) -> Vec<String> {
        self.allocator.list_bookings_for(holder)
    }

    /// Parkings ouverts, joignables et déjà pollés, avec leurs places libres
    pub fn list_lots_summary(&self) -> BTreeMap<String, LotSummary> {
        let mut networks: HashMap<String, SensorMap> =
            self.network.snapshot_all().into_iter().collect();

        self.registry
            .list()
            .into_iter()
            .filter(|lot| !lot.closed && lot.reachable && lot.last_polled.is_some())
            .filter_map(|lot| {
                let entries = networks.remove(&lot.id)?;
                let free_parkings = entries.values().filter(|e| e.is_eligible()).count();
                Some((
                    lot.id.clone(),
                    LotSummary {
                        id: lot.id,
                        name: lot.name,
                        free_parkings,
                    },
                ))
            })
            .collect()
    }

    /// Seuil conseillé pour le parking selon le soleil et les nuages à sa position
    pub async fn compute_threshold(&self, lot_id: &str, min_t: i64, max_t: i64) -> Result<i64> {
        let position = self.registry.get(lot_id)?.position;
        debug!(lot_id, %position, "[kernel] relevé météo");

        let observation = tokio::time::timeout(self.weather_timeout, self.weather.observe(position))
            .await
            .map_err(|_| {
                KernelError::WeatherUnavailable(format!(
                    "no answer within {}ms",
                    self.weather_timeout.as_millis()
                ))
            })??;

        let value = threshold(min_t, max_t, observation.sun_fraction()?, observation.cloud_fraction);
        debug!(lot_id, min_t, max_t, value, "[kernel] seuil calculé");
        Ok(value)
    }

    pub async fn set_closed(&self, lot_id: &str, closed: bool) -> Result<Lot> {
        let lot = self.registry.set_closed(lot_id, closed).await?;
        info!(lot_id, closed, "[kernel] parking {}", if closed { "fermé" } else { "ouvert" });
        self.hub.publish(Notification::LotInfo(lot.clone()));
        Ok(lot)
    }

    /// Publie snapshot + fiche d'un parking
    pub fn notify_lot(&self, lot_id: &str) {
        if let Ok(network) = self.network.get(lot_id) {
            self.hub.publish(Notification::LotNetwork {
                lot_id: lot_id.to_string(),
                network,
            });
        }
        if let Ok(lot) = self.registry.get(lot_id) {
            self.hub.publish(Notification::LotInfo(lot));
        }
    }
}
