//! Doublures en mémoire des collaborateurs (base, contrôleurs, météo) pour les tests.

use crate::device::DeviceClient;
use crate::error::{KernelError, Result};
use crate::models::{GeoPosition, Occupancy, SensorEntry, SensorMap};
use crate::store::{LotRow, LotStore};
use crate::weather::{WeatherObservation, WeatherSource};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub fn sensor(status: Occupancy, booked: Option<&str>, online: bool) -> SensorEntry {
    SensorEntry {
        status,
        booked: booked.map(str::to_string),
        online,
    }
}

/// Snapshot à partir de (mac, entrée)
pub fn sensors(entries: &[(&str, SensorEntry)]) -> SensorMap {
    entries
        .iter()
        .map(|(mac, e)| (mac.to_string(), e.clone()))
        .collect()
}

pub fn free() -> SensorEntry {
    sensor(Occupancy::Free, None, true)
}

/// Table des parkings en mémoire
pub struct MemoryStore {
    rows: Mutex<BTreeMap<String, LotRow>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn put_row(&self, id: &str, ip: &str, name: &str, closed: bool) {
        self.put_raw_row(id, ip, name, "45.0703, 7.6869", closed);
    }

    pub fn put_raw_row(&self, id: &str, ip: &str, name: &str, position: &str, closed: bool) {
        self.rows.lock().insert(
            id.to_string(),
            LotRow {
                id: id.to_string(),
                ip_address: ip.to_string(),
                name: name.to_string(),
                position: position.to_string(),
                closed,
            },
        );
    }

    pub fn remove_row(&self, id: &str) {
        self.rows.lock().remove(id);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl LotStore for MemoryStore {
    async fn fetch_lots(&self) -> Result<Vec<LotRow>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(KernelError::StoreUnavailable("memory store offline".into()));
        }
        Ok(self.rows.lock().values().cloned().collect())
    }
}

/// Contrôleurs simulés, indexés par adresse
#[derive(Default)]
pub struct FakeDevice {
    snapshots: Mutex<HashMap<String, SensorMap>>,
    unreachable: Mutex<HashSet<String>>,
    rejections: Mutex<HashMap<String, Option<u16>>>,
    delays: Mutex<HashMap<String, Duration>>,
    book_commands: Mutex<Vec<(String, String, Option<String>)>>,
    close_commands: Mutex<Vec<(String, bool)>>,
    polls: AtomicUsize,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_snapshot(&self, address: &str, entries: SensorMap) {
        self.snapshots.lock().insert(address.to_string(), entries);
    }

    pub fn set_unreachable(&self, address: &str, unreachable: bool) {
        let mut set = self.unreachable.lock();
        if unreachable {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    /// Les commandes vers `address` sont refusées (None = refus sans status)
    pub fn reject_commands(&self, address: &str, status: Option<u16>) {
        self.rejections.lock().insert(address.to_string(), status);
    }

    pub fn accept_commands(&self, address: &str) {
        self.rejections.lock().remove(address);
    }

    pub fn set_delay(&self, address: &str, delay: Duration) {
        self.delays.lock().insert(address.to_string(), delay);
    }

    pub fn book_commands(&self) -> Vec<(String, String, Option<String>)> {
        self.book_commands.lock().clone()
    }

    pub fn close_commands(&self) -> Vec<(String, bool)> {
        self.close_commands.lock().clone()
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    async fn simulate(&self, lot_id: &str, address: &str, command: bool) -> Result<()> {
        let delay = self.delays.lock().get(address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.lock().contains(address) {
            return Err(KernelError::DeviceUnreachable {
                lot_id: lot_id.to_string(),
                reason: "connection refused".into(),
            });
        }
        if command {
            if let Some(status) = self.rejections.lock().get(address).copied() {
                return Err(KernelError::DeviceRejected {
                    lot_id: lot_id.to_string(),
                    status,
                    reason: "refused".into(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceClient for FakeDevice {
    async fn snapshot(&self, lot_id: &str, address: &str) -> Result<SensorMap> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.simulate(lot_id, address, false).await?;
        self.snapshots
            .lock()
            .get(address)
            .cloned()
            .ok_or_else(|| KernelError::DeviceUnreachable {
                lot_id: lot_id.to_string(),
                reason: "no snapshot".into(),
            })
    }

    async fn book(&self, lot_id: &str, address: &str, mac: &str, holder: Option<&str>) -> Result<()> {
        self.simulate(lot_id, address, true).await?;
        self.book_commands
            .lock()
            .push((address.to_string(), mac.to_string(), holder.map(str::to_string)));
        // le contrôleur reflète la commande dans ses prochains snapshots
        if let Some(entry) = self
            .snapshots
            .lock()
            .get_mut(address)
            .and_then(|snap| snap.get_mut(mac))
        {
            entry.booked = holder.map(str::to_string);
        }
        Ok(())
    }

    async fn close(&self, lot_id: &str, address: &str, closed: bool) -> Result<()> {
        self.simulate(lot_id, address, true).await?;
        self.close_commands.lock().push((address.to_string(), closed));
        Ok(())
    }
}

/// Météo figée (None = service indisponible)
pub struct FixedWeather {
    observation: Mutex<Option<WeatherObservation>>,
}

impl FixedWeather {
    pub fn new(observation: Option<WeatherObservation>) -> Self {
        Self { observation: Mutex::new(observation) }
    }

    /// Midi solaire, couverture nuageuse donnée
    pub fn noon(cloud_fraction: f64) -> Self {
        Self::new(Some(WeatherObservation {
            sunrise: 1_000,
            sunset: 3_000,
            current: 2_000,
            cloud_fraction,
        }))
    }
}

#[async_trait]
impl WeatherSource for FixedWeather {
    async fn observe(&self, _position: GeoPosition) -> Result<WeatherObservation> {
        (*self.observation.lock())
            .ok_or_else(|| KernelError::WeatherUnavailable("weather service offline".into()))
    }
}
