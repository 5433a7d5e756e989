use crate::hub::NotificationHub;
use crate::registry::LotRegistry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub lots_tracked: u32,
    pub lots_online: u32,
    pub cycles_completed: u64,
    pub last_cycle_at: Option<String>,
    pub store_available: bool,
    pub subscribers: u32,
    pub mqtt_status: String,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    cycles: Arc<AtomicU64>,
    last_cycle: Arc<Mutex<Option<OffsetDateTime>>>,
    store_available: Arc<AtomicBool>,
    mqtt_status: Arc<Mutex<String>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            cycles: Arc::new(AtomicU64::new(0)),
            last_cycle: Arc::new(Mutex::new(None)),
            store_available: Arc::new(AtomicBool::new(true)),
            mqtt_status: Arc::new(Mutex::new("disabled".to_string())),
        }
    }

    /// Fin d'un cycle de synchro complet (métadonnées + polls)
    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        *self.last_cycle.lock() = Some(OffsetDateTime::now_utc());
    }

    pub fn set_store_available(&self, available: bool) {
        self.store_available.store(available, Ordering::Relaxed);
    }

    pub fn set_mqtt_status(&self, status: &str) {
        *self.mqtt_status.lock() = status.to_string();
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn get_health(&self, registry: &LotRegistry, hub: &NotificationHub) -> KernelHealth {
        let lots = registry.list();
        let last_cycle = *self.last_cycle.lock();
        let last_cycle_at = last_cycle.and_then(|t| t.format(&Rfc3339).ok());

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            lots_tracked: lots.len() as u32,
            lots_online: lots.iter().filter(|l| l.reachable).count() as u32,
            cycles_completed: self.cycles_completed(),
            last_cycle_at,
            store_available: self.store_available.load(Ordering::Relaxed),
            subscribers: hub.subscribers() as u32,
            mqtt_status: self.mqtt_status.lock().clone(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
