/**
 * LOT REGISTRY - Registre des parkings connus
 *
 * RÔLE : fiches parkings (nom, position, fermeture, joignabilité) et adresse du
 * contrôleur de chacun. Alimenté par la base des métadonnées à chaque cycle.
 *
 * RÈGLES :
 * - un rafraîchissement ne supprime jamais un parking absent de la base
 *   (une base partiellement indisponible ne doit pas effacer l'existant)
 * - en cas d'échec de la base, le registre reste inchangé
 * - la fermeture n'est commitée qu'après acquittement du contrôleur
 * - les commandes de fermeture d'un même parking sont sérialisées : le drapeau
 *   commité correspond toujours à la dernière commande acquittée
 */

use crate::device::{acknowledged, DeviceClient};
use crate::error::{KernelError, Result};
use crate::models::{GeoPosition, Lot};
use crate::store::LotStore;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{info, warn};

pub struct LotRegistry {
    lots: RwLock<BTreeMap<String, Lot>>,
    store: Arc<dyn LotStore>,
    device: Arc<dyn DeviceClient>,
    command_timeout: Duration,
    close_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LotRegistry {
    pub fn new(store: Arc<dyn LotStore>, device: Arc<dyn DeviceClient>, command_timeout: Duration) -> Self {
        Self {
            lots: RwLock::new(BTreeMap::new()),
            store,
            device,
            command_timeout,
            close_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Upsert de toutes les lignes de la base, retourne le nombre appliqué
    pub async fn refresh_from_store(&self) -> Result<usize> {
        let rows = self.store.fetch_lots().await?;

        // parsing hors verrou ; une ligne invalide n'empêche pas les autres
        let mut parsed = Vec::with_capacity(rows.len());
        for row in rows {
            match row.position.parse::<GeoPosition>() {
                Ok(position) => parsed.push((row, position)),
                Err(e) => warn!(lot_id = %row.id, "[registry] ligne ignorée: {e}"),
            }
        }

        let applied = parsed.len();
        let mut lots = self.lots.write();
        for (row, position) in parsed {
            match lots.get_mut(&row.id) {
                Some(lot) => {
                    lot.name = row.name;
                    lot.position = position;
                    lot.device_address = row.ip_address;
                    // la base a rattrapé la commande locale
                    if lot.closed_override == Some(row.closed) {
                        lot.closed_override = None;
                    }
                    lot.closed = lot.closed_override.unwrap_or(row.closed);
                }
                None => {
                    info!(lot_id = %row.id, "[registry] nouveau parking '{}'", row.name);
                    lots.insert(
                        row.id.clone(),
                        Lot {
                            id: row.id,
                            name: row.name,
                            position,
                            closed: row.closed,
                            reachable: false,
                            last_polled: None,
                            device_address: row.ip_address,
                            closed_override: None,
                        },
                    );
                }
            }
        }
        Ok(applied)
    }

    pub fn get(&self, lot_id: &str) -> Result<Lot> {
        self.lots
            .read()
            .get(lot_id)
            .cloned()
            .ok_or_else(|| KernelError::NotFound(format!("lot {lot_id}")))
    }

    pub fn list(&self) -> Vec<Lot> {
        self.lots.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lots.read().len()
    }

    /// Résultat d'un poll (ou d'un snapshot poussé par le contrôleur)
    pub fn mark_polled(&self, lot_id: &str, reachable: bool) {
        if let Some(lot) = self.lots.write().get_mut(lot_id) {
            lot.reachable = reachable;
            if reachable {
                lot.last_polled = Some(OffsetDateTime::now_utc());
            }
        }
    }

    /// Ferme/ouvre un parking : contrôleur d'abord, registre ensuite
    pub async fn set_closed(&self, lot_id: &str, closed: bool) -> Result<Lot> {
        self.get(lot_id)?;
        let close_lock = self.close_locks.lock().entry(lot_id.to_string()).or_default().clone();
        // tenu de l'envoi de la commande jusqu'au commit du drapeau
        let _serial = close_lock.lock_owned().await;
        let address = self.get(lot_id)?.device_address;

        acknowledged(
            lot_id,
            self.command_timeout,
            self.device.close(lot_id, &address, closed),
        )
        .await?;

        let mut lots = self.lots.write();
        let lot = lots
            .get_mut(lot_id)
            .ok_or_else(|| KernelError::NotFound(format!("lot {lot_id}")))?;
        lot.closed = closed;
        lot.closed_override = Some(closed);
        info!(lot_id, closed, "[registry] fermeture acquittée");
        Ok(lot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDevice, MemoryStore};

    fn registry(store: Arc<MemoryStore>, device: Arc<FakeDevice>) -> LotRegistry {
        LotRegistry::new(store, device, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_refresh_upserts_lots() {
        let store = Arc::new(MemoryStore::new());
        store.put_row("p1", "10.0.0.1", "Centro", false);
        let reg = registry(store.clone(), Arc::new(FakeDevice::new()));

        assert_eq!(reg.refresh_from_store().await.unwrap(), 1);
        let lot = reg.get("p1").unwrap();
        assert_eq!(lot.name, "Centro");
        assert!(!lot.reachable);

        store.put_row("p1", "10.0.0.9", "Centro Storico", false);
        reg.refresh_from_store().await.unwrap();
        let lot = reg.get("p1").unwrap();
        assert_eq!(lot.name, "Centro Storico");
        assert_eq!(lot.device_address, "10.0.0.9");
    }

    #[tokio::test]
    async fn test_refresh_never_removes_lots() {
        let store = Arc::new(MemoryStore::new());
        store.put_row("p1", "10.0.0.1", "Centro", false);
        store.put_row("p2", "10.0.0.2", "Nord", false);
        let reg = registry(store.clone(), Arc::new(FakeDevice::new()));
        reg.refresh_from_store().await.unwrap();

        store.remove_row("p2");
        reg.refresh_from_store().await.unwrap();
        assert!(reg.get("p2").is_ok());
        assert_eq!(reg.len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_previous_content() {
        let store = Arc::new(MemoryStore::new());
        store.put_row("p1", "10.0.0.1", "Centro", false);
        let reg = registry(store.clone(), Arc::new(FakeDevice::new()));
        reg.refresh_from_store().await.unwrap();

        store.set_available(false);
        store.put_row("p1", "10.0.0.1", "Renamed", true);
        let err = reg.refresh_from_store().await.unwrap_err();
        assert!(matches!(err, KernelError::StoreUnavailable(_)));
        assert_eq!(reg.get("p1").unwrap().name, "Centro");
    }

    #[tokio::test]
    async fn test_invalid_position_row_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        store.put_row("p1", "10.0.0.1", "Centro", false);
        store.put_raw_row("p2", "10.0.0.2", "Broken", "nowhere", false);
        let reg = registry(store, Arc::new(FakeDevice::new()));

        assert_eq!(reg.refresh_from_store().await.unwrap(), 1);
        assert!(matches!(reg.get("p2"), Err(KernelError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_closed_commits_after_ack() {
        let store = Arc::new(MemoryStore::new());
        store.put_row("p1", "10.0.0.1", "Centro", false);
        let device = Arc::new(FakeDevice::new());
        let reg = registry(store.clone(), device.clone());
        reg.refresh_from_store().await.unwrap();

        let lot = reg.set_closed("p1", true).await.unwrap();
        assert!(lot.closed);
        assert_eq!(device.close_commands(), vec![("10.0.0.1".to_string(), true)]);

        // la base n'est pas encore à jour : l'override tient
        reg.refresh_from_store().await.unwrap();
        assert!(reg.get("p1").unwrap().closed);

        // la base rattrape, puis rouvre : la base redevient maîtresse
        store.put_row("p1", "10.0.0.1", "Centro", true);
        reg.refresh_from_store().await.unwrap();
        store.put_row("p1", "10.0.0.1", "Centro", false);
        reg.refresh_from_store().await.unwrap();
        assert!(!reg.get("p1").unwrap().closed);
    }

    #[tokio::test]
    async fn test_set_closed_device_failure_leaves_flag() {
        let store = Arc::new(MemoryStore::new());
        store.put_row("p1", "10.0.0.1", "Centro", false);
        let device = Arc::new(FakeDevice::new());
        device.reject_commands("10.0.0.1", Some(500));
        let reg = registry(store, device);
        reg.refresh_from_store().await.unwrap();

        let err = reg.set_closed("p1", true).await.unwrap_err();
        assert!(matches!(err, KernelError::DeviceRejected { status: Some(500), .. }));
        assert!(!reg.get("p1").unwrap().closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_closed_serialized_per_lot() {
        let store = Arc::new(MemoryStore::new());
        store.put_row("p1", "10.0.0.1", "Centro", false);
        let device = Arc::new(FakeDevice::new());
        device.set_delay("10.0.0.1", Duration::from_millis(50));
        let reg = Arc::new(registry(store, device.clone()));
        reg.refresh_from_store().await.unwrap();

        let started = tokio::time::Instant::now();
        let first = tokio::spawn({
            let reg = reg.clone();
            async move { reg.set_closed("p1", true).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // la seconde commande attend l'acquittement et le commit de la première
        let lot = reg.set_closed("p1", false).await.unwrap();
        assert!(first.await.unwrap().unwrap().closed);
        assert!(!lot.closed);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(
            device.close_commands(),
            vec![("10.0.0.1".to_string(), true), ("10.0.0.1".to_string(), false)]
        );
        assert!(!reg.get("p1").unwrap().closed);
    }

    #[tokio::test]
    async fn test_set_closed_accepted_after_rejection_cleared() {
        let store = Arc::new(MemoryStore::new());
        store.put_row("p1", "10.0.0.1", "Centro", false);
        let device = Arc::new(FakeDevice::new());
        device.reject_commands("10.0.0.1", None);
        let reg = registry(store, device.clone());
        reg.refresh_from_store().await.unwrap();

        assert!(reg.set_closed("p1", true).await.is_err());
        device.accept_commands("10.0.0.1");
        assert!(reg.set_closed("p1", true).await.unwrap().closed);
        assert_eq!(device.close_commands(), vec![("10.0.0.1".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_set_closed_unknown_lot() {
        let reg = registry(Arc::new(MemoryStore::new()), Arc::new(FakeDevice::new()));
        assert!(matches!(reg.set_closed("nope", true).await, Err(KernelError::NotFound(_))));
    }
}
