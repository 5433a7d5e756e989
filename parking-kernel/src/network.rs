/**
 * NETWORK STATE STORE - État des capteurs par parking
 *
 * RÔLE : pour chaque parking, la map adresse capteur → {occupation, réservation,
 * joignabilité}. Absence de map = parking jamais interrogé avec succès.
 *
 * CONCURRENCE :
 * - un verrou asynchrone par parking ; deux parkings n'interfèrent jamais
 * - le synchroniseur remplace la map entière sous ce verrou
 * - l'allocateur garde ce verrou du scan jusqu'au commit (via `lock`)
 * - chaque mutation incrémente `revision`, ce qui permet au synchroniseur
 *   d'écarter un poll devenu obsolète pendant son vol
 * - chaque mutation publie aussi une copie en lecture (`LotView`) : les
 *   lectures ne prennent jamais le verrou asynchrone et n'attendent donc pas
 *   un contrôleur lent
 */

use crate::error::{KernelError, Result};
use crate::models::SensorMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Dernier état commité d'un parking, lisible sans attendre le verrou
#[derive(Debug, Default, Clone)]
struct LotView {
    entries: Option<SensorMap>,
    revision: u64,
}

/// Contenu d'un parking, accessible uniquement sous son verrou
#[derive(Debug, Default)]
pub struct LotNetwork {
    entries: Option<SensorMap>,
    revision: u64,
    view: Arc<RwLock<LotView>>,
}

impl LotNetwork {
    pub fn entries(&self) -> Option<&SensorMap> {
        self.entries.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Remplacement atomique du snapshot, l'ancien est jeté
    pub fn replace(&mut self, entries: SensorMap) {
        self.entries = Some(entries);
        self.commit();
    }

    pub fn set_booking(&mut self, lot_id: &str, mac: &str, holder: &str) -> Result<()> {
        let entry = self.entry_mut(lot_id, mac)?;
        entry.booked = Some(holder.to_string());
        self.commit();
        Ok(())
    }

    pub fn clear_booking(&mut self, lot_id: &str, mac: &str) -> Result<()> {
        let entry = self.entry_mut(lot_id, mac)?;
        entry.booked = None;
        self.commit();
        Ok(())
    }

    fn commit(&mut self) {
        self.revision += 1;
        *self.view.write() = LotView {
            entries: self.entries.clone(),
            revision: self.revision,
        };
    }

    fn entry_mut(&mut self, lot_id: &str, mac: &str) -> Result<&mut crate::models::SensorEntry> {
        self.entries
            .as_mut()
            .and_then(|entries| entries.get_mut(mac))
            .ok_or_else(|| KernelError::EntryNotFound {
                lot_id: lot_id.to_string(),
                mac: mac.to_string(),
            })
    }
}

pub type LotGuard = OwnedMutexGuard<LotNetwork>;

#[derive(Clone)]
struct LotSlot {
    network: Arc<Mutex<LotNetwork>>,
    view: Arc<RwLock<LotView>>,
}

impl Default for LotSlot {
    fn default() -> Self {
        let network = LotNetwork::default();
        let view = network.view.clone();
        Self {
            network: Arc::new(Mutex::new(network)),
            view,
        }
    }
}

#[derive(Default)]
pub struct NetworkStore {
    lots: RwLock<HashMap<String, LotSlot>>,
}

impl NetworkStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, lot_id: &str) -> LotSlot {
        if let Some(slot) = self.lots.read().get(lot_id) {
            return slot.clone();
        }
        self.lots
            .write()
            .entry(lot_id.to_string())
            .or_default()
            .clone()
    }

    fn view(&self, lot_id: &str) -> LotView {
        self.lots
            .read()
            .get(lot_id)
            .map(|slot| slot.view.read().clone())
            .unwrap_or_default()
    }

    /// Verrou exclusif du parking, à garder pour toute section critique
    pub async fn lock(&self, lot_id: &str) -> LotGuard {
        self.slot(lot_id).network.lock_owned().await
    }

    pub async fn replace_lot(&self, lot_id: &str, entries: SensorMap) {
        self.lock(lot_id).await.replace(entries);
    }

    /// Remplace seulement si aucune mutation n'a eu lieu depuis `revision`.
    /// Verrou occupé = mutation en cours, le snapshot est donc déjà obsolète.
    pub fn replace_if_unchanged(&self, lot_id: &str, revision: u64, entries: SensorMap) -> bool {
        let Ok(mut guard) = self.slot(lot_id).network.try_lock_owned() else {
            return false;
        };
        if guard.revision() != revision {
            return false;
        }
        guard.replace(entries);
        true
    }

    /// Révision commitée, 0 pour un parking inconnu
    pub fn revision(&self, lot_id: &str) -> u64 {
        self.view(lot_id).revision
    }

    pub fn get(&self, lot_id: &str) -> Result<SensorMap> {
        self.view(lot_id)
            .entries
            .ok_or_else(|| KernelError::NotFound(format!("lot {lot_id} never polled")))
    }

    /// Copie de tous les snapshots connus, sans attendre les sections critiques
    pub fn snapshot_all(&self) -> Vec<(String, SensorMap)> {
        self.lots
            .read()
            .iter()
            .filter_map(|(id, slot)| {
                let entries = slot.view.read().entries.clone()?;
                Some((id.clone(), entries))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Occupancy, SensorEntry};

    fn entry(status: Occupancy) -> SensorEntry {
        SensorEntry { status, booked: None, online: true }
    }

    fn sample() -> SensorMap {
        let mut map = SensorMap::new();
        map.insert("aa:01".into(), entry(Occupancy::Free));
        map.insert("aa:02".into(), entry(Occupancy::Occupied));
        map
    }

    #[tokio::test]
    async fn test_never_polled_is_not_found() {
        let store = NetworkStore::new();
        assert!(matches!(store.get("p1"), Err(KernelError::NotFound(_))));
        assert_eq!(store.revision("p1"), 0);
    }

    #[tokio::test]
    async fn test_replace_discards_previous_snapshot() {
        let store = NetworkStore::new();
        store.replace_lot("p1", sample()).await;

        let mut next = SensorMap::new();
        next.insert("bb:01".into(), entry(Occupancy::Free));
        store.replace_lot("p1", next).await;

        let got = store.get("p1").unwrap();
        assert_eq!(got.keys().collect::<Vec<_>>(), vec!["bb:01"]);
    }

    #[tokio::test]
    async fn test_set_and_clear_booking() {
        let store = NetworkStore::new();
        store.replace_lot("p1", sample()).await;

        store.lock("p1").await.set_booking("p1", "aa:01", "alice").unwrap();
        assert_eq!(store.get("p1").unwrap()["aa:01"].booked.as_deref(), Some("alice"));

        store.lock("p1").await.clear_booking("p1", "aa:01").unwrap();
        let got = store.get("p1").unwrap();
        assert!(got["aa:01"].booked.is_none());
        assert_eq!(got["aa:01"].status, Occupancy::Free);
    }

    #[tokio::test]
    async fn test_booking_unknown_mac() {
        let store = NetworkStore::new();
        store.replace_lot("p1", sample()).await;
        let err = store.lock("p1").await.set_booking("p1", "zz:99", "alice").unwrap_err();
        assert!(matches!(err, KernelError::EntryNotFound { .. }));

        // parking jamais interrogé : même erreur
        let err = store.lock("p2").await.clear_booking("p2", "aa:01").unwrap_err();
        assert!(matches!(err, KernelError::EntryNotFound { .. }));
    }

    #[tokio::test]
    async fn test_stale_replace_is_discarded() {
        let store = NetworkStore::new();
        store.replace_lot("p1", sample()).await;

        let before = store.revision("p1");
        store.lock("p1").await.set_booking("p1", "aa:01", "alice").unwrap();

        // le poll lancé avant la réservation ne doit pas l'écraser
        assert!(!store.replace_if_unchanged("p1", before, sample()));
        assert_eq!(store.get("p1").unwrap()["aa:01"].booked.as_deref(), Some("alice"));

        let now = store.revision("p1");
        assert!(store.replace_if_unchanged("p1", now, sample()));
        assert!(store.get("p1").unwrap()["aa:01"].booked.is_none());
    }

    #[tokio::test]
    async fn test_replace_skipped_while_lot_is_locked() {
        let store = NetworkStore::new();
        store.replace_lot("p1", sample()).await;
        let revision = store.revision("p1");

        let guard = store.lock("p1").await;
        assert!(!store.replace_if_unchanged("p1", revision, SensorMap::new()));
        drop(guard);
        assert_eq!(store.get("p1").unwrap(), sample());
    }

    #[tokio::test]
    async fn test_reads_do_not_wait_for_critical_section() {
        let store = NetworkStore::new();
        store.replace_lot("p1", sample()).await;
        store.replace_lot("p2", sample()).await;

        // section critique en cours sur p2 (réservation en vol)
        let mut guard = store.lock("p2").await;
        guard.set_booking("p2", "aa:01", "bob").unwrap();

        // lecture immédiate, état commité visible
        assert_eq!(store.get("p2").unwrap()["aa:01"].booked.as_deref(), Some("bob"));
        assert_eq!(store.snapshot_all().len(), 2);
        drop(guard);
    }

    #[tokio::test]
    async fn test_snapshot_all_skips_unpolled() {
        let store = NetworkStore::new();
        store.replace_lot("p1", sample()).await;
        drop(store.lock("p2").await); // crée un slot vide

        let all = store.snapshot_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "p1");
    }
}
