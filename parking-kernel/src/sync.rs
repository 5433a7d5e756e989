/**
 * SYNCHRONIZER - Réconciliation périodique registre / capteurs
 *
 * Chaque cycle (10 s par défaut) :
 * 1. Métadonnées : rafraîchit le registre depuis la base. Échec = cycle sauté,
 *    rien n'est modifié.
 * 2. Polls : interroge tous les contrôleurs en parallèle, chacun borné par un
 *    timeout (4 s par défaut). Succès = snapshot remplacé + parking en ligne.
 *    Échec = parking hors ligne, dernier snapshot conservé mais plus fiable.
 * 3. Une notification `Registry` unique une fois tous les polls terminés.
 *
 * Un contrôleur lent ou en panne ne retarde jamais les autres parkings.
 */

use crate::device::DeviceClient;
use crate::error::{KernelError, Result};
use crate::health::HealthTracker;
use crate::hub::{Notification, NotificationHub};
use crate::models::Lot;
use crate::network::NetworkStore;
use crate::registry::LotRegistry;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Issue du poll d'un parking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Snapshot remplacé
    Refreshed,
    /// Contrôleur joignable mais une mutation locale a eu lieu pendant le poll
    Superseded,
    Offline,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub online: Vec<String>,
    pub offline: Vec<String>,
}

pub struct Synchronizer {
    registry: Arc<LotRegistry>,
    network: Arc<NetworkStore>,
    device: Arc<dyn DeviceClient>,
    hub: NotificationHub,
    health: HealthTracker,
    poll_timeout: Duration,
}

impl Synchronizer {
    pub fn new(
        registry: Arc<LotRegistry>,
        network: Arc<NetworkStore>,
        device: Arc<dyn DeviceClient>,
        hub: NotificationHub,
        health: HealthTracker,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            network,
            device,
            hub,
            health,
            poll_timeout,
        }
    }

    /// Un cycle complet ; `Err` uniquement si la phase métadonnées échoue
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        match self.registry.refresh_from_store().await {
            Ok(applied) => {
                self.health.set_store_available(true);
                debug!("[sync] {applied} lots from metadata store");
            }
            Err(e) => {
                self.health.set_store_available(false);
                error!("[sync] phase métadonnées échouée, cycle sauté: {e}");
                return Err(e);
            }
        }

        let lots = self.registry.list();
        let outcomes = join_all(lots.into_iter().map(|lot| self.poll_lot(lot))).await;

        let mut report = CycleReport::default();
        for (lot_id, outcome) in outcomes {
            match outcome {
                PollOutcome::Refreshed | PollOutcome::Superseded => report.online.push(lot_id),
                PollOutcome::Offline => report.offline.push(lot_id),
            }
        }

        self.hub.publish(Notification::Registry(self.registry.list()));
        self.health.record_cycle();
        info!(
            lots = self.registry.len(),
            online = report.online.len(),
            offline = report.offline.len(),
            "[sync] cycle terminé"
        );
        Ok(report)
    }

    async fn poll_lot(&self, lot: Lot) -> (String, PollOutcome) {
        // révision lue avant l'appel, dans le même budget de temps que le poll
        let poll = async {
            let revision = self.network.revision(&lot.id);
            let entries = self.device.snapshot(&lot.id, &lot.device_address).await?;
            Ok::<_, KernelError>((revision, entries))
        };

        let outcome = match timeout(self.poll_timeout, poll).await {
            Ok(Ok((revision, entries))) => {
                let applied = self.network.replace_if_unchanged(&lot.id, revision, entries);
                self.registry.mark_polled(&lot.id, true);
                if applied {
                    PollOutcome::Refreshed
                } else {
                    debug!(lot_id = %lot.id, "[sync] snapshot obsolète ignoré");
                    PollOutcome::Superseded
                }
            }
            Ok(Err(e)) => {
                warn!(lot_id = %lot.id, "[sync] parking hors ligne: {e}");
                self.registry.mark_polled(&lot.id, false);
                PollOutcome::Offline
            }
            Err(_) => {
                warn!(lot_id = %lot.id, "[sync] parking hors ligne: pas de réponse en {:?}", self.poll_timeout);
                self.registry.mark_polled(&lot.id, false);
                PollOutcome::Offline
            }
        };
        (lot.id, outcome)
    }

    /// Démarre la boucle périodique ; le premier cycle part immédiatement
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        info!("[sync] starting synchronizer (period: {:?})", period);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                // l'erreur est déjà journalisée, on attend le cycle suivant
                let _ = self.run_cycle().await;
            }
        })
    }
}
