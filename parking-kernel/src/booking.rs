/**
 * BOOKING ALLOCATOR - Réservation d'une place sur un capteur
 *
 * POLITIQUE : première place éligible par adresse croissante
 * (libre + non réservée + capteur en ligne). Simple et déterministe.
 *
 * SÉQUENCE (sous le verrou du parking, du scan jusqu'au commit) :
 * 1. scan du snapshot courant
 * 2. commande au contrôleur, bornée par un timeout
 * 3. commit local uniquement après acquittement
 *
 * Un utilisateur détient au plus une réservation par parking.
 */

use crate::device::{acknowledged, DeviceClient};
use crate::error::{KernelError, Result};
use crate::network::NetworkStore;
use crate::registry::LotRegistry;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct BookingAllocator {
    registry: Arc<LotRegistry>,
    network: Arc<NetworkStore>,
    device: Arc<dyn DeviceClient>,
    command_timeout: Duration,
}

/// "false" est la valeur « pas de réservation » du protocole contrôleur
fn validate_holder(holder: &str) -> Result<()> {
    if holder.trim().is_empty() || holder == "false" || holder == "true" {
        return Err(KernelError::InvalidHolder(holder.to_string()));
    }
    Ok(())
}

impl BookingAllocator {
    pub fn new(
        registry: Arc<LotRegistry>,
        network: Arc<NetworkStore>,
        device: Arc<dyn DeviceClient>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            network,
            device,
            command_timeout,
        }
    }

    /// Réserve la première place éligible, retourne son adresse capteur
    pub async fn book(&self, lot_id: &str, holder: &str) -> Result<String> {
        validate_holder(holder)?;
        let address = self.registry.get(lot_id)?.device_address;

        let mut guard = self.network.lock(lot_id).await;
        let entries = guard
            .entries()
            .ok_or_else(|| KernelError::NotFound(format!("lot {lot_id} never polled")))?;

        if let Some((mac, _)) = entries.iter().find(|(_, e)| e.is_held_by(holder)) {
            return Err(KernelError::AlreadyBooked {
                lot_id: lot_id.to_string(),
                holder: holder.to_string(),
                mac: mac.clone(),
            });
        }

        let mac = entries
            .iter()
            .find(|(_, e)| e.is_eligible())
            .map(|(mac, _)| mac.clone())
            .ok_or_else(|| KernelError::NoAvailableSlot(lot_id.to_string()))?;

        debug!(lot_id, mac = %mac, holder, "[booking] forwarding book command");
        acknowledged(
            lot_id,
            self.command_timeout,
            self.device.book(lot_id, &address, &mac, Some(holder)),
        )
        .await?;

        guard.set_booking(lot_id, &mac, holder)?;
        info!(lot_id, mac = %mac, holder, "[booking] place réservée");
        Ok(mac)
    }

    /// Libère la place tenue par `holder`, retourne son adresse capteur
    pub async fn unbook(&self, lot_id: &str, holder: &str) -> Result<String> {
        validate_holder(holder)?;
        let address = self.registry.get(lot_id)?.device_address;

        let mut guard = self.network.lock(lot_id).await;
        let entries = guard
            .entries()
            .ok_or_else(|| KernelError::NotFound(format!("lot {lot_id} never polled")))?;

        let mac = entries
            .iter()
            .find(|(_, e)| e.is_held_by(holder))
            .map(|(mac, _)| mac.clone())
            .ok_or_else(|| KernelError::NoBookingFound {
                lot_id: lot_id.to_string(),
                holder: holder.to_string(),
            })?;

        acknowledged(
            lot_id,
            self.command_timeout,
            self.device.book(lot_id, &address, &mac, None),
        )
        .await?;

        guard.clear_booking(lot_id, &mac)?;
        info!(lot_id, mac = %mac, holder, "[booking] réservation annulée");
        Ok(mac)
    }

    /// Parkings où `holder` détient une place, triés, sans doublon
    pub fn list_bookings_for(&self, holder: &str) -> Vec<String> {
        self.network
            .snapshot_all()
            .into_iter()
            .filter(|(_, entries)| entries.values().any(|e| e.is_held_by(holder)))
            .map(|(lot_id, _)| lot_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
