/**
 * NOTIFICATION HUB - Diffusion des changements d'état
 *
 * RÔLE : canal de broadcast interne vers tous les abonnés (clients WebSocket,
 * pont MQTT). Trois messages :
 * - `Registry`   : toutes les fiches parkings (après chaque cycle de synchro)
 * - `LotNetwork` : snapshot capteurs d'un parking
 * - `LotInfo`    : fiche d'un parking
 *
 * Un abonné trop lent perd les messages les plus anciens (lagged), il ne
 * bloque jamais les émetteurs.
 */

use crate::models::{Lot, SensorMap};
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    Registry(Vec<Lot>),
    LotNetwork { lot_id: String, network: SensorMap },
    LotInfo(Lot),
}

impl Notification {
    /// Topic MQTT / nom d'événement côté clients
    pub fn topic(&self) -> String {
        match self {
            Notification::Registry(_) => "parking/lots/info@v1".to_string(),
            Notification::LotNetwork { lot_id, .. } => format!("parking/{lot_id}/network@v1"),
            Notification::LotInfo(lot) => format!("parking/{}/info@v1", lot.id),
        }
    }
}

#[derive(Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Retourne le nombre d'abonnés ayant reçu le message
    pub fn publish(&self, notification: Notification) -> usize {
        // aucun abonné n'est pas une erreur
        self.tx.send(notification).unwrap_or(0)
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPosition;

    fn lot(id: &str) -> Lot {
        Lot {
            id: id.into(),
            name: "Centro".into(),
            position: GeoPosition { latitude: 45.0, longitude: 7.0 },
            closed: false,
            reachable: true,
            last_polled: None,
            device_address: "10.0.0.1".into(),
            closed_override: None,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let hub = NotificationHub::new(8);
        assert_eq!(hub.publish(Notification::LotInfo(lot("p1"))), 0);

        let mut rx = hub.subscribe();
        assert_eq!(hub.publish(Notification::LotInfo(lot("p1"))), 1);
        match rx.recv().await.unwrap() {
            Notification::LotInfo(l) => assert_eq!(l.id, "p1"),
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[test]
    fn test_topics_and_wire_shape() {
        let n = Notification::LotNetwork { lot_id: "p7".into(), network: SensorMap::new() };
        assert_eq!(n.topic(), "parking/p7/network@v1");
        assert_eq!(Notification::Registry(vec![]).topic(), "parking/lots/info@v1");

        let json = serde_json::to_value(Notification::LotInfo(lot("p1"))).unwrap();
        assert_eq!(json["type"], "lot_info");
        assert_eq!(json["data"]["id"], "p1");
        // l'adresse du contrôleur ne sort jamais
        assert!(json["data"].get("device_address").is_none());
    }
}
