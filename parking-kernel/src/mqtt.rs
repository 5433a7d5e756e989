/**
 * MQTT BRIDGE - Republication des notifications sur le broker
 *
 * Chaque notification du hub part en JSON sur son topic :
 * - parking/lots/info@v1       : registre complet après chaque cycle
 * - parking/<lot>/network@v1   : snapshot capteurs d'un parking
 * - parking/<lot>/info@v1      : fiche d'un parking
 *
 * Désactivé quand la section `mqtt` de la config est absente.
 */

use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::hub::{Notification, NotificationHub};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Topic + charge utile JSON d'une notification
pub fn encode(notification: &Notification) -> Option<(String, String)> {
    match serde_json::to_string(notification) {
        Ok(payload) => Some((notification.topic(), payload)),
        Err(e) => {
            error!("[mqtt] sérialisation impossible: {e}");
            None
        }
    }
}

pub fn spawn_mqtt_bridge(conf: MqttConf, hub: &NotificationHub, health: HealthTracker) -> JoinHandle<()> {
    let mut rx = hub.subscribe();

    task::spawn(async move {
        let mut opts = MqttOptions::new("parking-kernel", &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 64);
        health.set_mqtt_status("connecting");
        info!("[mqtt] bridge vers {}:{}", conf.host, conf.port);

        loop {
            tokio::select! {
                received = rx.recv() => {
                    match received {
                        Ok(notification) => {
                            let Some((topic, payload)) = encode(&notification) else { continue };
                            if let Err(e) = client.publish(topic.as_str(), QoS::AtLeastOnce, false, payload).await {
                                warn!("[mqtt] publish {topic} échoué: {e:?}");
                            } else {
                                debug!("[mqtt] published {topic}");
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("[mqtt] {skipped} notifications perdues (bridge trop lent)");
                        }
                        Err(RecvError::Closed) => {
                            info!("[mqtt] hub fermé, arrêt du bridge");
                            break;
                        }
                    }
                },
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                            info!("[mqtt] connecté");
                            health.set_mqtt_status("connected");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("[mqtt] erreur: {:?}", e);
                            health.set_mqtt_status("error");
                            tokio::time::sleep(Duration::from_secs(2)).await;
                        }
                    }
                }
            }
        }
    })
}
