/*!
Fixtures de snapshots capteurs

Construit des snapshots au format exact renvoyé par un contrôleur de parking :
`{ "<mac>": { "status": "free"|"occupied", "booked": "<user>"|"false", "online": "true"|"false" } }`
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Un capteur tel que le contrôleur le sérialise (tout est chaîne de caractères)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockSensor {
    pub status: String,
    pub booked: String,
    pub online: String,
}

impl MockSensor {
    pub fn new(status: &str, booked: &str, online: bool) -> Self {
        Self {
            status: status.to_string(),
            booked: booked.to_string(),
            online: online.to_string(),
        }
    }
}

/// Builder fluide pour les snapshots de test
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    sensors: BTreeMap<String, MockSensor>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place libre, non réservée, en ligne
    pub fn free(mut self, mac: &str) -> Self {
        self.sensors.insert(mac.to_string(), MockSensor::new("free", "false", true));
        self
    }

    /// Place occupée par un véhicule
    pub fn occupied(mut self, mac: &str) -> Self {
        self.sensors.insert(mac.to_string(), MockSensor::new("occupied", "false", true));
        self
    }

    /// Place libre mais réservée par `holder`
    pub fn booked(mut self, mac: &str, holder: &str) -> Self {
        self.sensors.insert(mac.to_string(), MockSensor::new("free", holder, true));
        self
    }

    /// Capteur libre mais injoignable
    pub fn offline(mut self, mac: &str) -> Self {
        self.sensors.insert(mac.to_string(), MockSensor::new("free", "false", false));
        self
    }

    pub fn sensor(mut self, mac: &str, sensor: MockSensor) -> Self {
        self.sensors.insert(mac.to_string(), sensor);
        self
    }

    pub fn build(self) -> BTreeMap<String, MockSensor> {
        self.sensors
    }

    /// Snapshot JSON prêt à être servi ou poussé au coordinateur
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.sensors).unwrap_or(Value::Null)
    }
}
