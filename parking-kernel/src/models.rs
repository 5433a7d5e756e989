use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// Position géographique d'un parking (clé de la recherche météo)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl FromStr for GeoPosition {
    type Err = String;

    /// Format de la base : "45.0703, 7.6869"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',').map(str::trim);
        let (Some(lat), Some(lon), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("bad position '{s}'"));
        };
        let latitude = lat.parse::<f64>().map_err(|_| format!("bad latitude '{lat}'"))?;
        let longitude = lon.parse::<f64>().map_err(|_| format!("bad longitude '{lon}'"))?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(format!("position out of range '{s}'"));
        }
        Ok(Self { latitude, longitude })
    }
}

impl fmt::Display for GeoPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

/// Un parking tel que connu du registre
#[derive(Debug, Clone, Serialize)]
pub struct Lot {
    pub id: String,
    pub name: String,
    pub position: GeoPosition,
    /// Fermeture administrative effective (override local ou valeur de la base)
    pub closed: bool,
    /// Résultat du dernier poll du contrôleur
    pub reachable: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_polled: Option<OffsetDateTime>,
    /// Adresse réseau du contrôleur, jamais exposée aux clients
    #[serde(skip)]
    pub device_address: String,
    /// Fermeture/ouverture acquittée par le contrôleur mais pas encore en base
    #[serde(skip)]
    pub closed_override: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Occupancy {
    Free,
    Occupied,
}

/// Une place surveillée, clé = adresse matérielle du capteur
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorEntry {
    pub status: Occupancy,
    /// Détenteur de la réservation ("false" sur le fil = aucune)
    #[serde(with = "wire::holder")]
    pub booked: Option<String>,
    #[serde(with = "wire::flag")]
    pub online: bool,
}

impl SensorEntry {
    /// Libre, non réservée et joignable
    pub fn is_eligible(&self) -> bool {
        self.status == Occupancy::Free && self.booked.is_none() && self.online
    }

    pub fn is_held_by(&self, holder: &str) -> bool {
        self.booked.as_deref() == Some(holder)
    }
}

/// Snapshot complet d'un parking, trié par adresse croissante
pub type SensorMap = BTreeMap<String, SensorEntry>;

/// Vue publique d'un parking ouvert et en ligne
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotSummary {
    pub id: String,
    pub name: String,
    pub free_parkings: usize,
}

/// Les contrôleurs sérialisent booléens et réservations en chaînes.
mod wire {
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    pub mod flag {
        use super::BoolOrString;
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &bool, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(if *value { "true" } else { "false" })
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
            match BoolOrString::deserialize(d)? {
                BoolOrString::Bool(b) => Ok(b),
                BoolOrString::Str(s) => match s.as_str() {
                    "true" => Ok(true),
                    "false" => Ok(false),
                    other => Err(D::Error::custom(format!("invalid flag '{other}'"))),
                },
            }
        }
    }

    pub mod holder {
        use super::BoolOrString;
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(value.as_deref().unwrap_or("false"))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
            match BoolOrString::deserialize(d)? {
                BoolOrString::Bool(false) => Ok(None),
                BoolOrString::Bool(true) => Err(D::Error::custom("booking holder cannot be `true`")),
                BoolOrString::Str(s) if s == "false" || s.is_empty() => Ok(None),
                BoolOrString::Str(s) => Ok(Some(s)),
            }
        }
    }
}
