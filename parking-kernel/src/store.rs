/**
 * METADATA STORE - Source des fiches parkings
 *
 * RÔLE : fournit au registre la liste complète des parkings provisionnés
 * (id, adresse du contrôleur, nom, position, fermeture administrative).
 *
 * `LotStore` est l'interface commune ; `YamlLotStore` relit un fichier YAML à
 * chaque rafraîchissement, une ligne par parking :
 * ```yaml
 * - id: 1
 *   ipAddress: "192.168.1.40"
 *   name: "Piazza Vittorio"
 *   position: "45.0650, 7.6950"
 *   closed: 0
 * ```
 */

use crate::error::{KernelError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

/// Une ligne de la table des parkings
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LotRow {
    #[serde(deserialize_with = "text_or_number")]
    pub id: String,
    #[serde(rename = "ipAddress")]
    pub ip_address: String,
    pub name: String,
    pub position: String,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub closed: bool,
}

#[async_trait]
pub trait LotStore: Send + Sync {
    /// Toutes les lignes, ou `StoreUnavailable`
    async fn fetch_lots(&self) -> Result<Vec<LotRow>>;
}

pub struct YamlLotStore {
    path: PathBuf,
}

impl YamlLotStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LotStore for YamlLotStore {
    async fn fetch_lots(&self) -> Result<Vec<LotRow>> {
        let txt = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            KernelError::StoreUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        if txt.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_yaml::from_str(&txt).map_err(|e| {
            KernelError::StoreUnavailable(format!("{}: {e}", self.path.display()))
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Text(String),
}

fn text_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    match Scalar::deserialize(d)? {
        Scalar::Int(n) => Ok(n.to_string()),
        Scalar::Text(s) => Ok(s),
        Scalar::Bool(_) => Err(serde::de::Error::custom("lot id cannot be a boolean")),
    }
}

// une colonne TINYINT remonte 0/1
fn bool_or_int<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    match Scalar::deserialize(d)? {
        Scalar::Bool(b) => Ok(b),
        Scalar::Int(n) => Ok(n != 0),
        Scalar::Text(s) => match s.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid closed flag '{other}'"))),
        },
    }
}
