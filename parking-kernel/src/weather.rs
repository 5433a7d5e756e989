/**
 * WEATHER - Collaborateur météo pour le calcul de seuil
 *
 * Fournit, pour une position, lever/coucher du soleil, heure courante et
 * couverture nuageuse. Implémentation OpenWeatherMap (`/data/2.5/weather`).
 */

use crate::error::{KernelError, Result};
use crate::models::GeoPosition;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Relevé météo, horodatages en secondes Unix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherObservation {
    pub sunrise: i64,
    pub sunset: i64,
    pub current: i64,
    /// Couverture nuageuse dans [0, 1]
    pub cloud_fraction: f64,
}

impl WeatherObservation {
    /// Avancement de la journée : 0 = lever, 1 = coucher
    pub fn sun_fraction(&self) -> Result<f64> {
        if self.sunset <= self.sunrise {
            return Err(KernelError::WeatherUnavailable(format!(
                "degenerate day (sunrise {}, sunset {})",
                self.sunrise, self.sunset
            )));
        }
        Ok((self.current - self.sunrise) as f64 / (self.sunset - self.sunrise) as f64)
    }
}

#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn observe(&self, position: GeoPosition) -> Result<WeatherObservation>;
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    dt: i64,
    sys: OwmSys,
    clouds: OwmClouds,
}

#[derive(Debug, Deserialize)]
struct OwmSys {
    sunrise: i64,
    sunset: i64,
}

#[derive(Debug, Deserialize)]
struct OwmClouds {
    all: f64, // pourcentage
}

impl From<OwmResponse> for WeatherObservation {
    fn from(r: OwmResponse) -> Self {
        Self {
            sunrise: r.sys.sunrise,
            sunset: r.sys.sunset,
            current: r.dt,
            cloud_fraction: (r.clouds.all / 100.0).clamp(0.0, 1.0),
        }
    }
}

pub struct OpenWeatherMap {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl OpenWeatherMap {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
            timeout,
        }
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherMap {
    async fn observe(&self, position: GeoPosition) -> Result<WeatherObservation> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| KernelError::WeatherUnavailable("no API token configured".into()))?;

        let unavailable = |e: reqwest::Error| KernelError::WeatherUnavailable(e.to_string());

        let resp = self
            .http
            .get(&self.base_url)
            .query(&[
                ("lat", position.latitude.to_string()),
                ("lon", position.longitude.to_string()),
                ("appid", token.to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;

        let body: OwmResponse = resp.json().await.map_err(unavailable)?;
        Ok(body.into())
    }
}
