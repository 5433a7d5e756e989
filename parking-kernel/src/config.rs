use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub sync: SyncConf,
    pub device: DeviceConf,
    pub store: StoreConf,
    pub weather: WeatherConf,
    pub notifications: NotificationsConf,
    pub mqtt: Option<MqttConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConf {
    pub interval_secs: u64,
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceConf {
    pub command_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConf {
    pub path: String, // ex: "/etc/parking/lots.yaml"
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WeatherConf {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationsConf {
    pub capacity: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:5000".into() }
    }
}

impl Default for SyncConf {
    fn default() -> Self {
        Self { interval_secs: 10, poll_timeout_secs: 4 }
    }
}

impl Default for DeviceConf {
    fn default() -> Self {
        Self { command_timeout_secs: 5 }
    }
}

impl Default for StoreConf {
    fn default() -> Self {
        Self { path: "lots.yaml".into() }
    }
}

impl Default for WeatherConf {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org/data/2.5/weather".into(),
            token: None,
            timeout_secs: 5,
        }
    }
}

impl Default for NotificationsConf {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

impl SyncConf {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs.max(1))
    }
}

impl DeviceConf {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}

impl WeatherConf {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

pub fn parse_config(txt: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        tracing::warn!("[kernel] config invalide: {e}");
        KernelConfig::default()
    })
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("PARKING_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt)
    } else {
        tracing::warn!("[kernel] pas de {path}, usage config par défaut");
        KernelConfig::default()
    };

    // le token météo peut venir du .env
    if let Ok(token) = std::env::var("OWM_TOKEN") {
        if !token.is_empty() {
            cfg.weather.token = Some(token);
        }
    }
    cfg
}
