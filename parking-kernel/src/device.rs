/**
 * DEVICE CLIENT - Protocole des contrôleurs de parking
 *
 * Chaque parking expose un petit serveur HTTP sur son contrôleur :
 * - `GET /`       → `{mac: {status, booked, online}}`
 * - `POST /book`  → `{mac, book: <holder>|"false"}` (libérer = "false")
 * - `POST /close` → `{close: bool}`
 *
 * Seul un status 2xx vaut acquittement. Tout appel est borné par un timeout.
 */

use crate::error::{KernelError, Result};
use crate::models::SensorMap;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Snapshot complet des capteurs du parking
    async fn snapshot(&self, lot_id: &str, address: &str) -> Result<SensorMap>;

    /// Réserve (`Some(holder)`) ou libère (`None`) la place `mac`
    async fn book(&self, lot_id: &str, address: &str, mac: &str, holder: Option<&str>) -> Result<()>;

    async fn close(&self, lot_id: &str, address: &str, closed: bool) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct BookCommand<'a> {
    mac: &'a str,
    book: &'a str,
}

#[derive(Debug, Serialize)]
struct CloseCommand {
    close: bool,
}

pub struct HttpDeviceClient {
    http: reqwest::Client,
    poll_timeout: Duration,
    command_timeout: Duration,
}

impl HttpDeviceClient {
    pub fn new(poll_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            poll_timeout,
            command_timeout,
        }
    }

    async fn send_command<T: Serialize + Sync>(
        &self,
        lot_id: &str,
        url: String,
        body: &T,
    ) -> Result<()> {
        let resp = self
            .http
            .post(&url)
            .timeout(self.command_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| command_error(lot_id, e))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(KernelError::DeviceRejected {
                lot_id: lot_id.to_string(),
                status: Some(status.as_u16()),
                reason: format!("{url} answered {status}"),
            })
        }
    }
}

/// "192.168.1.40" → "http://192.168.1.40"
pub fn device_url(address: &str, path: &str) -> String {
    let base = if address.starts_with("http://") || address.starts_with("https://") {
        address.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", address.trim_end_matches('/'))
    };
    format!("{base}{path}")
}

/// Borne une commande : sans acquittement avant `limit`, elle est refusée
pub async fn acknowledged<F>(lot_id: &str, limit: Duration, command: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    match tokio::time::timeout(limit, command).await {
        Ok(res) => res,
        Err(_) => Err(KernelError::DeviceRejected {
            lot_id: lot_id.to_string(),
            status: None,
            reason: format!("no acknowledgement within {}ms", limit.as_millis()),
        }),
    }
}

fn command_error(lot_id: &str, e: reqwest::Error) -> KernelError {
    if e.is_timeout() {
        KernelError::DeviceRejected {
            lot_id: lot_id.to_string(),
            status: None,
            reason: "no acknowledgement before timeout".into(),
        }
    } else {
        KernelError::DeviceUnreachable {
            lot_id: lot_id.to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl DeviceClient for HttpDeviceClient {
    async fn snapshot(&self, lot_id: &str, address: &str) -> Result<SensorMap> {
        let unreachable = |reason: String| KernelError::DeviceUnreachable {
            lot_id: lot_id.to_string(),
            reason,
        };

        let resp = self
            .http
            .get(device_url(address, "/"))
            .timeout(self.poll_timeout)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(unreachable(format!("snapshot answered {status}")));
        }

        let body = resp.bytes().await.map_err(|e| unreachable(e.to_string()))?;
        serde_json::from_slice::<SensorMap>(&body)
            .map_err(|e| unreachable(format!("malformed payload: {e}")))
    }

    async fn book(&self, lot_id: &str, address: &str, mac: &str, holder: Option<&str>) -> Result<()> {
        let body = BookCommand {
            mac,
            book: holder.unwrap_or("false"),
        };
        self.send_command(lot_id, device_url(address, "/book"), &body).await
    }

    async fn close(&self, lot_id: &str, address: &str, closed: bool) -> Result<()> {
        self.send_command(lot_id, device_url(address, "/close"), &CloseCommand { close: closed })
            .await
    }
}
