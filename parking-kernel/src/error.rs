/**
 * ERREURS KERNEL - Types d'erreurs du coordinateur de parkings
 *
 * Toutes les opérations (registre, capteurs, réservations, seuil) remontent un
 * `KernelError`. La couche HTTP le convertit en status + corps JSON
 * `{error_code, message}` via `IntoResponse`.
 *
 * Aucune erreur n'entraîne de modification d'état : un échec laisse l'état
 * précédent intact.
 */

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, KernelError>;

#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Base des métadonnées injoignable ou illisible
    #[error("metadata store unavailable: {0}")]
    StoreUnavailable(String),

    /// Contrôleur du parking injoignable (connexion, timeout, payload corrompu)
    #[error("device of lot {lot_id} unreachable: {reason}")]
    DeviceUnreachable { lot_id: String, reason: String },

    /// Contrôleur joignable mais commande refusée ou non acquittée à temps
    #[error("device of lot {lot_id} rejected command: {reason}")]
    DeviceRejected {
        lot_id: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("no available slot in lot {0}")]
    NoAvailableSlot(String),

    #[error("no booking held by {holder} in lot {lot_id}")]
    NoBookingFound { lot_id: String, holder: String },

    /// Un utilisateur ne peut détenir qu'une réservation par parking
    #[error("{holder} already holds slot {mac} in lot {lot_id}")]
    AlreadyBooked {
        lot_id: String,
        holder: String,
        mac: String,
    },

    #[error("sensor {mac} not found in lot {lot_id}")]
    EntryNotFound { lot_id: String, mac: String },

    #[error("weather unavailable: {0}")]
    WeatherUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Identifiant d'utilisateur vide ou réservé par le protocole ("false")
    #[error("invalid holder '{0}'")]
    InvalidHolder(String),
}

impl KernelError {
    pub fn error_code(&self) -> &'static str {
        match self {
            KernelError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            KernelError::DeviceUnreachable { .. } => "DEVICE_UNREACHABLE",
            KernelError::DeviceRejected { .. } => "DEVICE_REJECTED",
            KernelError::NoAvailableSlot(_) => "NO_AVAILABLE_SLOT",
            KernelError::NoBookingFound { .. } => "NO_BOOKING_FOUND",
            KernelError::AlreadyBooked { .. } => "ALREADY_BOOKED",
            KernelError::EntryNotFound { .. } => "ENTRY_NOT_FOUND",
            KernelError::WeatherUnavailable(_) => "WEATHER_UNAVAILABLE",
            KernelError::NotFound(_) => "NOT_FOUND",
            KernelError::InvalidHolder(_) => "INVALID_HOLDER",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            KernelError::NotFound(_)
            | KernelError::EntryNotFound { .. }
            | KernelError::NoBookingFound { .. } => StatusCode::NOT_FOUND,
            KernelError::NoAvailableSlot(_) | KernelError::InvalidHolder(_) => {
                StatusCode::BAD_REQUEST
            }
            KernelError::AlreadyBooked { .. } => StatusCode::CONFLICT,
            // on propage le status du contrôleur quand il en a renvoyé un
            KernelError::DeviceRejected { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            KernelError::DeviceUnreachable { .. } => StatusCode::BAD_GATEWAY,
            KernelError::StoreUnavailable(_) | KernelError::WeatherUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for KernelError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        tracing::warn!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "[http] request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_status_is_propagated() {
        let err = KernelError::DeviceRejected {
            lot_id: "p1".into(),
            status: Some(503),
            reason: "busy".into(),
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let timeout = KernelError::DeviceRejected {
            lot_id: "p1".into(),
            status: None,
            reason: "timed out".into(),
        };
        assert_eq!(timeout.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_booking_errors_mapping() {
        assert_eq!(
            KernelError::NoAvailableSlot("p1".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        let err = KernelError::NoBookingFound {
            lot_id: "p1".into(),
            holder: "bob".into(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "NO_BOOKING_FOUND");
    }
}
