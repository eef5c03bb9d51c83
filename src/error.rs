//! Errores del dominio y su traducción a respuestas HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum RegistroError {
    #[error("No encontrado: {0}")]
    NoEncontrado(String),

    #[error("Petición no válida: {0}")]
    Validacion(String),

    #[error("Conflicto: {0}")]
    Conflicto(String),

    #[error("Fallo del servicio de predicción: {0}")]
    ServicioExterno(String),

    #[error("Error del almacén: {0}")]
    Almacen(String),

    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error interno: {0}")]
    Interno(String),
}

pub type Result<T> = std::result::Result<T, RegistroError>;

impl From<neo4rs::Error> for RegistroError {
    fn from(err: neo4rs::Error) -> Self {
        Self::Almacen(err.to_string())
    }
}

impl RegistroError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoEncontrado(_) => StatusCode::NOT_FOUND,
            Self::Validacion(_) => StatusCode::BAD_REQUEST,
            Self::Conflicto(_) => StatusCode::CONFLICT,
            Self::ServicioExterno(_) => StatusCode::BAD_GATEWAY,
            Self::Almacen(_) | Self::Io(_) | Self::Interno(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RegistroError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn not_found_maps_to_404_with_error_body() {
        let response = RegistroError::NoEncontrado("Paciente 3".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "No encontrado: Paciente 3");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            RegistroError::Validacion("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RegistroError::Conflicto("x".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            RegistroError::ServicioExterno("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            RegistroError::Interno("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
