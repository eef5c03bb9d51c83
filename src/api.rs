use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::warn;

use crate::{
    app_state::AppState,
    error::{RegistroError, Result},
    models::{Imagen, Informe, Medico, Paciente},
};

/// Parte `paciente` de la subida de imágenes; sólo interesa el id.
#[derive(Deserialize)]
struct ReferenciaPaciente {
    id: i64,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    let limite = app_state.config.max_upload_bytes;
    Router::new()
        .route("/medico", post(crear_medico_handler).put(actualizar_medico_handler))
        .route("/medico/:id", get(medico_handler).delete(borrar_medico_handler))
        .route("/medico/dni/:dni", get(medico_por_dni_handler))
        .route("/paciente", post(crear_paciente_handler).put(actualizar_paciente_handler))
        .route("/paciente/:id", get(paciente_handler).delete(borrar_paciente_handler))
        .route("/paciente/medico/:id", get(pacientes_de_medico_handler))
        .route("/imagen", post(subir_imagen_handler))
        .route("/imagen/:id", get(imagen_handler).delete(borrar_imagen_handler))
        .route("/imagen/info/:id", get(contenido_imagen_handler))
        .route("/imagen/paciente/:id", get(imagenes_de_paciente_handler))
        .route("/imagen/predict/:id", get(prediccion_handler))
        .route("/informe", post(crear_informe_handler))
        .route("/informe/:id", get(informe_handler).delete(borrar_informe_handler))
        .route("/informe/imagen/:id", get(informes_de_imagen_handler))
        .layer(DefaultBodyLimit::max(limite))
        .with_state(app_state)
}

// Los clientes existentes esperan un 5xx, no un 404, al leer un médico o
// paciente que no existe.
fn inexistente(que: &str, clave: impl std::fmt::Display) -> RegistroError {
    RegistroError::Interno(format!("{que} {clave} no existe"))
}

// --- Médicos ---

#[axum::debug_handler]
async fn crear_medico_handler(
    State(state): State<AppState>,
    Json(medico): Json<Medico>,
) -> Result<impl IntoResponse> {
    let medico = state.registro.guardar_medico(medico).await?;
    Ok((StatusCode::CREATED, Json(medico)))
}

#[axum::debug_handler]
async fn actualizar_medico_handler(
    State(state): State<AppState>,
    Json(medico): Json<Medico>,
) -> Result<StatusCode> {
    state.registro.guardar_medico(medico).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn medico_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Medico>> {
    state
        .registro
        .medico(id)
        .await?
        .map(Json)
        .ok_or_else(|| inexistente("Médico", id))
}

#[axum::debug_handler]
async fn medico_por_dni_handler(
    State(state): State<AppState>,
    Path(dni): Path<String>,
) -> Result<Json<Medico>> {
    state
        .registro
        .medico_por_dni(&dni)
        .await?
        .map(Json)
        .ok_or_else(|| inexistente("Médico con dni", &dni))
}

#[axum::debug_handler]
async fn borrar_medico_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.registro.borrar_medico(id).await?;
    Ok(StatusCode::OK)
}

// --- Pacientes ---

#[axum::debug_handler]
async fn crear_paciente_handler(
    State(state): State<AppState>,
    Json(paciente): Json<Paciente>,
) -> Result<impl IntoResponse> {
    let paciente = state.registro.guardar_paciente(paciente).await?;
    Ok((StatusCode::CREATED, Json(paciente)))
}

#[axum::debug_handler]
async fn actualizar_paciente_handler(
    State(state): State<AppState>,
    Json(paciente): Json<Paciente>,
) -> Result<StatusCode> {
    state.registro.guardar_paciente(paciente).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn paciente_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Paciente>> {
    state
        .registro
        .paciente(id)
        .await?
        .map(Json)
        .ok_or_else(|| inexistente("Paciente", id))
}

#[axum::debug_handler]
async fn pacientes_de_medico_handler(
    State(state): State<AppState>,
    Path(medico_id): Path<i64>,
) -> Result<Json<Vec<Paciente>>> {
    Ok(Json(state.registro.pacientes_de_medico(medico_id).await?))
}

#[axum::debug_handler]
async fn borrar_paciente_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.registro.borrar_paciente(id).await?;
    Ok(StatusCode::OK)
}

// --- Imágenes ---

/// Recibe `image` (fichero) y `paciente` (JSON) en un multipart.
#[axum::debug_handler]
async fn subir_imagen_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut fichero: Option<(String, Vec<u8>)> = None;
    let mut paciente_id: Option<i64> = None;

    let invalido = |e: axum::extract::multipart::MultipartError| {
        RegistroError::Validacion(format!("Multipart inválido: {e}"))
    };
    while let Some(field) = multipart.next_field().await.map_err(invalido)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let nombre = field.file_name().unwrap_or("").to_string();
                let bytes = field.bytes().await.map_err(invalido)?;
                fichero = Some((nombre, bytes.to_vec()));
            }
            "paciente" => {
                let bytes = field.bytes().await.map_err(invalido)?;
                let referencia: ReferenciaPaciente = serde_json::from_slice(&bytes)
                    .map_err(|e| RegistroError::Validacion(format!("Paciente inválido: {e}")))?;
                paciente_id = Some(referencia.id);
            }
            otro => warn!("Ignorando parte multipart desconocida '{}'", otro),
        }
    }

    let (nombre, bytes) =
        fichero.ok_or_else(|| RegistroError::Validacion("Falta la parte 'image'".into()))?;
    let paciente_id =
        paciente_id.ok_or_else(|| RegistroError::Validacion("Falta la parte 'paciente'".into()))?;

    let confirmacion = state.ingesta.ingerir(&nombre, &bytes, paciente_id).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        confirmacion.cuerpo_json(),
    ))
}

#[axum::debug_handler]
async fn imagen_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Imagen>> {
    state
        .relaciones
        .imagen(id)
        .await?
        .map(Json)
        .ok_or_else(|| RegistroError::NoEncontrado(format!("Imagen {id}")))
}

#[axum::debug_handler]
async fn contenido_imagen_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let (bytes, mime) = state.ingesta.contenido(id).await?;
    Ok(([(header::CONTENT_TYPE, mime)], bytes))
}

#[axum::debug_handler]
async fn imagenes_de_paciente_handler(
    State(state): State<AppState>,
    Path(paciente_id): Path<i64>,
) -> Result<Json<Vec<Imagen>>> {
    Ok(Json(state.relaciones.imagenes_de_paciente(paciente_id).await?))
}

#[axum::debug_handler]
async fn prediccion_handler(
    State(state): State<AppState>,
    Path(paciente_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let texto = state.prediccion.predecir_paciente(paciente_id).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], texto))
}

#[axum::debug_handler]
async fn borrar_imagen_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.ingesta.borrar(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Informes ---

#[axum::debug_handler]
async fn crear_informe_handler(
    State(state): State<AppState>,
    Json(informe): Json<Informe>,
) -> Result<impl IntoResponse> {
    let informe = state.informes.crear(informe).await?;
    Ok((StatusCode::CREATED, Json(informe)))
}

/// Un informe inexistente se responde con `200` y cuerpo `null`.
#[axum::debug_handler]
async fn informe_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Option<Informe>>> {
    Ok(Json(state.informes.informe(id).await?))
}

#[axum::debug_handler]
async fn informes_de_imagen_handler(
    State(state): State<AppState>,
    Path(imagen_id): Path<i64>,
) -> Result<Json<Vec<Informe>>> {
    Ok(Json(state.informes.informes_de_imagen(imagen_id).await?))
}

#[axum::debug_handler]
async fn borrar_informe_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.informes.borrar(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
