//! Predicción de cáncer sobre la imagen de un paciente.
//!
//! El modelo vive fuera del servicio; aquí sólo se consume a través del
//! trait [`Clasificador`], cuya implementación de producción llama por HTTP
//! al servidor del modelo.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{error, info};

use crate::blobs::AlmacenFicheros;
use crate::config::AppConfig;
use crate::error::{RegistroError, Result};
use crate::models::FilaImagen;
use crate::relaciones::Relaciones;
use crate::store::Almacen;

/// Salida del clasificador: etiqueta 0 (sano) o 1 (cáncer) y su puntuación.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Clasificacion {
    #[serde(rename = "label")]
    pub etiqueta: u8,
    #[serde(rename = "score")]
    pub puntuacion: f64,
}

#[async_trait]
pub trait Clasificador: Send + Sync {
    async fn clasificar(&self, imagen: &[u8]) -> Result<Clasificacion>;
}

/// Texto que ve el cliente, p. ej. `Cancer (label 1), score: 0.87`.
pub fn formatear_prediccion(c: &Clasificacion) -> String {
    let etiqueta = if c.etiqueta == 1 {
        "Cancer (label 1)"
    } else {
        "Not cancer (label 0)"
    };
    format!("{}, score: {}", etiqueta, c.puntuacion)
}

/// Cliente del servidor del modelo. Envía la imagen como parte multipart
/// `image` y espera `{"label": 0|1, "score": <f64>}`. Sin reintentos.
#[derive(Debug, Clone)]
pub struct ClasificadorHttp {
    cliente: reqwest::Client,
    url: String,
}

impl ClasificadorHttp {
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let cliente = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.predictor_timeout_secs))
            .build()?;
        Ok(Self {
            cliente,
            url: cfg.predictor_url.clone(),
        })
    }
}

#[async_trait]
impl Clasificador for ClasificadorHttp {
    async fn clasificar(&self, imagen: &[u8]) -> Result<Clasificacion> {
        let externo = |e: reqwest::Error| RegistroError::ServicioExterno(e.to_string());

        let form = Form::new().part("image", Part::bytes(imagen.to_vec()).file_name("image"));
        let respuesta = self
            .cliente
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(externo)?
            .error_for_status()
            .map_err(externo)?;
        let clasificacion: Clasificacion = respuesta.json().await.map_err(externo)?;

        if clasificacion.etiqueta > 1 {
            return Err(RegistroError::ServicioExterno(format!(
                "Etiqueta desconocida devuelta por el modelo: {}",
                clasificacion.etiqueta
            )));
        }
        Ok(clasificacion)
    }
}

#[derive(Clone)]
pub struct ServicioPrediccion {
    almacen: Arc<dyn Almacen>,
    relaciones: Relaciones,
    blobs: AlmacenFicheros,
    clasificador: Arc<dyn Clasificador>,
}

impl ServicioPrediccion {
    pub fn new(
        almacen: Arc<dyn Almacen>,
        blobs: AlmacenFicheros,
        clasificador: Arc<dyn Clasificador>,
    ) -> Self {
        Self {
            relaciones: Relaciones::new(almacen.clone()),
            almacen,
            blobs,
            clasificador,
        }
    }

    /// Predice sobre la imagen más reciente del paciente.
    pub async fn predecir_paciente(&self, paciente_id: i64) -> Result<String> {
        if self.almacen.paciente(paciente_id).await?.is_none() {
            return Err(RegistroError::NoEncontrado(format!("Paciente {paciente_id}")));
        }
        let imagen = self
            .relaciones
            .ultima_imagen(paciente_id)
            .await?
            .ok_or_else(|| {
                RegistroError::NoEncontrado(format!(
                    "El paciente {paciente_id} no tiene imágenes"
                ))
            })?;
        self.predecir(imagen).await
    }

    pub async fn predecir_imagen(&self, imagen_id: i64) -> Result<String> {
        let imagen = self
            .almacen
            .imagen(imagen_id)
            .await?
            .ok_or_else(|| RegistroError::NoEncontrado(format!("Imagen {imagen_id}")))?;
        self.predecir(imagen).await
    }

    /// Clasifica y guarda el texto resultante en la imagen. Si el modelo
    /// falla, o la imagen se borra mientras tanto, no se escribe nada.
    async fn predecir(&self, imagen: FilaImagen) -> Result<String> {
        let bytes = self.blobs.leer(&imagen.fichero).await?;
        let clasificacion = self.clasificador.clasificar(&bytes).await.map_err(|e| {
            error!("Error clasificando la imagen {}: {}", imagen.id, e);
            e
        })?;
        let texto = formatear_prediccion(&clasificacion);
        info!("Predicción para la imagen {} ({}): {}", imagen.id, imagen.nombre, texto);

        if !self.almacen.fijar_prediccion(imagen.id, &texto).await? {
            return Err(RegistroError::NoEncontrado(format!(
                "La imagen {} se borró durante la predicción",
                imagen.id
            )));
        }
        Ok(texto)
    }
}
