//! Servicio de informes.

use std::sync::Arc;

use tracing::info;

use crate::error::{RegistroError, Result};
use crate::models::{FilaInforme, Informe};
use crate::prediccion::ServicioPrediccion;
use crate::relaciones::Relaciones;
use crate::store::Almacen;

#[derive(Clone)]
pub struct ServicioInformes {
    almacen: Arc<dyn Almacen>,
    relaciones: Relaciones,
    prediccion: ServicioPrediccion,
}

impl ServicioInformes {
    pub fn new(almacen: Arc<dyn Almacen>, prediccion: ServicioPrediccion) -> Self {
        Self {
            relaciones: Relaciones::new(almacen.clone()),
            almacen,
            prediccion,
        }
    }

    /// Crea (o sobrescribe) un informe. Sin predicción explícita se copia la
    /// de la imagen, y si la imagen aún no tiene se calcula en el momento.
    /// Si la imagen desaparece entretanto no se guarda nada.
    pub async fn crear(&self, informe: Informe) -> Result<Informe> {
        let imagen_id = informe
            .imagen
            .as_ref()
            .map(|img| img.id)
            .ok_or_else(|| RegistroError::Validacion("El informe debe referenciar una imagen".into()))?;
        let imagen = self
            .almacen
            .imagen(imagen_id)
            .await?
            .ok_or_else(|| RegistroError::NoEncontrado(format!("Imagen {imagen_id}")))?;

        let prediccion = match informe.prediccion.filter(|p| !p.trim().is_empty()) {
            Some(p) => p,
            None => match imagen.prediccion {
                Some(p) => p,
                None => self.prediccion.predecir_imagen(imagen_id).await?,
            },
        };

        let id = self
            .almacen
            .guardar_informe(FilaInforme {
                id: informe.id,
                contenido: informe.contenido,
                prediccion: Some(prediccion),
                imagen_id,
            })
            .await?
            .id;
        info!("Informe {} guardado para la imagen {}", id, imagen_id);

        self.relaciones
            .informe(id)
            .await?
            .ok_or_else(|| RegistroError::Interno(format!("Informe {id} no persistido")))
    }

    /// `None` si no existe: la ausencia no es un error.
    pub async fn informe(&self, id: i64) -> Result<Option<Informe>> {
        self.relaciones.informe(id).await
    }

    pub async fn informes_de_imagen(&self, imagen_id: i64) -> Result<Vec<Informe>> {
        self.relaciones.informes_de_imagen(imagen_id).await
    }

    /// Borra el informe; la imagen se conserva.
    pub async fn borrar(&self, id: i64) -> Result<()> {
        if self.almacen.borrar_informe(id).await? {
            info!("Informe {} borrado", id);
        }
        Ok(())
    }
}
