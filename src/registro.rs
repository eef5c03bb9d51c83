//! Alta, modificación y baja de médicos y pacientes.

use std::sync::Arc;

use tracing::info;

use crate::error::{RegistroError, Result};
use crate::ingest::ServicioIngesta;
use crate::models::{FilaPaciente, Medico, Paciente};
use crate::relaciones::Relaciones;
use crate::store::Almacen;

#[derive(Clone)]
pub struct Registro {
    almacen: Arc<dyn Almacen>,
    relaciones: Relaciones,
    ingesta: ServicioIngesta,
}

impl Registro {
    pub fn new(almacen: Arc<dyn Almacen>, ingesta: ServicioIngesta) -> Self {
        Self {
            relaciones: Relaciones::new(almacen.clone()),
            almacen,
            ingesta,
        }
    }

    // --- Médicos ---

    /// Guarda el médico (alta o modificación; el id decide). El almacén
    /// rechaza un dni que ya tenga otro médico.
    pub async fn guardar_medico(&self, medico: Medico) -> Result<Medico> {
        if medico.dni.trim().is_empty() {
            return Err(RegistroError::Validacion("El médico necesita un dni".into()));
        }
        if medico.nombre.trim().is_empty() {
            return Err(RegistroError::Validacion("El médico necesita un nombre".into()));
        }
        let medico = self.almacen.guardar_medico(medico).await?;
        info!("Médico {} guardado", medico.id);
        Ok(medico)
    }

    pub async fn medico(&self, id: i64) -> Result<Option<Medico>> {
        self.almacen.medico(id).await
    }

    pub async fn medico_por_dni(&self, dni: &str) -> Result<Option<Medico>> {
        self.almacen.medico_por_dni(dni).await
    }

    pub async fn borrar_medico(&self, id: i64) -> Result<()> {
        if self.almacen.borrar_medico(id).await? {
            info!("Médico {} borrado; sus pacientes quedan sin médico", id);
        }
        Ok(())
    }

    // --- Pacientes ---

    /// Guarda el paciente. Del médico anidado sólo se usa el id, que debe
    /// existir; sus demás campos se ignoran.
    pub async fn guardar_paciente(&self, paciente: Paciente) -> Result<Paciente> {
        if paciente.nombre.trim().is_empty() {
            return Err(RegistroError::Validacion("El paciente necesita un nombre".into()));
        }
        let id = self
            .almacen
            .guardar_paciente(FilaPaciente::desde(&paciente))
            .await?
            .id;
        info!("Paciente {} guardado", id);

        self.relaciones
            .paciente(id)
            .await?
            .ok_or_else(|| RegistroError::Interno(format!("Paciente {id} no persistido")))
    }

    pub async fn paciente(&self, id: i64) -> Result<Option<Paciente>> {
        self.relaciones.paciente(id).await
    }

    pub async fn pacientes_de_medico(&self, medico_id: i64) -> Result<Vec<Paciente>> {
        self.relaciones.pacientes_de_medico(medico_id).await
    }

    /// Borra el paciente con sus imágenes, informes y ficheros.
    pub async fn borrar_paciente(&self, id: i64) -> Result<()> {
        let imagenes = self.almacen.borrar_paciente(id).await?;
        self.ingesta.limpiar_ficheros(&imagenes).await;
        info!("Paciente {} borrado ({} imágenes)", id, imagenes.len());
        Ok(())
    }
}
