//! Almacén de registros. Cada tipo de entidad se guarda por id y las
//! asociaciones se guardan como ids, nunca como copias.

mod memoria;
mod neo4j;

pub use memoria::AlmacenMemoria;
pub use neo4j::AlmacenNeo4j;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FilaImagen, FilaInforme, FilaPaciente, Medico, NuevaImagen};

/// Operaciones de persistencia. `guardar_*` sobrescribe si el id existe y
/// asigna el siguiente id libre (máximo + 1, empezando en 1) si llega a 0;
/// la asignación y las comprobaciones se hacen en la misma escritura.
/// Leer algo borrado devuelve `None`, nunca un error.
#[async_trait]
pub trait Almacen: Send + Sync {
    /// `Conflicto` si el dni ya pertenece a otro médico.
    async fn guardar_medico(&self, medico: Medico) -> Result<Medico>;
    async fn medico(&self, id: i64) -> Result<Option<Medico>>;
    async fn medico_por_dni(&self, dni: &str) -> Result<Option<Medico>>;
    /// Borra el médico y desvincula a sus pacientes.
    async fn borrar_medico(&self, id: i64) -> Result<bool>;

    /// `NoEncontrado` si el médico referenciado no existe.
    async fn guardar_paciente(&self, paciente: FilaPaciente) -> Result<FilaPaciente>;
    async fn paciente(&self, id: i64) -> Result<Option<FilaPaciente>>;
    async fn pacientes_de_medico(&self, medico_id: i64) -> Result<Vec<FilaPaciente>>;
    /// Borra el paciente junto con sus imágenes e informes. Devuelve las
    /// imágenes eliminadas para poder limpiar sus ficheros.
    async fn borrar_paciente(&self, id: i64) -> Result<Vec<FilaImagen>>;

    /// Inserta una imagen asignándole el siguiente id de forma atómica.
    async fn insertar_imagen(&self, nueva: NuevaImagen) -> Result<FilaImagen>;
    /// Fija la predicción de una imagen existente. `false` si ya no existe.
    async fn fijar_prediccion(&self, imagen_id: i64, prediccion: &str) -> Result<bool>;
    async fn imagen(&self, id: i64) -> Result<Option<FilaImagen>>;
    async fn imagenes_de_paciente(&self, paciente_id: i64) -> Result<Vec<FilaImagen>>;
    /// Borra la imagen y sus informes.
    async fn borrar_imagen(&self, id: i64) -> Result<Option<FilaImagen>>;

    /// `NoEncontrado` si la imagen referenciada no existe.
    async fn guardar_informe(&self, informe: FilaInforme) -> Result<FilaInforme>;
    async fn informe(&self, id: i64) -> Result<Option<FilaInforme>>;
    async fn informes_de_imagen(&self, imagen_id: i64) -> Result<Vec<FilaInforme>>;
    async fn borrar_informe(&self, id: i64) -> Result<bool>;
}
