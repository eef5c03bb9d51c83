//! Resolución de asociaciones en tiempo de lectura.
//!
//! Las filas sólo guardan ids; aquí se unen con el registro vivo del que
//! dependen, así que editar un médico se ve inmediatamente desde todos sus
//! pacientes sin volver a guardarlos. Una clave colgante se resuelve a `None`.

use std::sync::Arc;

use crate::error::Result;
use crate::models::{FilaImagen, FilaInforme, FilaPaciente, Imagen, Informe, Paciente};
use crate::store::Almacen;

#[derive(Clone)]
pub struct Relaciones {
    almacen: Arc<dyn Almacen>,
}

impl Relaciones {
    pub fn new(almacen: Arc<dyn Almacen>) -> Self {
        Self { almacen }
    }

    async fn unir_paciente(&self, fila: FilaPaciente) -> Result<Paciente> {
        let medico = match fila.medico_id {
            Some(id) => self.almacen.medico(id).await?,
            None => None,
        };
        Ok(fila.con_medico(medico))
    }

    async fn unir_imagen(&self, fila: FilaImagen) -> Result<Imagen> {
        let paciente = self.paciente(fila.paciente_id).await?;
        Ok(fila.con_paciente(paciente))
    }

    async fn unir_informe(&self, fila: FilaInforme) -> Result<Informe> {
        let imagen = self.imagen(fila.imagen_id).await?;
        Ok(fila.con_imagen(imagen))
    }

    pub async fn paciente(&self, id: i64) -> Result<Option<Paciente>> {
        match self.almacen.paciente(id).await? {
            Some(fila) => Ok(Some(self.unir_paciente(fila).await?)),
            None => Ok(None),
        }
    }

    pub async fn pacientes_de_medico(&self, medico_id: i64) -> Result<Vec<Paciente>> {
        let mut pacientes = Vec::new();
        for fila in self.almacen.pacientes_de_medico(medico_id).await? {
            pacientes.push(self.unir_paciente(fila).await?);
        }
        Ok(pacientes)
    }

    pub async fn imagen(&self, id: i64) -> Result<Option<Imagen>> {
        match self.almacen.imagen(id).await? {
            Some(fila) => Ok(Some(self.unir_imagen(fila).await?)),
            None => Ok(None),
        }
    }

    pub async fn imagenes_de_paciente(&self, paciente_id: i64) -> Result<Vec<Imagen>> {
        let mut imagenes = Vec::new();
        for fila in self.almacen.imagenes_de_paciente(paciente_id).await? {
            imagenes.push(self.unir_imagen(fila).await?);
        }
        Ok(imagenes)
    }

    /// Imagen más reciente del paciente: mayor fecha y, a igualdad, mayor id.
    pub async fn ultima_imagen(&self, paciente_id: i64) -> Result<Option<FilaImagen>> {
        Ok(self
            .almacen
            .imagenes_de_paciente(paciente_id)
            .await?
            .into_iter()
            .max_by_key(|img| (img.fecha, img.id)))
    }

    pub async fn informe(&self, id: i64) -> Result<Option<Informe>> {
        match self.almacen.informe(id).await? {
            Some(fila) => Ok(Some(self.unir_informe(fila).await?)),
            None => Ok(None),
        }
    }

    pub async fn informes_de_imagen(&self, imagen_id: i64) -> Result<Vec<Informe>> {
        let mut informes = Vec::new();
        for fila in self.almacen.informes_de_imagen(imagen_id).await? {
            informes.push(self.unir_informe(fila).await?);
        }
        Ok(informes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Medico, NuevaImagen};
    use crate::store::AlmacenMemoria;
    use chrono::{Duration, Utc};

    fn medico(nombre: &str) -> Medico {
        Medico {
            id: 1,
            dni: "12345678A".into(),
            nombre: nombre.into(),
            especialidad: "Especialidad1".into(),
        }
    }

    fn fila_paciente(id: i64) -> FilaPaciente {
        FilaPaciente {
            id,
            nombre: format!("Paciente{id}"),
            dni: "12345678A".into(),
            edad: 0,
            cita: None,
            medico_id: Some(1),
        }
    }

    #[tokio::test]
    async fn medico_edits_are_visible_through_patients() {
        let almacen: Arc<dyn Almacen> = Arc::new(AlmacenMemoria::new());
        let relaciones = Relaciones::new(almacen.clone());
        almacen.guardar_medico(medico("Medico1")).await.unwrap();
        almacen.guardar_paciente(fila_paciente(1)).await.unwrap();
        almacen.guardar_paciente(fila_paciente(2)).await.unwrap();

        almacen.guardar_medico(medico("Medico2")).await.unwrap();

        let paciente = relaciones.paciente(1).await.unwrap().unwrap();
        assert_eq!(paciente.medico.unwrap().nombre, "Medico2");
        let lista = relaciones.pacientes_de_medico(1).await.unwrap();
        assert_eq!(lista.len(), 2);
        assert!(lista
            .iter()
            .all(|p| p.medico.as_ref().unwrap().nombre == "Medico2"));
    }

    #[tokio::test]
    async fn report_resolves_full_chain() {
        let almacen: Arc<dyn Almacen> = Arc::new(AlmacenMemoria::new());
        let relaciones = Relaciones::new(almacen.clone());
        almacen.guardar_medico(medico("Medico1")).await.unwrap();
        almacen.guardar_paciente(fila_paciente(1)).await.unwrap();
        let img = almacen
            .insertar_imagen(NuevaImagen {
                nombre: "healthy.png".into(),
                fecha: Utc::now(),
                paciente_id: 1,
                fichero: "k".into(),
            })
            .await
            .unwrap();
        almacen
            .guardar_informe(FilaInforme {
                id: 1,
                contenido: "informe1".into(),
                prediccion: None,
                imagen_id: img.id,
            })
            .await
            .unwrap();

        let informe = relaciones.informe(1).await.unwrap().unwrap();
        let imagen = informe.imagen.unwrap();
        assert_eq!(imagen.nombre, "healthy.png");
        let paciente = imagen.paciente.unwrap();
        assert_eq!(paciente.id, 1);
        assert_eq!(paciente.medico.unwrap().nombre, "Medico1");
    }

    #[tokio::test]
    async fn latest_image_prefers_newest_date_then_highest_id() {
        let almacen: Arc<dyn Almacen> = Arc::new(AlmacenMemoria::new());
        let relaciones = Relaciones::new(almacen.clone());
        let ahora = Utc::now();
        for (nombre, fecha) in [
            ("a.png", ahora),
            ("b.png", ahora - Duration::seconds(10)),
            ("c.png", ahora),
        ] {
            almacen
                .insertar_imagen(NuevaImagen {
                    nombre: nombre.into(),
                    fecha,
                    paciente_id: 1,
                    fichero: "k".into(),
                })
                .await
                .unwrap();
        }
        let ultima = relaciones.ultima_imagen(1).await.unwrap().unwrap();
        assert_eq!(ultima.nombre, "c.png");
        assert!(relaciones.ultima_imagen(2).await.unwrap().is_none());
    }
}
