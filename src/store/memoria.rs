//! Almacén en memoria, el que se usa por defecto y en los tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Almacen;
use crate::error::{RegistroError, Result};
use crate::models::{FilaImagen, FilaInforme, FilaPaciente, Medico, NuevaImagen};

trait ConId {
    fn id(&self) -> i64;
}

impl ConId for Medico {
    fn id(&self) -> i64 {
        self.id
    }
}

impl ConId for FilaPaciente {
    fn id(&self) -> i64 {
        self.id
    }
}

impl ConId for FilaImagen {
    fn id(&self) -> i64 {
        self.id
    }
}

impl ConId for FilaInforme {
    fn id(&self) -> i64 {
        self.id
    }
}

/// Tabla indexada por id.
struct Tabla<T> {
    filas: BTreeMap<i64, T>,
}

impl<T: ConId + Clone> Tabla<T> {
    fn new() -> Self {
        Self {
            filas: BTreeMap::new(),
        }
    }

    fn put(&mut self, fila: T) {
        self.filas.insert(fila.id(), fila);
    }

    fn get(&self, id: i64) -> Option<T> {
        self.filas.get(&id).cloned()
    }

    fn delete(&mut self, id: i64) -> Option<T> {
        self.filas.remove(&id)
    }

    fn filtrar(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.filas.values().filter(|f| pred(f)).cloned().collect()
    }

    fn siguiente_id(&self) -> i64 {
        self.filas.keys().next_back().map_or(1, |max| max + 1)
    }

    /// El id dado, o el siguiente libre si es 0.
    fn asignar_id(&self, id: i64) -> i64 {
        match id {
            0 => self.siguiente_id(),
            id => id,
        }
    }
}

struct Tablas {
    medicos: Tabla<Medico>,
    pacientes: Tabla<FilaPaciente>,
    imagenes: Tabla<FilaImagen>,
    informes: Tabla<FilaInforme>,
}

impl Tablas {
    fn borrar_imagen_en_cascada(&mut self, id: i64) -> Option<FilaImagen> {
        let imagen = self.imagenes.delete(id)?;
        self.informes.filas.retain(|_, inf| inf.imagen_id != id);
        Some(imagen)
    }
}

pub struct AlmacenMemoria {
    tablas: RwLock<Tablas>,
}

impl AlmacenMemoria {
    pub fn new() -> Self {
        Self {
            tablas: RwLock::new(Tablas {
                medicos: Tabla::new(),
                pacientes: Tabla::new(),
                imagenes: Tabla::new(),
                informes: Tabla::new(),
            }),
        }
    }
}

impl Default for AlmacenMemoria {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Almacen for AlmacenMemoria {
    async fn guardar_medico(&self, mut medico: Medico) -> Result<Medico> {
        let mut t = self.tablas.write().await;
        medico.id = t.medicos.asignar_id(medico.id);
        if let Some(otro) = t
            .medicos
            .filtrar(|m| m.dni == medico.dni && m.id != medico.id)
            .first()
        {
            return Err(RegistroError::Conflicto(format!(
                "El dni {} ya pertenece al médico {}",
                medico.dni, otro.id
            )));
        }
        t.medicos.put(medico.clone());
        Ok(medico)
    }

    async fn medico(&self, id: i64) -> Result<Option<Medico>> {
        Ok(self.tablas.read().await.medicos.get(id))
    }

    async fn medico_por_dni(&self, dni: &str) -> Result<Option<Medico>> {
        let t = self.tablas.read().await;
        Ok(t.medicos.filtrar(|m| m.dni == dni).into_iter().next())
    }

    async fn borrar_medico(&self, id: i64) -> Result<bool> {
        let mut t = self.tablas.write().await;
        if t.medicos.delete(id).is_none() {
            return Ok(false);
        }
        for paciente in t.pacientes.filas.values_mut() {
            if paciente.medico_id == Some(id) {
                paciente.medico_id = None;
            }
        }
        Ok(true)
    }

    async fn guardar_paciente(&self, mut paciente: FilaPaciente) -> Result<FilaPaciente> {
        let mut t = self.tablas.write().await;
        if let Some(medico_id) = paciente.medico_id {
            if t.medicos.get(medico_id).is_none() {
                return Err(RegistroError::NoEncontrado(format!("Médico {medico_id}")));
            }
        }
        paciente.id = t.pacientes.asignar_id(paciente.id);
        t.pacientes.put(paciente.clone());
        Ok(paciente)
    }

    async fn paciente(&self, id: i64) -> Result<Option<FilaPaciente>> {
        Ok(self.tablas.read().await.pacientes.get(id))
    }

    async fn pacientes_de_medico(&self, medico_id: i64) -> Result<Vec<FilaPaciente>> {
        let t = self.tablas.read().await;
        Ok(t.pacientes.filtrar(|p| p.medico_id == Some(medico_id)))
    }

    async fn borrar_paciente(&self, id: i64) -> Result<Vec<FilaImagen>> {
        let mut t = self.tablas.write().await;
        if t.pacientes.delete(id).is_none() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = t
            .imagenes
            .filtrar(|img| img.paciente_id == id)
            .iter()
            .map(|img| img.id)
            .collect();
        Ok(ids
            .into_iter()
            .filter_map(|img_id| t.borrar_imagen_en_cascada(img_id))
            .collect())
    }

    async fn insertar_imagen(&self, nueva: NuevaImagen) -> Result<FilaImagen> {
        let mut t = self.tablas.write().await;
        let fila = FilaImagen {
            id: t.imagenes.siguiente_id(),
            nombre: nueva.nombre,
            fecha: nueva.fecha,
            prediccion: None,
            paciente_id: nueva.paciente_id,
            fichero: nueva.fichero,
        };
        t.imagenes.put(fila.clone());
        Ok(fila)
    }

    async fn fijar_prediccion(&self, imagen_id: i64, prediccion: &str) -> Result<bool> {
        let mut t = self.tablas.write().await;
        Ok(match t.imagenes.filas.get_mut(&imagen_id) {
            Some(imagen) => {
                imagen.prediccion = Some(prediccion.to_string());
                true
            }
            None => false,
        })
    }

    async fn imagen(&self, id: i64) -> Result<Option<FilaImagen>> {
        Ok(self.tablas.read().await.imagenes.get(id))
    }

    async fn imagenes_de_paciente(&self, paciente_id: i64) -> Result<Vec<FilaImagen>> {
        let t = self.tablas.read().await;
        Ok(t.imagenes.filtrar(|img| img.paciente_id == paciente_id))
    }

    async fn borrar_imagen(&self, id: i64) -> Result<Option<FilaImagen>> {
        Ok(self.tablas.write().await.borrar_imagen_en_cascada(id))
    }

    async fn guardar_informe(&self, mut informe: FilaInforme) -> Result<FilaInforme> {
        let mut t = self.tablas.write().await;
        if t.imagenes.get(informe.imagen_id).is_none() {
            return Err(RegistroError::NoEncontrado(format!("Imagen {}", informe.imagen_id)));
        }
        informe.id = t.informes.asignar_id(informe.id);
        t.informes.put(informe.clone());
        Ok(informe)
    }

    async fn informe(&self, id: i64) -> Result<Option<FilaInforme>> {
        Ok(self.tablas.read().await.informes.get(id))
    }

    async fn informes_de_imagen(&self, imagen_id: i64) -> Result<Vec<FilaInforme>> {
        let t = self.tablas.read().await;
        Ok(t.informes.filtrar(|inf| inf.imagen_id == imagen_id))
    }

    async fn borrar_informe(&self, id: i64) -> Result<bool> {
        Ok(self.tablas.write().await.informes.delete(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn medico(id: i64, dni: &str) -> Medico {
        Medico {
            id,
            dni: dni.into(),
            nombre: format!("Medico{id}"),
            especialidad: "Especialidad1".into(),
        }
    }

    fn paciente(id: i64, medico_id: Option<i64>) -> FilaPaciente {
        FilaPaciente {
            id,
            nombre: format!("Paciente{id}"),
            dni: "12345678A".into(),
            edad: 40,
            cita: None,
            medico_id,
        }
    }

    fn nueva_imagen(paciente_id: i64) -> NuevaImagen {
        NuevaImagen {
            nombre: "healthy.png".into(),
            fecha: Utc::now(),
            paciente_id,
            fichero: "clave".into(),
        }
    }

    #[tokio::test]
    async fn put_overwrites_and_delete_yields_absence() {
        let almacen = AlmacenMemoria::new();
        almacen.guardar_medico(medico(1, "A")).await.unwrap();
        let mut cambiado = medico(1, "A");
        cambiado.nombre = "Medico2".into();
        almacen.guardar_medico(cambiado.clone()).await.unwrap();
        assert_eq!(almacen.medico(1).await.unwrap(), Some(cambiado));

        assert!(almacen.borrar_medico(1).await.unwrap());
        assert_eq!(almacen.medico(1).await.unwrap(), None);
        assert!(!almacen.borrar_medico(1).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_medico_detaches_its_patients() {
        let almacen = AlmacenMemoria::new();
        almacen.guardar_medico(medico(1, "A")).await.unwrap();
        almacen.guardar_paciente(paciente(1, Some(1))).await.unwrap();
        almacen.borrar_medico(1).await.unwrap();

        assert_eq!(almacen.paciente(1).await.unwrap().unwrap().medico_id, None);
        assert!(almacen.pacientes_de_medico(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn image_ids_are_sequential_from_one() {
        let almacen = AlmacenMemoria::new();
        let a = almacen.insertar_imagen(nueva_imagen(1)).await.unwrap();
        let b = almacen.insertar_imagen(nueva_imagen(1)).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        let informe = almacen
            .guardar_informe(FilaInforme {
                id: 0,
                contenido: "c".into(),
                prediccion: None,
                imagen_id: b.id,
            })
            .await
            .unwrap();
        assert_eq!(informe.id, 1);
    }

    #[tokio::test]
    async fn concurrent_creates_get_distinct_ids() {
        let almacen = Arc::new(AlmacenMemoria::new());
        let tareas: Vec<_> = (0..50)
            .map(|i| {
                let almacen = almacen.clone();
                tokio::spawn(async move {
                    let medico = almacen.guardar_medico(medico(0, &format!("dni{i}"))).await.unwrap();
                    let paciente = almacen.guardar_paciente(paciente(0, None)).await.unwrap();
                    (medico.id, paciente.id)
                })
            })
            .collect();

        let mut medicos = BTreeSet::new();
        let mut pacientes = BTreeSet::new();
        for tarea in tareas {
            let (m, p) = tarea.await.unwrap();
            medicos.insert(m);
            pacientes.insert(p);
        }
        assert_eq!(medicos, (1..=50).collect());
        assert_eq!(pacientes, (1..=50).collect());
    }

    #[tokio::test]
    async fn dni_is_checked_in_the_same_write() {
        let almacen = Arc::new(AlmacenMemoria::new());
        let tareas: Vec<_> = (0..20)
            .map(|_| {
                let almacen = almacen.clone();
                tokio::spawn(async move { almacen.guardar_medico(medico(0, "A")).await })
            })
            .collect();
        let mut aceptados = 0;
        for tarea in tareas {
            match tarea.await.unwrap() {
                Ok(_) => aceptados += 1,
                Err(e) => assert!(matches!(e, RegistroError::Conflicto(_))),
            }
        }
        assert_eq!(aceptados, 1);

        // El propio médico puede volver a guardarse con su dni.
        assert!(almacen.guardar_medico(medico(1, "A")).await.is_ok());
        assert!(matches!(
            almacen.guardar_medico(medico(2, "A")).await,
            Err(RegistroError::Conflicto(_))
        ));
    }

    #[tokio::test]
    async fn writes_against_missing_rows_are_rejected() {
        let almacen = AlmacenMemoria::new();
        assert!(matches!(
            almacen.guardar_paciente(paciente(1, Some(9))).await,
            Err(RegistroError::NoEncontrado(_))
        ));
        assert!(!almacen.fijar_prediccion(9, "p").await.unwrap());
        assert!(matches!(
            almacen
                .guardar_informe(FilaInforme {
                    id: 1,
                    contenido: "c".into(),
                    prediccion: None,
                    imagen_id: 9,
                })
                .await,
            Err(RegistroError::NoEncontrado(_))
        ));
        assert_eq!(almacen.paciente(1).await.unwrap(), None);
        assert_eq!(almacen.imagen(9).await.unwrap(), None);
        assert_eq!(almacen.informe(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn prediction_does_not_revive_deleted_image() {
        let almacen = AlmacenMemoria::new();
        almacen.guardar_paciente(paciente(1, None)).await.unwrap();
        let img = almacen.insertar_imagen(nueva_imagen(1)).await.unwrap();
        assert!(almacen.fijar_prediccion(img.id, "p").await.unwrap());
        assert_eq!(
            almacen.imagen(img.id).await.unwrap().unwrap().prediccion.as_deref(),
            Some("p")
        );

        almacen.borrar_paciente(1).await.unwrap();
        assert!(!almacen.fijar_prediccion(img.id, "q").await.unwrap());
        assert_eq!(almacen.imagen(img.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn deleting_patient_cascades_to_images_and_reports() {
        let almacen = AlmacenMemoria::new();
        almacen.guardar_paciente(paciente(1, None)).await.unwrap();
        almacen.guardar_paciente(paciente(2, None)).await.unwrap();
        let img = almacen.insertar_imagen(nueva_imagen(1)).await.unwrap();
        let otra = almacen.insertar_imagen(nueva_imagen(2)).await.unwrap();
        almacen
            .guardar_informe(FilaInforme {
                id: 1,
                contenido: "informe1".into(),
                prediccion: None,
                imagen_id: img.id,
            })
            .await
            .unwrap();

        let borradas = almacen.borrar_paciente(1).await.unwrap();
        assert_eq!(borradas, vec![img]);
        assert_eq!(almacen.informe(1).await.unwrap(), None);
        assert_eq!(almacen.imagen(otra.id).await.unwrap(), Some(otra));
    }

    #[tokio::test]
    async fn deleting_report_keeps_its_image() {
        let almacen = AlmacenMemoria::new();
        let img = almacen.insertar_imagen(nueva_imagen(1)).await.unwrap();
        almacen
            .guardar_informe(FilaInforme {
                id: 5,
                contenido: "c".into(),
                prediccion: None,
                imagen_id: img.id,
            })
            .await
            .unwrap();
        assert!(almacen.borrar_informe(5).await.unwrap());
        assert_eq!(almacen.informe(5).await.unwrap(), None);
        assert!(almacen.imagen(img.id).await.unwrap().is_some());
    }
}
