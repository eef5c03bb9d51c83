//! Modelos de dominio: entidades expuestas en la API (JSON) y filas
//! almacenadas, que guardan las asociaciones como ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Médico. No depende de ninguna otra entidad.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Medico {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub dni: String,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub especialidad: String,
}

/// Paciente tal y como viaja por la API, con su médico ya resuelto.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paciente {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub dni: String,
    #[serde(default)]
    pub edad: i32,
    #[serde(default)]
    pub cita: Option<String>,
    #[serde(default)]
    pub medico: Option<Medico>,
}

/// Imagen diagnóstica subida para un paciente. Los bytes no viajan en el
/// JSON; se sirven aparte desde `/imagen/info/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Imagen {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub fecha: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prediccion: Option<String>,
    #[serde(default)]
    pub paciente: Option<Paciente>,
}

/// Informe asociado a una imagen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Informe {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub prediccion: Option<String>,
    #[serde(default)]
    pub contenido: String,
    #[serde(default)]
    pub imagen: Option<Imagen>,
}

/// Tipos de entidad que gestiona el almacén.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entidad {
    Medico,
    Paciente,
    Imagen,
    Informe,
}

impl Entidad {
    /// Etiqueta usada como nombre de tabla o de nodo.
    pub fn etiqueta(self) -> &'static str {
        match self {
            Self::Medico => "Medico",
            Self::Paciente => "Paciente",
            Self::Imagen => "Imagen",
            Self::Informe => "Informe",
        }
    }
}

// --- Filas del almacén: las relaciones se guardan como ids ---

#[derive(Debug, Clone, PartialEq)]
pub struct FilaPaciente {
    pub id: i64,
    pub nombre: String,
    pub dni: String,
    pub edad: i32,
    pub cita: Option<String>,
    pub medico_id: Option<i64>,
}

impl FilaPaciente {
    /// Construye la fila a partir del JSON recibido. Del médico anidado
    /// sólo interesa el id.
    pub fn desde(paciente: &Paciente) -> Self {
        Self {
            id: paciente.id,
            nombre: paciente.nombre.clone(),
            dni: paciente.dni.clone(),
            edad: paciente.edad,
            cita: paciente.cita.clone(),
            medico_id: paciente.medico.as_ref().map(|m| m.id),
        }
    }

    pub fn con_medico(self, medico: Option<Medico>) -> Paciente {
        Paciente {
            id: self.id,
            nombre: self.nombre,
            dni: self.dni,
            edad: self.edad,
            cita: self.cita,
            medico,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilaImagen {
    pub id: i64,
    pub nombre: String,
    pub fecha: DateTime<Utc>,
    pub prediccion: Option<String>,
    pub paciente_id: i64,
    /// Clave del fichero en el almacén de blobs.
    pub fichero: String,
}

impl FilaImagen {
    pub fn con_paciente(self, paciente: Option<Paciente>) -> Imagen {
        Imagen {
            id: self.id,
            nombre: self.nombre,
            fecha: Some(self.fecha),
            prediccion: self.prediccion,
            paciente,
        }
    }
}

/// Datos de una imagen todavía sin id; el almacén asigna el siguiente.
#[derive(Debug, Clone)]
pub struct NuevaImagen {
    pub nombre: String,
    pub fecha: DateTime<Utc>,
    pub paciente_id: i64,
    pub fichero: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilaInforme {
    pub id: i64,
    pub contenido: String,
    pub prediccion: Option<String>,
    pub imagen_id: i64,
}

impl FilaInforme {
    pub fn con_imagen(self, imagen: Option<Imagen>) -> Informe {
        Informe {
            id: self.id,
            prediccion: self.prediccion,
            contenido: self.contenido,
            imagen,
        }
    }
}
