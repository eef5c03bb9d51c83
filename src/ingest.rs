//! Ingesta de imágenes: guarda el fichero subido y lo asocia al paciente.

use std::sync::Arc;

use chrono::Utc;
use mime_guess::MimeGuess;
use tracing::info;

use crate::blobs::AlmacenFicheros;
use crate::error::{RegistroError, Result};
use crate::models::{FilaImagen, NuevaImagen};
use crate::store::Almacen;

/// Confirmación devuelta tras una subida correcta.
#[derive(Debug, Clone)]
pub struct Confirmacion {
    pub imagen: FilaImagen,
}

impl Confirmacion {
    /// Cuerpo JSON de la respuesta. Se compone a mano porque los clientes
    /// comparan el texto exacto, espacios alrededor de `:` incluidos.
    pub fn cuerpo_json(&self) -> String {
        let mensaje = format!("file uploaded successfully : {}", self.imagen.nombre);
        let mensaje = serde_json::to_string(&mensaje)
            .unwrap_or_else(|_| "\"file uploaded successfully\"".to_string());
        format!("{{\"response\" : {}}}", mensaje)
    }
}

#[derive(Clone)]
pub struct ServicioIngesta {
    almacen: Arc<dyn Almacen>,
    blobs: AlmacenFicheros,
}

impl ServicioIngesta {
    pub fn new(almacen: Arc<dyn Almacen>, blobs: AlmacenFicheros) -> Self {
        Self { almacen, blobs }
    }

    /// Guarda `bytes` con su nombre original y crea la imagen del paciente.
    pub async fn ingerir(
        &self,
        nombre: &str,
        bytes: &[u8],
        paciente_id: i64,
    ) -> Result<Confirmacion> {
        validar_fichero(nombre, bytes)?;
        if self.almacen.paciente(paciente_id).await?.is_none() {
            return Err(RegistroError::NoEncontrado(format!("Paciente {paciente_id}")));
        }

        let fichero = self.blobs.guardar(nombre, bytes).await?;
        let nueva = NuevaImagen {
            nombre: nombre.to_string(),
            fecha: Utc::now(),
            paciente_id,
            fichero: fichero.clone(),
        };
        let imagen = match self.almacen.insertar_imagen(nueva).await {
            Ok(imagen) => imagen,
            Err(e) => {
                self.blobs.borrar(&fichero).await;
                return Err(e);
            }
        };

        info!(
            "Imagen {} ('{}', {} bytes) subida para el paciente {}",
            imagen.id,
            imagen.nombre,
            bytes.len(),
            paciente_id
        );
        Ok(Confirmacion { imagen })
    }

    /// Bytes de una imagen junto con su tipo MIME.
    pub async fn contenido(&self, imagen_id: i64) -> Result<(Vec<u8>, String)> {
        let imagen = self
            .almacen
            .imagen(imagen_id)
            .await?
            .ok_or_else(|| RegistroError::NoEncontrado(format!("Imagen {imagen_id}")))?;
        let bytes = self.blobs.leer(&imagen.fichero).await?;
        let mime = MimeGuess::from_path(&imagen.nombre)
            .first_or_octet_stream()
            .to_string();
        Ok((bytes, mime))
    }

    /// Borra la imagen, sus informes y su fichero.
    pub async fn borrar(&self, imagen_id: i64) -> Result<()> {
        if let Some(imagen) = self.almacen.borrar_imagen(imagen_id).await? {
            self.blobs.borrar(&imagen.fichero).await;
            info!("Imagen {} borrada", imagen_id);
        }
        Ok(())
    }

    /// Limpia los ficheros de imágenes ya borradas del almacén.
    pub async fn limpiar_ficheros(&self, imagenes: &[FilaImagen]) {
        for imagen in imagenes {
            self.blobs.borrar(&imagen.fichero).await;
        }
    }
}

fn validar_fichero(nombre: &str, bytes: &[u8]) -> Result<()> {
    if nombre.trim().is_empty() {
        return Err(RegistroError::Validacion(
            "El fichero subido no tiene nombre".into(),
        ));
    }
    if bytes.is_empty() {
        return Err(RegistroError::Validacion(format!(
            "El fichero '{nombre}' está vacío"
        )));
    }
    if let Some(mime) = MimeGuess::from_path(nombre).first() {
        if mime.type_() != mime_guess::mime::IMAGE {
            return Err(RegistroError::Validacion(format!(
                "El fichero '{nombre}' no es una imagen ({mime})"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilaPaciente;
    use crate::store::AlmacenMemoria;

    async fn preparar() -> (ServicioIngesta, Arc<dyn Almacen>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let blobs = AlmacenFicheros::abrir(dir.path()).await.unwrap();
        let almacen: Arc<dyn Almacen> = Arc::new(AlmacenMemoria::new());
        almacen
            .guardar_paciente(FilaPaciente {
                id: 1,
                nombre: "Juan".into(),
                dni: "12345678A".into(),
                edad: 0,
                cita: None,
                medico_id: None,
            })
            .await
            .unwrap();
        (ServicioIngesta::new(almacen.clone(), blobs), almacen, dir)
    }

    #[tokio::test]
    async fn upload_confirmation_matches_wire_format() {
        let (ingesta, almacen, _dir) = preparar().await;
        let confirmacion = ingesta.ingerir("healthy.png", b"\x89PNG", 1).await.unwrap();

        assert_eq!(
            confirmacion.cuerpo_json(),
            r#"{"response" : "file uploaded successfully : healthy.png"}"#
        );
        let imagen = almacen.imagen(confirmacion.imagen.id).await.unwrap().unwrap();
        assert_eq!(imagen.nombre, "healthy.png");
        assert_eq!(imagen.paciente_id, 1);
    }

    #[tokio::test]
    async fn stored_bytes_are_served_with_mime_type() {
        let (ingesta, _almacen, _dir) = preparar().await;
        let id = ingesta.ingerir("scan.png", b"abc", 1).await.unwrap().imagen.id;
        let (bytes, mime) = ingesta.contenido(id).await.unwrap();
        assert_eq!(bytes, b"abc");
        assert_eq!(mime, "image/png");
    }

    #[tokio::test]
    async fn unknown_patient_is_not_found_and_nothing_is_stored() {
        let (ingesta, almacen, _dir) = preparar().await;
        let err = ingesta.ingerir("healthy.png", b"x", 42).await.unwrap_err();
        assert!(matches!(err, RegistroError::NoEncontrado(_)));
        assert!(almacen.imagenes_de_paciente(42).await.unwrap().is_empty());
    }

    #[test]
    fn rejects_empty_or_non_image_files() {
        assert!(validar_fichero("", b"x").is_err());
        assert!(validar_fichero("a.png", b"").is_err());
        assert!(validar_fichero("notas.pdf", b"x").is_err());
        assert!(validar_fichero("sin_extension", b"x").is_ok());
        assert!(validar_fichero("no_healthty.png", b"x").is_ok());
    }

    #[test]
    fn confirmation_escapes_quotes_in_names() {
        let confirmacion = Confirmacion {
            imagen: FilaImagen {
                id: 1,
                nombre: "a\"b.png".into(),
                fecha: Utc::now(),
                prediccion: None,
                paciente_id: 1,
                fichero: "k".into(),
            },
        };
        let cuerpo = confirmacion.cuerpo_json();
        let json: serde_json::Value = serde_json::from_str(&cuerpo).unwrap();
        assert_eq!(json["response"], "file uploaded successfully : a\"b.png");
    }
}
