//! Almacenamiento en disco del contenido de las imágenes subidas.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;
use uuid::Uuid;

use crate::error::{RegistroError, Result};

/// Directorio plano donde cada fichero se guarda como `<uuid>_<nombre>`.
#[derive(Debug, Clone)]
pub struct AlmacenFicheros {
    raiz: PathBuf,
}

impl AlmacenFicheros {
    pub async fn abrir(raiz: impl Into<PathBuf>) -> Result<Self> {
        let raiz = raiz.into();
        fs::create_dir_all(&raiz).await?;
        Ok(Self { raiz })
    }

    /// Escribe los bytes y devuelve la clave con la que recuperarlos.
    pub async fn guardar(&self, nombre_original: &str, bytes: &[u8]) -> Result<String> {
        // Sólo el último componente, para que el nombre no pueda salir del directorio.
        let base = Path::new(nombre_original)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "imagen".to_string());
        let clave = format!("{}_{}", Uuid::new_v4(), base);
        fs::write(self.raiz.join(&clave), bytes).await?;
        Ok(clave)
    }

    pub async fn leer(&self, clave: &str) -> Result<Vec<u8>> {
        let ruta = self.ruta(clave)?;
        match fs::read(&ruta).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                RegistroError::NoEncontrado(format!("Fichero de imagen '{clave}'")),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Borra el fichero; un fallo sólo se registra.
    pub async fn borrar(&self, clave: &str) {
        let resultado = match self.ruta(clave) {
            Ok(ruta) => fs::remove_file(ruta).await.map_err(RegistroError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = resultado {
            warn!("No se pudo borrar el fichero de imagen '{}': {}", clave, e);
        }
    }

    fn ruta(&self, clave: &str) -> Result<PathBuf> {
        if clave.is_empty() || clave.contains(['/', '\\']) || clave == ".." {
            return Err(RegistroError::Almacen(format!(
                "Clave de fichero inválida: '{clave}'"
            )));
        }
        Ok(self.raiz.join(clave))
    }
}
