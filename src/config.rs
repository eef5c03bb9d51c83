//! Carga y gestión de configuración de la aplicación (almacén, subidas y
//! servicio de predicción).

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum AlmacenBackend {
    Memoria,
    Neo4j,
}

impl AlmacenBackend {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memoria" | "memory" => Ok(Self::Memoria),
            "neo4j" => Ok(Self::Neo4j),
            other => Err(anyhow!("Almacén no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    pub almacen: AlmacenBackend,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,

    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,

    pub predictor_url: String,
    pub predictor_timeout_secs: u64,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|clave| env::var(clave).ok())
    }

    /// Igual que [`AppConfig::from_env`] pero leyendo de `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |clave: &str, defecto: &str| lookup(clave).unwrap_or_else(|| defecto.to_string());

        let server_addr = var("SERVER_ADDR", "127.0.0.1:8080");

        let almacen = AlmacenBackend::from_str(&var("ALMACEN", "memoria"))?;
        let neo4j_uri = var("NEO4J_URI", "bolt://localhost:7687");
        let neo4j_user = var("NEO4J_USER", "neo4j");
        let neo4j_password = var("NEO4J_PASSWORD", "");
        if almacen == AlmacenBackend::Neo4j && neo4j_password.is_empty() {
            return Err(anyhow!("Falta NEO4J_PASSWORD en el entorno"));
        }

        let upload_dir = PathBuf::from(var("UPLOAD_DIR", "uploads"));
        let max_upload_bytes = var("MAX_UPLOAD_BYTES", "10485760")
            .parse::<usize>()
            .context("MAX_UPLOAD_BYTES debe ser un número de bytes")?;

        let predictor_url = var("PREDICTOR_URL", "http://127.0.0.1:8000/predict");
        let predictor_timeout_secs = var("PREDICTOR_TIMEOUT_SECS", "100")
            .parse::<u64>()
            .context("PREDICTOR_TIMEOUT_SECS debe ser un número de segundos")?;

        Ok(Self {
            server_addr,
            almacen,
            neo4j_uri,
            neo4j_user,
            neo4j_password,
            upload_dir,
            max_upload_bytes,
            predictor_url,
            predictor_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cargar(pares: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pares
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|clave| vars.get(clave).cloned())
    }

    #[test]
    fn defaults_use_memory_store() {
        let cfg = cargar(&[]).unwrap();
        assert_eq!(cfg.almacen, AlmacenBackend::Memoria);
        assert_eq!(cfg.server_addr, "127.0.0.1:8080");
        assert_eq!(cfg.upload_dir, PathBuf::from("uploads"));
        assert_eq!(cfg.predictor_timeout_secs, 100);
    }

    #[test]
    fn neo4j_requires_password() {
        assert!(cargar(&[("ALMACEN", "neo4j")]).is_err());
        let cfg = cargar(&[("ALMACEN", "Neo4j"), ("NEO4J_PASSWORD", "secreto")]).unwrap();
        assert_eq!(cfg.almacen, AlmacenBackend::Neo4j);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(cargar(&[("ALMACEN", "postgres")]).is_err());
        assert!(cargar(&[("PREDICTOR_TIMEOUT_SECS", "mucho")]).is_err());
        assert!(cargar(&[("MAX_UPLOAD_BYTES", "-1")]).is_err());
    }
}
