// Módulos de la aplicación
mod api;
mod app_state;
mod blobs;
mod config;
mod error;
mod informes;
mod ingest;
mod models;
mod prediccion;
mod registro;
mod relaciones;
mod store;

use std::sync::Arc;

use crate::app_state::AppState;
use crate::config::AlmacenBackend;
use crate::store::{Almacen, AlmacenMemoria, AlmacenNeo4j};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env()?;

    // 3. Almacén de registros
    let almacen: Arc<dyn Almacen> = match cfg.almacen {
        AlmacenBackend::Memoria => {
            info!("Usando almacén en memoria");
            Arc::new(AlmacenMemoria::new())
        }
        AlmacenBackend::Neo4j => Arc::new(AlmacenNeo4j::conectar(&cfg).await?),
    };

    // 4. Directorio de subidas y cliente del modelo
    let blobs = blobs::AlmacenFicheros::abrir(&cfg.upload_dir).await?;
    let clasificador = Arc::new(prediccion::ClasificadorHttp::from_config(&cfg)?);
    info!("Predicciones delegadas en {}", cfg.predictor_url);

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState::new(cfg.clone(), almacen, blobs, clasificador);

    // 6. Configurar el router de la API
    let app = api::create_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr).await?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
