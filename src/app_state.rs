use std::sync::Arc;

use crate::{
    blobs::AlmacenFicheros,
    config::AppConfig,
    informes::ServicioInformes,
    ingest::ServicioIngesta,
    prediccion::{Clasificador, ServicioPrediccion},
    registro::Registro,
    relaciones::Relaciones,
    store::Almacen,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registro: Registro,
    pub relaciones: Relaciones,
    pub ingesta: ServicioIngesta,
    pub prediccion: ServicioPrediccion,
    pub informes: ServicioInformes,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        almacen: Arc<dyn Almacen>,
        blobs: AlmacenFicheros,
        clasificador: Arc<dyn Clasificador>,
    ) -> Self {
        let ingesta = ServicioIngesta::new(almacen.clone(), blobs.clone());
        let prediccion = ServicioPrediccion::new(almacen.clone(), blobs, clasificador);
        Self {
            config,
            registro: Registro::new(almacen.clone(), ingesta.clone()),
            relaciones: Relaciones::new(almacen.clone()),
            informes: ServicioInformes::new(almacen, prediccion.clone()),
            ingesta,
            prediccion,
        }
    }
}
