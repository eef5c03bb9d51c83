//! Almacén sobre Neo4j. Cada entidad es un nodo y cada asociación una
//! relación, de modo que las lecturas resuelven siempre el dato vivo:
//! (:Medico)-[:ATIENDE]->(:Paciente)-[:TIENE_IMAGEN]->(:Imagen)-[:TIENE_INFORME]->(:Informe)

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, Graph, Node, Query, Row};
use tracing::info;
use url::Url;

use super::Almacen;
use crate::config::AppConfig;
use crate::error::{RegistroError, Result};
use crate::models::{Entidad, FilaImagen, FilaInforme, FilaPaciente, Medico, NuevaImagen};

pub struct AlmacenNeo4j {
    graph: Arc<Graph>,
}

impl AlmacenNeo4j {
    pub async fn conectar(cfg: &AppConfig) -> anyhow::Result<Self> {
        let url = Url::parse(&cfg.neo4j_uri)?;
        let host = url.host_str().unwrap_or("localhost");
        let port = url.port().unwrap_or(7687);
        let addr = format!("{host}:{port}");

        info!("Conectando a Neo4j en {addr}...");
        let graph = Graph::new(&addr, &cfg.neo4j_user, &cfg.neo4j_password).await?;
        info!("Conexión a Neo4j OK");

        let almacen = Self {
            graph: Arc::new(graph),
        };
        almacen.asegurar_esquema().await?;
        Ok(almacen)
    }

    /// Crea las constraints de unicidad de id para cada etiqueta.
    async fn asegurar_esquema(&self) -> anyhow::Result<()> {
        for entidad in [
            Entidad::Medico,
            Entidad::Paciente,
            Entidad::Imagen,
            Entidad::Informe,
        ] {
            let etiqueta = entidad.etiqueta();
            let stmt = format!(
                "CREATE CONSTRAINT {}_id IF NOT EXISTS
                 FOR (n:{})
                 REQUIRE n.id IS UNIQUE",
                etiqueta.to_lowercase(),
                etiqueta
            );
            self.graph.run(query(&stmt)).await?;
        }
        self.graph
            .run(query(
                "CREATE CONSTRAINT medico_dni IF NOT EXISTS
                 FOR (m:Medico)
                 REQUIRE m.dni IS UNIQUE",
            ))
            .await?;
        info!("Esquema de Neo4j asegurado (constraints de id y dni creados).");
        Ok(())
    }

    async fn filas(&self, q: Query) -> Result<Vec<Row>> {
        let mut cursor = self.graph.execute(q).await?;
        let mut filas = Vec::new();
        while let Some(row) = cursor.next().await? {
            filas.push(row);
        }
        Ok(filas)
    }

    async fn contar(&self, q: Query) -> Result<i64> {
        Ok(self
            .filas(q)
            .await?
            .first()
            .and_then(|row| row.get::<i64>("n"))
            .unwrap_or(0))
    }
}

fn nodo(row: &Row, clave: &str) -> Result<Node> {
    row.get::<Node>(clave)
        .ok_or_else(|| RegistroError::Almacen(format!("Falta el nodo '{clave}' en la fila")))
}

fn medico_desde(n: &Node) -> Medico {
    Medico {
        id: n.get("id").unwrap_or_default(),
        dni: n.get("dni").unwrap_or_default(),
        nombre: n.get("nombre").unwrap_or_default(),
        especialidad: n.get("especialidad").unwrap_or_default(),
    }
}

fn paciente_desde(row: &Row) -> Result<FilaPaciente> {
    let n = nodo(row, "p")?;
    Ok(FilaPaciente {
        id: n.get("id").unwrap_or_default(),
        nombre: n.get("nombre").unwrap_or_default(),
        dni: n.get("dni").unwrap_or_default(),
        edad: n.get::<i64>("edad").unwrap_or_default() as i32,
        cita: n.get("cita"),
        medico_id: row.get("medico_id"),
    })
}

fn imagen_desde(row: &Row) -> Result<FilaImagen> {
    let n = nodo(row, "i")?;
    let fecha: String = n.get("fecha").unwrap_or_default();
    let fecha = DateTime::parse_from_rfc3339(&fecha)
        .map_err(|e| RegistroError::Almacen(format!("Fecha de imagen inválida '{fecha}': {e}")))?
        .with_timezone(&Utc);
    Ok(FilaImagen {
        id: n.get("id").unwrap_or_default(),
        nombre: n.get("nombre").unwrap_or_default(),
        fecha,
        prediccion: n.get("prediccion"),
        paciente_id: row.get("paciente_id").unwrap_or_default(),
        fichero: n.get("fichero").unwrap_or_default(),
    })
}

fn informe_desde(row: &Row) -> Result<FilaInforme> {
    let n = nodo(row, "inf")?;
    Ok(FilaInforme {
        id: n.get("id").unwrap_or_default(),
        contenido: n.get("contenido").unwrap_or_default(),
        prediccion: n.get("prediccion"),
        imagen_id: row.get("imagen_id").unwrap_or_default(),
    })
}

/// Cypher que deja en `var` el id recibido o, si es 0, el siguiente libre
/// de `etiqueta`.
fn id_o_siguiente(etiqueta: &str, var: &str) -> String {
    format!(
        "OPTIONAL MATCH (x:{etiqueta})
         WITH CASE $id WHEN 0 THEN coalesce(max(x.id), 0) + 1 ELSE $id END AS {var}"
    )
}

/// `SET` o `REMOVE` según haya valor; neo4rs no admite parámetros nulos.
fn asignar_opcional(var: &str, prop: &str, valor: &Option<String>) -> String {
    match valor {
        Some(_) => format!("SET {var}.{prop} = ${prop}"),
        None => format!("REMOVE {var}.{prop}"),
    }
}

#[async_trait]
impl Almacen for AlmacenNeo4j {
    async fn guardar_medico(&self, mut medico: Medico) -> Result<Medico> {
        // Sólo se escribe si ningún otro médico tiene el dni.
        let stmt = format!(
            "{}
             OPTIONAL MATCH (otro:Medico {{dni: $dni}}) WHERE otro.id <> mid
             WITH mid, min(otro.id) AS otro
             FOREACH (escribir IN CASE WHEN otro IS NULL THEN [1] ELSE [] END |
                 MERGE (m:Medico {{id: mid}})
                 SET m.dni = $dni, m.nombre = $nombre, m.especialidad = $especialidad)
             RETURN mid, otro",
            id_o_siguiente("Medico", "mid")
        );
        let filas = self
            .filas(
                query(&stmt)
                    .param("id", medico.id)
                    .param("dni", medico.dni.clone())
                    .param("nombre", medico.nombre.clone())
                    .param("especialidad", medico.especialidad.clone()),
            )
            .await?;
        let row = filas
            .first()
            .ok_or_else(|| RegistroError::Almacen("Neo4j no devolvió el médico guardado".into()))?;
        if let Some(otro) = row.get::<i64>("otro") {
            return Err(RegistroError::Conflicto(format!(
                "El dni {} ya pertenece al médico {}",
                medico.dni, otro
            )));
        }
        medico.id = row.get("mid").unwrap_or(medico.id);
        Ok(medico)
    }

    async fn medico(&self, id: i64) -> Result<Option<Medico>> {
        let filas = self
            .filas(query("MATCH (m:Medico {id: $id}) RETURN m").param("id", id))
            .await?;
        filas
            .first()
            .map(|row| nodo(row, "m").map(|n| medico_desde(&n)))
            .transpose()
    }

    async fn medico_por_dni(&self, dni: &str) -> Result<Option<Medico>> {
        let filas = self
            .filas(
                query("MATCH (m:Medico {dni: $dni}) RETURN m ORDER BY m.id LIMIT 1")
                    .param("dni", dni.to_string()),
            )
            .await?;
        filas
            .first()
            .map(|row| nodo(row, "m").map(|n| medico_desde(&n)))
            .transpose()
    }

    async fn borrar_medico(&self, id: i64) -> Result<bool> {
        // DETACH elimina las relaciones ATIENDE: los pacientes quedan sin médico.
        let n = self
            .contar(
                query("MATCH (m:Medico {id: $id}) DETACH DELETE m RETURN count(m) AS n")
                    .param("id", id),
            )
            .await?;
        Ok(n > 0)
    }

    async fn guardar_paciente(&self, mut paciente: FilaPaciente) -> Result<FilaPaciente> {
        // Con médico, el MATCH deja la consulta sin filas si no existe y no
        // se escribe nada.
        let (medico, enlace) = match paciente.medico_id {
            Some(_) => ("MATCH (m:Medico {id: $mid})", "MERGE (m)-[:ATIENDE]->(p)"),
            None => ("WITH pid", ""),
        };
        let arrastre = if paciente.medico_id.is_some() { "p, m" } else { "p" };
        let stmt = format!(
            "{}
             {medico}
             MERGE (p:Paciente {{id: pid}})
             SET p.nombre = $nombre, p.dni = $dni, p.edad = $edad
             {}
             WITH {arrastre}
             OPTIONAL MATCH (:Medico)-[r:ATIENDE]->(p)
             DELETE r
             WITH DISTINCT {arrastre}
             {enlace}
             RETURN p.id AS id",
            id_o_siguiente("Paciente", "pid"),
            asignar_opcional("p", "cita", &paciente.cita),
        );
        let mut q = query(&stmt)
            .param("id", paciente.id)
            .param("nombre", paciente.nombre.clone())
            .param("dni", paciente.dni.clone())
            .param("edad", i64::from(paciente.edad));
        if let Some(cita) = &paciente.cita {
            q = q.param("cita", cita.clone());
        }
        if let Some(medico_id) = paciente.medico_id {
            q = q.param("mid", medico_id);
        }

        let filas = self.filas(q).await?;
        match filas.first().and_then(|row| row.get::<i64>("id")) {
            Some(id) => {
                paciente.id = id;
                Ok(paciente)
            }
            None => Err(RegistroError::NoEncontrado(format!(
                "Médico {}",
                paciente.medico_id.unwrap_or_default()
            ))),
        }
    }

    async fn paciente(&self, id: i64) -> Result<Option<FilaPaciente>> {
        let filas = self
            .filas(
                query(
                    "MATCH (p:Paciente {id: $id})
                     OPTIONAL MATCH (m:Medico)-[:ATIENDE]->(p)
                     RETURN p, m.id AS medico_id",
                )
                .param("id", id),
            )
            .await?;
        filas.first().map(paciente_desde).transpose()
    }

    async fn pacientes_de_medico(&self, medico_id: i64) -> Result<Vec<FilaPaciente>> {
        self.filas(
            query(
                "MATCH (m:Medico {id: $mid})-[:ATIENDE]->(p:Paciente)
                 RETURN p, m.id AS medico_id ORDER BY p.id",
            )
            .param("mid", medico_id),
        )
        .await?
        .iter()
        .map(paciente_desde)
        .collect()
    }

    async fn borrar_paciente(&self, id: i64) -> Result<Vec<FilaImagen>> {
        let imagenes = self.imagenes_de_paciente(id).await?;
        self.graph
            .run(
                query(
                    "MATCH (p:Paciente {id: $id})
                     OPTIONAL MATCH (p)-[:TIENE_IMAGEN]->(i:Imagen)
                     OPTIONAL MATCH (i)-[:TIENE_INFORME]->(inf:Informe)
                     DETACH DELETE inf, i, p",
                )
                .param("id", id),
            )
            .await?;
        Ok(imagenes)
    }

    async fn insertar_imagen(&self, nueva: NuevaImagen) -> Result<FilaImagen> {
        let filas = self
            .filas(
                query(
                    "MATCH (p:Paciente {id: $pid})
                     OPTIONAL MATCH (x:Imagen)
                     WITH p, coalesce(max(x.id), 0) + 1 AS nid
                     CREATE (p)-[:TIENE_IMAGEN]->(i:Imagen {id: nid, nombre: $nombre,
                             fecha: $fecha, fichero: $fichero})
                     RETURN i, p.id AS paciente_id",
                )
                .param("pid", nueva.paciente_id)
                .param("nombre", nueva.nombre)
                .param("fecha", nueva.fecha.to_rfc3339())
                .param("fichero", nueva.fichero),
            )
            .await?;
        match filas.first() {
            Some(row) => imagen_desde(row),
            None => Err(RegistroError::NoEncontrado(format!(
                "Paciente {}",
                nueva.paciente_id
            ))),
        }
    }

    async fn fijar_prediccion(&self, imagen_id: i64, prediccion: &str) -> Result<bool> {
        let n = self
            .contar(
                query("MATCH (i:Imagen {id: $id}) SET i.prediccion = $p RETURN count(i) AS n")
                    .param("id", imagen_id)
                    .param("p", prediccion.to_string()),
            )
            .await?;
        Ok(n > 0)
    }

    async fn imagen(&self, id: i64) -> Result<Option<FilaImagen>> {
        let filas = self
            .filas(
                query(
                    "MATCH (p:Paciente)-[:TIENE_IMAGEN]->(i:Imagen {id: $id})
                     RETURN i, p.id AS paciente_id",
                )
                .param("id", id),
            )
            .await?;
        filas.first().map(imagen_desde).transpose()
    }

    async fn imagenes_de_paciente(&self, paciente_id: i64) -> Result<Vec<FilaImagen>> {
        self.filas(
            query(
                "MATCH (p:Paciente {id: $pid})-[:TIENE_IMAGEN]->(i:Imagen)
                 RETURN i, p.id AS paciente_id ORDER BY i.id",
            )
            .param("pid", paciente_id),
        )
        .await?
        .iter()
        .map(imagen_desde)
        .collect()
    }

    async fn borrar_imagen(&self, id: i64) -> Result<Option<FilaImagen>> {
        let Some(imagen) = self.imagen(id).await? else {
            return Ok(None);
        };
        self.graph
            .run(
                query(
                    "MATCH (i:Imagen {id: $id})
                     OPTIONAL MATCH (i)-[:TIENE_INFORME]->(inf:Informe)
                     DETACH DELETE inf, i",
                )
                .param("id", id),
            )
            .await?;
        Ok(Some(imagen))
    }

    async fn guardar_informe(&self, mut informe: FilaInforme) -> Result<FilaInforme> {
        let stmt = format!(
            "{}
             MATCH (i:Imagen {{id: $iid}})
             MERGE (inf:Informe {{id: nid}})
             SET inf.contenido = $contenido
             {}
             WITH i, inf
             OPTIONAL MATCH (:Imagen)-[r:TIENE_INFORME]->(inf)
             DELETE r
             WITH DISTINCT i, inf
             MERGE (i)-[:TIENE_INFORME]->(inf)
             RETURN inf.id AS id",
            id_o_siguiente("Informe", "nid"),
            asignar_opcional("inf", "prediccion", &informe.prediccion),
        );
        let mut q = query(&stmt)
            .param("id", informe.id)
            .param("iid", informe.imagen_id)
            .param("contenido", informe.contenido.clone());
        if let Some(prediccion) = &informe.prediccion {
            q = q.param("prediccion", prediccion.clone());
        }

        let filas = self.filas(q).await?;
        match filas.first().and_then(|row| row.get::<i64>("id")) {
            Some(id) => {
                informe.id = id;
                Ok(informe)
            }
            None => Err(RegistroError::NoEncontrado(format!(
                "Imagen {}",
                informe.imagen_id
            ))),
        }
    }

    async fn informe(&self, id: i64) -> Result<Option<FilaInforme>> {
        let filas = self
            .filas(
                query(
                    "MATCH (i:Imagen)-[:TIENE_INFORME]->(inf:Informe {id: $id})
                     RETURN inf, i.id AS imagen_id",
                )
                .param("id", id),
            )
            .await?;
        filas.first().map(informe_desde).transpose()
    }

    async fn informes_de_imagen(&self, imagen_id: i64) -> Result<Vec<FilaInforme>> {
        self.filas(
            query(
                "MATCH (i:Imagen {id: $iid})-[:TIENE_INFORME]->(inf:Informe)
                 RETURN inf, i.id AS imagen_id ORDER BY inf.id",
            )
            .param("iid", imagen_id),
        )
        .await?
        .iter()
        .map(informe_desde)
        .collect()
    }

    async fn borrar_informe(&self, id: i64) -> Result<bool> {
        let n = self
            .contar(
                query("MATCH (inf:Informe {id: $id}) DETACH DELETE inf RETURN count(inf) AS n")
                    .param("id", id),
            )
            .await?;
        Ok(n > 0)
    }
}
