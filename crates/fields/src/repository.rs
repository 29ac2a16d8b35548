// Archivo: repository.rs
// Propósito: definir los traits `FieldValueRepository` y `ContentRepository`.
// Describen el contrato que deben implementar las persistencias (Diesel,
// in-memory, etc.).
use crate::domain::{FieldValue, RawRow};
use crate::errors::Result;
use crate::query::SqlSelect;
use content_domain::ContentType;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Contrato del repositorio de valores hijos (filas de la tabla de valores).
///
/// La reconciliación del motor produce inserts/updates/deletes puntuales;
/// este trait es la superficie mínima que necesitan.
pub trait FieldValueRepository: Send + Sync {
    /// Inserta (`update == false`) o actualiza (`update == true`) una fila de
    /// valor. Devuelve el id de la fila resultante.
    fn save(&self, value: &FieldValue, update: bool) -> Result<i64>;

    /// Elimina una fila de valor por su id propio.
    fn delete(&self, value: &FieldValue) -> Result<()>;

    /// Ids de filas existentes para `(registro, tipo, campo repetidor)`,
    /// agrupados por índice de grupo y ordenados.
    fn get_existing_fields(&self, content_id: i64, contenttype: &str, fieldname: &str)
                           -> Result<BTreeMap<i64, Vec<i64>>>;

    /// Carga las filas de valor con los ids dados (para la hidratación
    /// perezosa de colecciones).
    fn load_values(&self, ids: &[i64]) -> Result<Vec<FieldValue>>;
}

/// Contrato del repositorio de registros de contenido (la fila padre).
///
/// El límite transaccional pertenece al implementador/llamador: este núcleo
/// no reintenta ni revierte; un fallo de escritura se propaga tal cual.
pub trait ContentRepository: Send + Sync {
    /// Identificador del backend relacional activo, usado por el aumento de
    /// consulta ("mysql", "sqlite", "postgresql").
    fn backend(&self) -> &str;

    /// Inserta la fila padre con las columnas preparadas por los handlers.
    /// Devuelve `(filas afectadas, id generado)`.
    fn insert_content(&self, contenttype: &str, columns: &IndexMap<String, JsonValue>) -> Result<(usize, i64)>;

    /// Actualiza la fila padre. Devuelve filas afectadas.
    fn update_content(&self, id: i64, contenttype: &str, columns: &IndexMap<String, JsonValue>) -> Result<usize>;

    /// Recupera una fila cruda con las columnas agregadas que pide `query`.
    /// Las implementaciones pueden ejecutar `query.to_sql()` directamente o
    /// derivar una consulta equivalente columna a columna.
    fn get_content(&self, id: i64, content_type: &ContentType, query: &SqlSelect) -> Result<Option<RawRow>>;

    /// Ids de registros existentes del tipo dado, ordenados.
    fn list_content(&self, contenttype: &str) -> Result<Vec<i64>>;

    /// Elimina la fila padre. Los valores hijos los elimina el motor antes.
    fn delete_content(&self, id: i64, contenttype: &str) -> Result<()>;
}
