// Archivo: stubs.rs
// Propósito: implementaciones en memoria para pruebas y wiring rápido.
//
// Incluye un repositorio en memoria (`InMemoryContentRepository`) que cumple
// los dos contratos de persistencia. No es durable; se usa para demos y
// pruebas locales.
use crate::domain::{FieldValue, RawRow};
use crate::errors::{FieldError, Result};
use crate::query::{encode_reference, SqlSelect};
use crate::repository::{ContentRepository, FieldValueRepository};
use content_domain::ContentType;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Fila padre almacenada en memoria.
#[derive(Debug, Clone)]
struct StoredContent {
    contenttype: String,
    columns: IndexMap<String, JsonValue>,
}

/// Repositorio en memoria para contenido y valores hijos.
///
/// La columna agregada de los repetidores se reproduce aquí con la misma
/// forma que produciría el SQL: tokens `nombre_grupo_id` deduplicados y
/// unidos por comas, de modo que los round-trips completos funcionan sin
/// base de datos.
pub struct InMemoryContentRepository {
    content: Mutex<HashMap<i64, StoredContent>>,
    field_values: Mutex<HashMap<i64, FieldValue>>,
    content_seq: Mutex<i64>,
    value_seq: Mutex<i64>,
}

impl InMemoryContentRepository {
    pub fn new() -> Self {
        Self { content: Mutex::new(HashMap::new()),
               field_values: Mutex::new(HashMap::new()),
               content_seq: Mutex::new(0),
               value_seq: Mutex::new(0) }
    }

    /// Helper para mapear `Mutex::lock()` en un `Result` con
    /// `FieldError::Storage`.
    fn lock<'a, T>(&'a self, m: &'a Mutex<T>) -> std::result::Result<MutexGuard<'a, T>, FieldError> {
        m.lock().map_err(|e| FieldError::Storage(format!("mutex poisoned: {:?}", e)))
    }

    fn next_id(&self, seq: &Mutex<i64>) -> Result<i64> {
        let mut guard = self.lock(seq)?;
        *guard += 1;
        Ok(*guard)
    }

    /// Número de filas hijas almacenadas (visible para aserciones).
    pub fn field_value_count(&self) -> usize {
        self.field_values.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for InMemoryContentRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentRepository for InMemoryContentRepository {
    fn backend(&self) -> &str {
        "sqlite"
    }

    fn insert_content(&self, contenttype: &str, columns: &IndexMap<String, JsonValue>) -> Result<(usize, i64)> {
        let id = self.next_id(&self.content_seq)?;
        let mut content = self.lock(&self.content)?;
        content.insert(id, StoredContent { contenttype: contenttype.to_string(), columns: columns.clone() });
        Ok((1, id))
    }

    fn update_content(&self, id: i64, contenttype: &str, columns: &IndexMap<String, JsonValue>) -> Result<usize> {
        let mut content = self.lock(&self.content)?;
        match content.get_mut(&id) {
            Some(stored) if stored.contenttype == contenttype => {
                stored.columns = columns.clone();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    /// Devuelve la fila cruda con las columnas agregadas. La consulta se
    /// interpreta semánticamente: por cada campo repetidor se produce la
    /// misma cadena que generaría la subconsulta agregada.
    fn get_content(&self, id: i64, content_type: &ContentType, _query: &SqlSelect) -> Result<Option<RawRow>> {
        let content = self.lock(&self.content)?;
        let stored = match content.get(&id) {
            Some(stored) if stored.contenttype == content_type.name() => stored.clone(),
            _ => return Ok(None),
        };
        drop(content);

        let mut row = RawRow::new();
        row.insert("id".to_string(), JsonValue::from(id));
        row.insert("contenttype".to_string(), JsonValue::String(stored.contenttype.clone()));
        for (name, value) in &stored.columns {
            row.insert(name.clone(), value.clone());
        }

        let field_values = self.lock(&self.field_values)?;
        for def in content_type.fields().values().filter(|d| d.is_repeating()) {
            let tokens: BTreeSet<String> =
                field_values.values()
                            .filter(|fv| {
                                fv.content_id == Some(id)
                                && fv.contenttype == stored.contenttype
                                && fv.name == def.name()
                            })
                            .filter_map(|fv| fv.id.map(|fid| encode_reference(&fv.fieldname, fv.grouping, fid)))
                            .collect();
            let aggregated = if tokens.is_empty() {
                JsonValue::Null
            } else {
                JsonValue::String(tokens.into_iter().collect::<Vec<_>>().join(","))
            };
            row.insert(def.name().to_string(), aggregated);
        }
        Ok(Some(row))
    }

    fn list_content(&self, contenttype: &str) -> Result<Vec<i64>> {
        let content = self.lock(&self.content)?;
        let mut ids: Vec<i64> =
            content.iter().filter(|(_, s)| s.contenttype == contenttype).map(|(id, _)| *id).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn delete_content(&self, id: i64, contenttype: &str) -> Result<()> {
        let mut content = self.lock(&self.content)?;
        match content.get(&id) {
            Some(stored) if stored.contenttype == contenttype => {
                content.remove(&id);
                Ok(())
            }
            _ => Err(FieldError::NotFound(format!("registro {}/{}", contenttype, id))),
        }
    }
}

impl FieldValueRepository for InMemoryContentRepository {
    fn save(&self, value: &FieldValue, update: bool) -> Result<i64> {
        let mut field_values = self.lock(&self.field_values)?;
        if update {
            let id = value.id
                          .ok_or_else(|| FieldError::Validation("update de fila hija sin id".to_string()))?;
            field_values.insert(id, value.clone());
            Ok(id)
        } else {
            if value.content_id.is_none() {
                return Err(FieldError::Validation(format!("insert de fila hija sin content_id ('{}')",
                                                          value.fieldname)));
            }
            drop(field_values);
            let id = self.next_id(&self.value_seq)?;
            let mut stored = value.clone();
            stored.id = Some(id);
            self.lock(&self.field_values)?.insert(id, stored);
            Ok(id)
        }
    }

    fn delete(&self, value: &FieldValue) -> Result<()> {
        let id = value.id
                      .ok_or_else(|| FieldError::Validation("borrado de fila hija sin id".to_string()))?;
        self.lock(&self.field_values)?.remove(&id);
        Ok(())
    }

    fn get_existing_fields(&self, content_id: i64, contenttype: &str, fieldname: &str)
                           -> Result<BTreeMap<i64, Vec<i64>>> {
        let field_values = self.lock(&self.field_values)?;
        let mut grouped: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for fv in field_values.values() {
            if fv.content_id == Some(content_id) && fv.contenttype == contenttype && fv.name == fieldname {
                if let Some(id) = fv.id {
                    grouped.entry(fv.grouping).or_default().push(id);
                }
            }
        }
        for ids in grouped.values_mut() {
            ids.sort_unstable();
        }
        Ok(grouped)
    }

    fn load_values(&self, ids: &[i64]) -> Result<Vec<FieldValue>> {
        let field_values = self.lock(&self.field_values)?;
        let mut out: Vec<FieldValue> = ids.iter().filter_map(|id| field_values.get(id).cloned()).collect();
        out.sort_by_key(|fv| (fv.grouping, fv.id));
        Ok(out)
    }
}
