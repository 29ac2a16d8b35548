// Archivo: domain.rs
// Propósito: tipos de dominio del motor de campos: el valor almacenado por
// columna tipada (`StoredValue`), la fila hija (`FieldValue`) y la entidad de
// contenido dinámica (`ContentEntity`) sobre la que operan los handlers.
use crate::collection::RepeatingFieldCollection;
use crate::errors::{FieldError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use content_domain::StorageKind;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

/// Una fila cruda tal y como llega del almacenamiento: columna -> valor JSON.
pub type RawRow = serde_json::Map<String, JsonValue>;

/// Valor escalar de un `FieldValue`: exactamente una ranura poblada, elegida
/// por el tipo de almacenamiento del campo.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDateTime),
    Json(JsonValue),
}

impl StoredValue {
    /// Convierte un valor JSON crudo en el valor tipado que pide `kind`.
    /// Acepta números en forma de cadena y fechas ISO-8601 (con o sin hora).
    pub fn from_raw(kind: StorageKind, raw: &JsonValue) -> Result<Self> {
        match kind {
            StorageKind::Text => {
                let s = match raw {
                    JsonValue::String(s) => s.clone(),
                    JsonValue::Null => String::new(),
                    other => other.to_string(),
                };
                Ok(StoredValue::Text(s))
            }
            StorageKind::Integer => {
                let n = raw.as_i64().or_else(|| raw.as_str().and_then(|s| s.trim().parse::<i64>().ok()));
                n.map(StoredValue::Integer)
                 .ok_or_else(|| FieldError::Validation(format!("'{}' no es un entero", raw)))
            }
            StorageKind::Float => {
                let n = raw.as_f64().or_else(|| raw.as_str().and_then(|s| s.trim().parse::<f64>().ok()));
                n.map(StoredValue::Float)
                 .ok_or_else(|| FieldError::Validation(format!("'{}' no es un número", raw)))
            }
            StorageKind::Date => {
                let s = raw.as_str()
                           .ok_or_else(|| FieldError::Validation(format!("'{}' no es una fecha", raw)))?;
                parse_date(s).map(StoredValue::Date)
                             .ok_or_else(|| FieldError::Validation(format!("fecha inválida: '{}'", s)))
            }
            StorageKind::Json => Ok(StoredValue::Json(raw.clone())),
        }
    }

    /// Vuelta al valor JSON crudo (forma canónica de cara al exterior).
    pub fn to_raw(&self) -> JsonValue {
        match self {
            StoredValue::Text(s) => JsonValue::String(s.clone()),
            StoredValue::Integer(n) => JsonValue::from(*n),
            StoredValue::Float(n) => JsonValue::from(*n),
            StoredValue::Date(d) => JsonValue::String(d.format("%Y-%m-%dT%H:%M:%S").to_string()),
            StoredValue::Json(v) => v.clone(),
        }
    }

    /// Columna física que puebla esta variante.
    pub fn column(&self) -> &'static str {
        match self {
            StoredValue::Text(_) => "value_text",
            StoredValue::Integer(_) => "value_integer",
            StoredValue::Float(_) => "value_float",
            StoredValue::Date(_) => "value_date",
            StoredValue::Json(_) => "value_json",
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(|d| d.and_time(NaiveTime::MIN)))
}

/// Una fila hija de la tabla de valores: un valor escalar perteneciente a un
/// campo lógico, un índice de grupo y un registro de contenido padre.
///
/// `id` es el identificador propio de la fila (None hasta su primer insert);
/// `content_id` queda en None mientras el insert del padre no haya confirmado
/// y se completa vía la cola de acciones diferidas.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub id: Option<i64>,
    pub content_id: Option<i64>,
    pub contenttype: String,
    /// Nombre del campo repetidor dueño de la fila (columna de filtrado).
    pub name: String,
    /// Nombre del sub-campo dentro del grupo (lo que viaja en el token).
    pub fieldname: String,
    pub fieldtype: String,
    pub grouping: i64,
    pub value: StoredValue,
}

impl FieldValue {
    pub fn new(contenttype: &str, name: &str, fieldname: &str, fieldtype: &str, grouping: i64, value: StoredValue) -> Self {
        Self { id: None,
               content_id: None,
               contenttype: contenttype.to_string(),
               name: name.to_string(),
               fieldname: fieldname.to_string(),
               fieldtype: fieldtype.to_string(),
               grouping,
               value }
    }
}

/// Valor de un campo dentro de la entidad: o bien el valor crudo tal y como
/// llegó (formulario, fila hidratada) o bien la colección canónica de grupos.
#[derive(Debug, Clone)]
pub enum EntityValue {
    Raw(JsonValue),
    Collection(RepeatingFieldCollection),
}

/// Un registro de un tipo de contenido definido por el editor. Los campos son
/// dinámicos: el mapa `values` se rellena según el esquema declarado.
#[derive(Debug, Clone, Default)]
pub struct ContentEntity {
    pub id: Option<i64>,
    pub contenttype: String,
    pub values: IndexMap<String, EntityValue>,
}

impl ContentEntity {
    pub fn new(contenttype: &str) -> Self {
        Self { id: None, contenttype: contenttype.to_string(), values: IndexMap::new() }
    }

    /// Valor crudo de un campo escalar, si está presente.
    pub fn raw(&self, field: &str) -> Option<&JsonValue> {
        match self.values.get(field) {
            Some(EntityValue::Raw(v)) => Some(v),
            _ => None,
        }
    }

    /// Colección de un campo repetidor, si ya está en forma canónica.
    pub fn collection(&self, field: &str) -> Option<&RepeatingFieldCollection> {
        match self.values.get(field) {
            Some(EntityValue::Collection(c)) => Some(c),
            _ => None,
        }
    }

    pub fn collection_mut(&mut self, field: &str) -> Option<&mut RepeatingFieldCollection> {
        match self.values.get_mut(field) {
            Some(EntityValue::Collection(c)) => Some(c),
            _ => None,
        }
    }
}
