// storage.rs
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tipo de almacenamiento de un campo: decide cuál de las columnas de valor
/// (`value_text`, `value_integer`, ...) se rellena para cada `FieldValue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
  Text,
  Integer,
  Float,
  Date,
  Json,
}

impl StorageKind {
  /// Columna física asociada a este tipo de almacenamiento.
  pub fn column(&self) -> &'static str {
    match self {
      StorageKind::Text => "value_text",
      StorageKind::Integer => "value_integer",
      StorageKind::Float => "value_float",
      StorageKind::Date => "value_date",
      StorageKind::Json => "value_json",
    }
  }

  /// Parsea el nombre declarado en la configuración ("text", "json", ...).
  pub fn parse(name: &str) -> Result<Self, SchemaError> {
    match name {
      "text" => Ok(StorageKind::Text),
      "integer" => Ok(StorageKind::Integer),
      "float" => Ok(StorageKind::Float),
      "date" => Ok(StorageKind::Date),
      "json" => Ok(StorageKind::Json),
      other => Err(SchemaError::FieldConfiguration(format!("tipo de almacenamiento desconocido: {}", other))),
    }
  }

  /// Almacenamiento por defecto para un discriminador de tipo de campo.
  /// Devuelve `None` para tipos no conocidos: esos requieren un `storage`
  /// explícito en la configuración.
  pub fn default_for(field_type: &str) -> Option<Self> {
    match field_type {
      "text" | "html" | "textarea" => Some(StorageKind::Text),
      "integer" => Some(StorageKind::Integer),
      "float" => Some(StorageKind::Float),
      "date" | "datetime" => Some(StorageKind::Date),
      "json" | "repeater" | "templatefields" => Some(StorageKind::Json),
      _ => None,
    }
  }
}

impl fmt::Display for StorageKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      StorageKind::Text => "text",
      StorageKind::Integer => "integer",
      StorageKind::Float => "float",
      StorageKind::Date => "date",
      StorageKind::Json => "json",
    };
    write!(f, "{}", s)
  }
}
