// errors.rs
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SchemaError {
  #[error("Error de validación: {0}")]
  ValidationError(String),
  #[error("Configuración de campo inválida: {0}")]
  FieldConfiguration(String),
  #[error("Error de serialización: {0}")]
  SerializationError(String),
}

impl From<serde_json::Error> for SchemaError {
  fn from(e: serde_json::Error) -> Self {
    Self::SerializationError(e.to_string())
  }
}
