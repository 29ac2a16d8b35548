// Archivo: errors.rs
// Propósito: definir los errores del núcleo de campos y el alias Result<T>
// usado por las APIs del crate.
use content_domain::SchemaError;
use thiserror::Error;

/// Errores del motor de campos.
///
/// - `NotFound`: entidad o fila no encontrada.
/// - `Configuration`: tipo de campo o mapeo no declarado en el esquema.
/// - `UnsupportedBackend`: generación de SQL pedida para un backend no
///   reconocido (fatal, sin SQL parcial).
/// - `Validation`: valor propuesto incompatible con el almacenamiento.
/// - `Storage`: error al acceder al almacenamiento externo.
/// - `Serialization`: JSON inválido al (de)codificar valores.
#[derive(Error, Debug)]
pub enum FieldError {
    /// Entidad no encontrada (registro de contenido o valor hijo).
    #[error("No encontrado: {0}")]
    NotFound(String),
    /// Configuración de campo inválida o tipo sin handler registrado.
    #[error("Configuración de campo inválida: {0}")]
    Configuration(String),
    /// Backend relacional no soportado para agregación.
    #[error("Backend no soportado: {0}")]
    UnsupportedBackend(String),
    /// Valor incompatible con el tipo de almacenamiento declarado.
    #[error("Error de validación: {0}")]
    Validation(String),
    /// Error genérico de almacenamiento (BD, stub en memoria, etc.).
    #[error("Error de almacenamiento: {0}")]
    Storage(String),
    /// Error de (de)serialización JSON.
    #[error("Error de serialización: {0}")]
    Serialization(String),
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, FieldError>;

impl From<serde_json::Error> for FieldError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<SchemaError> for FieldError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::FieldConfiguration(msg) => Self::Configuration(msg),
            SchemaError::ValidationError(msg) => Self::Configuration(msg),
            SchemaError::SerializationError(msg) => Self::Serialization(msg),
        }
    }
}
