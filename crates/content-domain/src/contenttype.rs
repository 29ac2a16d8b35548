// contenttype.rs
use crate::{FieldDefinition, SchemaError};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Columnas base de toda fila de contenido; los campos declarados no pueden
/// colisionar con ellas.
static BASE_COLUMNS: Lazy<HashSet<&'static str>> = Lazy::new(|| ["id", "contenttype", "created_at"].into_iter().collect());

/// Un tipo de contenido definido por el editor: nombre, tablas asociadas y
/// lista ordenada de campos declarados.
#[derive(Debug, Clone)]
pub struct ContentType {
  name: String,
  table: String,
  field_value_table: String,
  fields: IndexMap<String, FieldDefinition>,
}

impl ContentType {
  pub fn from_config(name: &str, config: &JsonValue) -> Result<Self, SchemaError> {
    if name.trim().is_empty() {
      return Err(SchemaError::ValidationError("el nombre del tipo de contenido no puede estar vacío".to_string()));
    }
    let obj = config.as_object().ok_or_else(|| {
                SchemaError::ValidationError(format!("la configuración de '{}' debe ser un objeto", name))
              })?;
    let table = obj.get("tablename").and_then(|v| v.as_str()).unwrap_or("content").to_string();
    let field_value_table =
      obj.get("field_value_table").and_then(|v| v.as_str()).unwrap_or("field_values").to_string();

    let fields_obj = obj.get("fields").and_then(|v| v.as_object()).ok_or_else(|| {
                       SchemaError::ValidationError(format!("el tipo '{}' no declara 'fields'", name))
                     })?;
    let mut fields = IndexMap::new();
    for (field_name, field_cfg) in fields_obj {
      if BASE_COLUMNS.contains(field_name.as_str()) {
        return Err(SchemaError::FieldConfiguration(format!("el campo '{}' de '{}' colisiona con una columna base",
                                                           field_name, name)));
      }
      fields.insert(field_name.clone(), FieldDefinition::from_config(field_name, field_cfg)?);
    }
    if fields.is_empty() {
      return Err(SchemaError::ValidationError(format!("el tipo '{}' no declara ningún campo", name)));
    }
    Ok(Self { name: name.to_string(), table, field_value_table, fields })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Tabla de filas de contenido.
  pub fn table(&self) -> &str {
    &self.table
  }

  /// Tabla de valores hijos para campos repetidores.
  pub fn field_value_table(&self) -> &str {
    &self.field_value_table
  }

  /// Campos declarados, en orden de declaración.
  pub fn fields(&self) -> &IndexMap<String, FieldDefinition> {
    &self.fields
  }

  pub fn field(&self, name: &str) -> Result<&FieldDefinition, SchemaError> {
    self.fields
        .get(name)
        .ok_or_else(|| SchemaError::FieldConfiguration(format!("campo '{}' no declarado en '{}'", name, self.name)))
  }
}

/// Contrato del proveedor de metadatos de esquema: dado un nombre de tipo de
/// contenido devuelve tablas, campos declarados y configuración por campo.
pub trait SchemaMetadata: Send + Sync {
  fn content_type(&self, name: &str) -> Result<&ContentType, SchemaError>;
}

/// Registro de tipos de contenido construido desde un documento JSON
/// (la traducción del fichero de contenttypes que edita el usuario).
#[derive(Debug, Clone, Default)]
pub struct ContentTypeRegistry {
  types: IndexMap<String, ContentType>,
}

impl ContentTypeRegistry {
  pub fn from_json(config: &JsonValue) -> Result<Self, SchemaError> {
    let obj = config.as_object().ok_or_else(|| {
                SchemaError::ValidationError("la configuración de tipos de contenido debe ser un objeto".to_string())
              })?;
    let mut types = IndexMap::new();
    for (name, ct_cfg) in obj {
      types.insert(name.clone(), ContentType::from_config(name, ct_cfg)?);
    }
    Ok(Self { types })
  }

  pub fn from_str(config: &str) -> Result<Self, SchemaError> {
    let value: JsonValue = serde_json::from_str(config)?;
    Self::from_json(&value)
  }

  pub fn iter(&self) -> impl Iterator<Item = &ContentType> {
    self.types.values()
  }

  pub fn len(&self) -> usize {
    self.types.len()
  }

  pub fn is_empty(&self) -> bool {
    self.types.is_empty()
  }
}

impl SchemaMetadata for ContentTypeRegistry {
  fn content_type(&self, name: &str) -> Result<&ContentType, SchemaError> {
    self.types
        .get(name)
        .ok_or_else(|| SchemaError::ValidationError(format!("tipo de contenido desconocido: {}", name)))
  }
}
