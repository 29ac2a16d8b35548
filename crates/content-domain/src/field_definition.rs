// field_definition.rs
use crate::{SchemaError, StorageKind};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::fmt;

/// Definición de un campo declarado en un tipo de contenido: nombre, tipo
/// (discriminador resuelto más tarde contra el registro de handlers), tipo de
/// almacenamiento y, para campos repetidores, los sub-campos del grupo.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
  name: String,
  field_type: String,
  storage: StorageKind,
  fields: IndexMap<String, FieldDefinition>,
}

impl FieldDefinition {
  pub fn new(name: &str, field_type: &str) -> Result<Self, SchemaError> {
    validate_field_name(name)?;
    if field_type.trim().is_empty() {
      return Err(SchemaError::FieldConfiguration(format!("el campo '{}' no declara tipo", name)));
    }
    let storage = StorageKind::default_for(field_type).ok_or_else(|| {
                    SchemaError::FieldConfiguration(format!("el campo '{}' usa el tipo '{}' sin almacenamiento \
                                                             conocido; declare 'storage' explícito",
                                                            name, field_type))
                  })?;
    Ok(Self { name: name.to_string(), field_type: field_type.to_string(), storage, fields: IndexMap::new() })
  }

  /// Construye la definición desde el documento JSON de configuración:
  /// `{ "type": "repeater", "fields": { "caption": { "type": "text" } } }`.
  pub fn from_config(name: &str, config: &JsonValue) -> Result<Self, SchemaError> {
    validate_field_name(name)?;
    let obj = config.as_object().ok_or_else(|| {
                SchemaError::FieldConfiguration(format!("la configuración del campo '{}' debe ser un objeto", name))
              })?;
    let field_type = obj.get("type")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                          SchemaError::FieldConfiguration(format!("el campo '{}' no declara 'type'", name))
                        })?
                        .to_string();
    let storage = match obj.get("storage").and_then(|v| v.as_str()) {
      Some(s) => StorageKind::parse(s)?,
      None => StorageKind::default_for(&field_type).ok_or_else(|| {
                SchemaError::FieldConfiguration(format!("el campo '{}' usa el tipo '{}' sin almacenamiento \
                                                         conocido; declare 'storage' explícito",
                                                        name, field_type))
              })?,
    };

    let mut fields = IndexMap::new();
    if let Some(inner) = obj.get("fields") {
      let inner_obj = inner.as_object().ok_or_else(|| {
                        SchemaError::FieldConfiguration(format!("'fields' del campo '{}' debe ser un objeto", name))
                      })?;
      for (inner_name, inner_cfg) in inner_obj {
        let def = FieldDefinition::from_config(inner_name, inner_cfg)?;
        if def.is_repeating() {
          // Un solo nivel de anidamiento: los grupos no contienen repetidores.
          return Err(SchemaError::FieldConfiguration(format!("el sub-campo '{}' de '{}' no puede ser repetidor",
                                                             inner_name, name)));
        }
        fields.insert(inner_name.clone(), def);
      }
    }

    let def = Self { name: name.to_string(), field_type, storage, fields };
    if def.is_repeating() && def.fields.is_empty() {
      return Err(SchemaError::FieldConfiguration(format!("el campo repetidor '{}' no declara sub-campos", name)));
    }
    Ok(def)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn field_type(&self) -> &str {
    &self.field_type
  }

  pub fn storage(&self) -> StorageKind {
    self.storage
  }

  /// Sub-campos de un grupo (vacío para campos escalares).
  pub fn fields(&self) -> &IndexMap<String, FieldDefinition> {
    &self.fields
  }

  pub fn is_repeating(&self) -> bool {
    self.field_type == "repeater"
  }

  /// Variante repetidor-en-JSON: se hidrata como un repetidor pero persiste
  /// como documento JSON en la fila del contenido.
  pub fn is_template_fields(&self) -> bool {
    self.field_type == "templatefields"
  }
}

impl fmt::Display for FieldDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({}/{})", self.name, self.field_type, self.storage)
  }
}

/// Los nombres viajan por el cable como `nombre_grupo_id` separados por comas,
/// sin escape. La restricción se impone aquí: nada de comas y ningún sufijo
/// `_<dígitos>` que haría ambiguo el decodificado.
fn validate_field_name(name: &str) -> Result<(), SchemaError> {
  if name.trim().is_empty() {
    return Err(SchemaError::ValidationError("el nombre de campo no puede estar vacío".to_string()));
  }
  if name.contains(',') {
    return Err(SchemaError::FieldConfiguration(format!("el nombre de campo '{}' no puede contener comas", name)));
  }
  if let Some((_, tail)) = name.rsplit_once('_') {
    if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
      return Err(SchemaError::FieldConfiguration(format!("el nombre de campo '{}' no puede terminar en '_<dígitos>'",
                                                         name)));
    }
  }
  Ok(())
}
