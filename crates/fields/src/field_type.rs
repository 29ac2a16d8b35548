// Archivo: field_type.rs
// Propósito: el contrato polimórfico de los tipos de campo (las cuatro
// operaciones del ciclo de vida más `set`), los handlers escalares y el
// registro que resuelve discriminadores a handlers.
use crate::collection::RepeatingFieldCollection;
use crate::domain::{ContentEntity, EntityValue, RawRow, StoredValue};
use crate::errors::{FieldError, Result};
use crate::query::SelectQuery;
use crate::queryset::QuerySet;
use crate::repeater::RepeaterType;
use crate::repository::FieldValueRepository;
use content_domain::{ContentType, FieldDefinition, StorageKind};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Contrato de un tipo de campo. El almacén invoca las operaciones en puntos
/// fijos del ciclo de vida: `load` antes de la consulta, `hydrate` tras leer
/// la fila, `persist` antes de guardar y `normalize` donde haga falta la
/// forma canónica.
pub trait FieldType {
    /// Definición declarada del campo que maneja esta instancia.
    fn definition(&self) -> &FieldDefinition;

    /// Nombre del campo (atajo sobre la definición).
    fn fieldname(&self) -> &str {
        self.definition().name()
    }

    /// Tipo de almacenamiento declarado.
    fn storage(&self) -> StorageKind {
        self.definition().storage()
    }

    /// Paso pre-consulta. Para campos escalares es un no-op: la columna ya
    /// viene seleccionada con la fila base.
    fn load(&self, _query: &mut dyn SelectQuery, _content_type: &ContentType) -> Result<()> {
        Ok(())
    }

    /// Paso post-lectura: puebla el campo de la entidad desde la fila cruda,
    /// decodificando según el tipo de almacenamiento.
    fn hydrate(&self, row: &RawRow, entity: &mut ContentEntity) -> Result<()> {
        let key = self.fieldname();
        let raw = match row.get(key) {
            None | Some(JsonValue::Null) => {
                entity.values.insert(key.to_string(), EntityValue::Raw(JsonValue::Null));
                return Ok(());
            }
            Some(v) => v,
        };
        let canonical = StoredValue::from_raw(self.storage(), raw)?.to_raw();
        entity.values.insert(key.to_string(), EntityValue::Raw(canonical));
        Ok(())
    }

    /// Paso pre-guardado: normaliza y prepara la escritura en el `QuerySet`.
    fn persist(&self, queries: &mut QuerySet, entity: &mut ContentEntity, repo: &dyn FieldValueRepository)
               -> Result<()>;

    /// Asegura la forma canónica del valor en la entidad. Idempotente.
    fn normalize(&self, _entity: &mut ContentEntity) -> Result<()> {
        Ok(())
    }

    /// Asigna un valor al campo de la entidad (lo usa el constructor de
    /// entidades). Por defecto guarda el valor crudo tal cual.
    fn set(&self, entity: &mut ContentEntity, value: Option<JsonValue>) -> Result<()> {
        entity.values.insert(self.fieldname().to_string(), EntityValue::Raw(value.unwrap_or(JsonValue::Null)));
        Ok(())
    }
}

/// Handler de los campos escalares (texto, entero, flotante, fecha).
pub struct ScalarType {
    def: FieldDefinition,
}

impl ScalarType {
    pub fn new(def: FieldDefinition) -> Self {
        Self { def }
    }
}

impl FieldType for ScalarType {
    fn definition(&self) -> &FieldDefinition {
        &self.def
    }

    fn persist(&self, queries: &mut QuerySet, entity: &mut ContentEntity, _repo: &dyn FieldValueRepository)
               -> Result<()> {
        self.normalize(entity)?;
        let key = self.fieldname();
        let raw = entity.raw(key).cloned().unwrap_or(JsonValue::Null);
        let canonical = if raw.is_null() {
            JsonValue::Null
        } else {
            StoredValue::from_raw(self.storage(), &raw)?.to_raw()
        };
        queries.set_column(key, canonical);
        Ok(())
    }
}

/// Handler de campos de documento JSON: la fila guarda el documento completo
/// en la columna JSON, sin filas hijas.
pub struct JsonType {
    def: FieldDefinition,
}

impl JsonType {
    pub fn new(def: FieldDefinition) -> Self {
        Self { def }
    }
}

impl FieldType for JsonType {
    fn definition(&self) -> &FieldDefinition {
        &self.def
    }

    fn hydrate(&self, row: &RawRow, entity: &mut ContentEntity) -> Result<()> {
        let key = self.fieldname();
        let decoded = match row.get(key) {
            None | Some(JsonValue::Null) => JsonValue::Null,
            // la columna puede llegar como texto JSON según el backend
            Some(JsonValue::String(s)) => serde_json::from_str(s).unwrap_or(JsonValue::String(s.clone())),
            Some(other) => other.clone(),
        };
        entity.values.insert(key.to_string(), EntityValue::Raw(decoded));
        Ok(())
    }

    fn persist(&self, queries: &mut QuerySet, entity: &mut ContentEntity, _repo: &dyn FieldValueRepository)
               -> Result<()> {
        let key = self.fieldname();
        let raw = entity.raw(key).cloned().unwrap_or(JsonValue::Null);
        queries.set_column(key, raw);
        Ok(())
    }
}

type HandlerBuilder = fn(FieldDefinition) -> Box<dyn FieldType>;

/// Registro de handlers: resuelve el discriminador declarado de un campo a
/// una instancia de handler. Un discriminador sin registrar es un error de
/// configuración que aborta el procesamiento de ese campo (los hermanos ya
/// procesados no se ven afectados).
pub struct FieldManager {
    builders: HashMap<String, HandlerBuilder>,
}

impl FieldManager {
    pub fn empty() -> Self {
        Self { builders: HashMap::new() }
    }

    pub fn register(&mut self, field_type: &str, builder: HandlerBuilder) {
        self.builders.insert(field_type.to_string(), builder);
    }

    pub fn get(&self, def: &FieldDefinition) -> Result<Box<dyn FieldType>> {
        let builder = self.builders.get(def.field_type()).ok_or_else(|| {
                          FieldError::Configuration(format!("tipo de campo sin handler: '{}'", def.field_type()))
                      })?;
        Ok(builder(def.clone()))
    }
}

impl Default for FieldManager {
    fn default() -> Self {
        let mut manager = Self::empty();
        for scalar in ["text", "html", "textarea", "integer", "float", "date", "datetime"] {
            manager.register(scalar, |def| Box::new(ScalarType::new(def)));
        }
        manager.register("json", |def| Box::new(JsonType::new(def)));
        manager.register("repeater", |def| Box::new(RepeaterType::new(def)));
        manager.register("templatefields", |def| Box::new(RepeaterType::new(def)));
        manager
    }
}

/// Helper compartido por los handlers repetidores: inserta una colección en
/// la entidad.
pub(crate) fn set_collection(entity: &mut ContentEntity, key: &str, collection: RepeatingFieldCollection) {
    entity.values.insert(key.to_string(), EntityValue::Collection(collection));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stubs::InMemoryContentRepository;
    use content_domain::{ContentTypeRegistry, SchemaMetadata};
    use serde_json::json;

    fn title_def() -> FieldDefinition {
        let registry = ContentTypeRegistry::from_json(&json!({
            "pages": {"fields": {"title": {"type": "text"}, "weight": {"type": "integer"}}}
        })).expect("config");
        registry.content_type("pages").expect("pages").field("title").expect("title").clone()
    }

    #[test]
    fn unresolved_field_type_is_configuration_error() {
        let manager = FieldManager::default();
        let def = FieldDefinition::from_config("place", &json!({"type": "geolocation", "storage": "json"}))
            .expect("def");
        match manager.get(&def) {
            Err(FieldError::Configuration(_)) => {}
            other => panic!("se esperaba error de configuración, hubo {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn scalar_hydrate_and_persist_round_trip() {
        let repo = InMemoryContentRepository::new();
        let manager = FieldManager::default();
        let handler = manager.get(&title_def()).expect("handler");

        let mut row = RawRow::new();
        row.insert("title".to_string(), json!("Hola"));
        let mut entity = ContentEntity::new("pages");
        handler.hydrate(&row, &mut entity).unwrap();
        assert_eq!(entity.raw("title"), Some(&json!("Hola")));

        let mut queries = QuerySet::new();
        handler.persist(&mut queries, &mut entity, &repo).unwrap();
        assert_eq!(queries.columns()["title"], json!("Hola"));
    }

    #[test]
    fn scalar_set_defaults_to_null() {
        let manager = FieldManager::default();
        let handler = manager.get(&title_def()).expect("handler");
        let mut entity = ContentEntity::new("pages");
        handler.set(&mut entity, None).unwrap();
        assert_eq!(entity.raw("title"), Some(&JsonValue::Null));
    }
}
