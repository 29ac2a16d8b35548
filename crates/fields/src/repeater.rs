// Archivo: repeater.rs
// Propósito: handler de campos repetidores. Cubre el ciclo completo:
// subconsulta agregada en la carga, hidratación (perezosa o desde JSON),
// normalización a colección canónica y persistencia por reconciliación con
// acciones diferidas.
use crate::collection::{proposed_groups_from_raw, RepeatingFieldCollection};
use crate::domain::{ContentEntity, EntityValue, RawRow};
use crate::errors::{FieldError, Result};
use crate::field_type::{set_collection, FieldType};
use crate::query::{decode_aggregate, platform_group_concat, SelectQuery};
use crate::queryset::{DeferredAction, QuerySet};
use crate::repository::FieldValueRepository;
use content_domain::{ContentType, FieldDefinition};
use serde_json::Value as JsonValue;

/// Handler de campos repetidores. La variante `templatefields` comparte la
/// hidratación pero persiste como documento JSON en la fila padre, sin filas
/// hijas.
pub struct RepeaterType {
    def: FieldDefinition,
}

impl RepeaterType {
    pub fn new(def: FieldDefinition) -> Self {
        Self { def }
    }

    fn empty_collection(&self, entity: &ContentEntity) -> RepeatingFieldCollection {
        RepeatingFieldCollection::new(&entity.contenttype, self.fieldname())
    }

    fn collection_from_raw(&self, entity: &ContentEntity, raw: &JsonValue) -> Result<RepeatingFieldCollection> {
        let mut collection = self.empty_collection(entity);
        for (grouping, fields) in proposed_groups_from_raw(raw)? {
            collection.add_from_array(&fields, grouping, self.def.fields())?;
        }
        Ok(collection)
    }
}

impl FieldType for RepeaterType {
    fn definition(&self) -> &FieldDefinition {
        &self.def
    }

    /// Añade a la consulta de carga una subconsulta correlacionada que
    /// agrega las referencias a filas hijas en una sola columna por campo
    /// repetidor. La variante JSON no necesita nada: su columna viaja con la
    /// fila base.
    fn load(&self, query: &mut dyn SelectQuery, content_type: &ContentType) -> Result<()> {
        if self.def.is_template_fields() {
            return Ok(());
        }
        let field = self.fieldname();
        let table = content_type.field_value_table();
        let alias = query.from_alias().to_string();
        let aggregate = platform_group_concat(query.backend())?;
        let subquery = format!("(SELECT {} FROM {} f WHERE f.content_id = {}.id AND f.contenttype='{}' AND f.name \
                                = '{}') as {}",
                               aggregate, table, alias, content_type.name(), field, field);
        query.add_select(subquery);
        Ok(())
    }

    /// Hidrata la colección desde la fila cruda.
    ///
    /// - sin valor: colección vacía (nunca un campo ausente);
    /// - valor JSON (variante templatefields o columna JSON nativa): los
    ///   grupos se decodifican directamente;
    /// - cadena agregada `nombre_grupo_id,...`: se registran referencias por
    ///   grupo y la carga de las filas hijas se difiere al primer acceso.
    fn hydrate(&self, row: &RawRow, entity: &mut ContentEntity) -> Result<()> {
        let key = self.fieldname().to_string();
        let raw = match row.get(&key) {
            None | Some(JsonValue::Null) => {
                let collection = self.empty_collection(entity);
                set_collection(entity, &key, collection);
                return Ok(());
            }
            Some(v) => v.clone(),
        };

        let collection = match &raw {
            JsonValue::String(s) => match serde_json::from_str::<JsonValue>(s) {
                Ok(decoded) if decoded.is_array() || decoded.is_object() => {
                    self.collection_from_raw(entity, &decoded)?
                }
                _ => {
                    let mut collection = self.empty_collection(entity);
                    for (grouping, ids) in decode_aggregate(s)? {
                        collection.add_from_references(&ids, grouping);
                    }
                    collection
                }
            },
            JsonValue::Array(_) | JsonValue::Object(_) => self.collection_from_raw(entity, &raw)?,
            other => {
                return Err(FieldError::Validation(format!("valor de repetidor no reconocido para '{}': {}",
                                                          key, other)))
            }
        };
        set_collection(entity, &key, collection);
        Ok(())
    }

    /// Normaliza el valor del campo a colección canónica. Idempotente: una
    /// colección ya canónica no se toca; un mapa crudo `grupo -> campos` se
    /// convierte; la ausencia se vuelve colección vacía.
    fn normalize(&self, entity: &mut ContentEntity) -> Result<()> {
        let key = self.fieldname().to_string();
        match entity.values.get(&key) {
            Some(EntityValue::Collection(_)) => Ok(()),
            Some(EntityValue::Raw(raw)) => {
                let raw = raw.clone();
                let collection = self.collection_from_raw(entity, &raw)?;
                set_collection(entity, &key, collection);
                Ok(())
            }
            None => {
                let collection = self.empty_collection(entity);
                set_collection(entity, &key, collection);
                Ok(())
            }
        }
    }

    /// Persiste el campo: normaliza, carga el estado existente del registro,
    /// reconcilia el propuesto contra él y encola las acciones diferidas. El
    /// `content_id` de las filas nuevas queda pendiente hasta que el dueño de
    /// la escritura conozca el id generado del padre.
    fn persist(&self, queries: &mut QuerySet, entity: &mut ContentEntity, repo: &dyn FieldValueRepository)
               -> Result<()> {
        self.normalize(entity)?;
        let key = self.fieldname().to_string();
        let contenttype = entity.contenttype.clone();

        // el propuesto puede venir de una hidratación perezosa sin leer aún
        if let Some(collection) = entity.collection_mut(&key) {
            collection.ensure_loaded(repo)?;
        }
        let proposed = entity.collection(&key)
                             .cloned()
                             .unwrap_or_else(|| RepeatingFieldCollection::new(&contenttype, &key));

        if self.def.is_template_fields() {
            queries.set_column(&key, proposed.to_raw_groups());
            return Ok(());
        }

        let mut existing = RepeatingFieldCollection::new(&contenttype, &key);
        if let Some(content_id) = entity.id {
            for (grouping, ids) in repo.get_existing_fields(content_id, &contenttype, &key)? {
                existing.add_from_references(&ids, grouping);
            }
        }
        existing.ensure_loaded(repo)?;

        let deleted = existing.update(&proposed)?;
        for value in existing.values() {
            let mut value = value.clone();
            if value.content_id.is_none() {
                value.content_id = entity.id;
            }
            let update = value.id.is_some();
            queries.on_result(DeferredAction::SaveValue { value, update });
        }
        for value in deleted {
            queries.on_result(DeferredAction::DeleteValue { value });
        }

        // la entidad se queda con el estado reconciliado (ids arrastrados)
        set_collection(entity, &key, existing);
        Ok(())
    }

    /// Un repetidor nunca queda sin valor: asignar null deja una colección
    /// vacía en su lugar.
    fn set(&self, entity: &mut ContentEntity, value: Option<JsonValue>) -> Result<()> {
        match value {
            None | Some(JsonValue::Null) => {
                let collection = self.empty_collection(entity);
                set_collection(entity, self.fieldname(), collection);
            }
            Some(v) => {
                entity.values.insert(self.fieldname().to_string(), EntityValue::Raw(v));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::LoadState;
    use crate::field_type::FieldManager;
    use content_domain::{ContentTypeRegistry, SchemaMetadata};
    use serde_json::json;

    fn blocks_def() -> FieldDefinition {
        let registry = ContentTypeRegistry::from_json(&json!({
            "pages": {
                "fields": {
                    "blocks": {
                        "type": "repeater",
                        "fields": {
                            "caption": {"type": "text"},
                            "weight": {"type": "integer"}
                        }
                    }
                }
            }
        })).expect("config");
        registry.content_type("pages").expect("pages").field("blocks").expect("blocks").clone()
    }

    #[test]
    fn set_null_leaves_an_empty_collection() {
        let handler = RepeaterType::new(blocks_def());
        let mut entity = ContentEntity::new("pages");
        handler.set(&mut entity, None).unwrap();
        let collection = entity.collection("blocks").expect("colección presente");
        assert!(collection.is_empty());

        handler.set(&mut entity, Some(JsonValue::Null)).unwrap();
        assert!(entity.collection("blocks").expect("colección presente").is_empty());
    }

    #[test]
    fn hydrate_missing_value_yields_empty_collection() {
        let handler = RepeaterType::new(blocks_def());
        let mut entity = ContentEntity::new("pages");
        handler.hydrate(&RawRow::new(), &mut entity).unwrap();
        let collection = entity.collection("blocks").expect("colección presente");
        assert!(collection.is_empty());
        assert_eq!(collection.state(), LoadState::Loaded);
    }

    #[test]
    fn hydrate_aggregate_tokens_stays_lazy() {
        let handler = RepeaterType::new(blocks_def());
        let mut entity = ContentEntity::new("pages");
        let mut row = RawRow::new();
        row.insert("blocks".to_string(), json!("caption_0_17,weight_0_18,caption_1_19"));
        handler.hydrate(&row, &mut entity).unwrap();
        let collection = entity.collection("blocks").expect("colección presente");
        assert_eq!(collection.state(), LoadState::Unloaded);
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn hydrate_json_string_decodes_groups_directly() {
        let handler = RepeaterType::new(blocks_def());
        let mut entity = ContentEntity::new("pages");
        let mut row = RawRow::new();
        row.insert("blocks".to_string(), json!("[{\"caption\":\"a\"},{\"caption\":\"b\"}]"));
        handler.hydrate(&row, &mut entity).unwrap();
        let collection = entity.collection("blocks").expect("colección presente");
        assert_eq!(collection.state(), LoadState::Loaded);
        assert_eq!(collection.loaded_groups().len(), 2);
        assert_eq!(collection.to_raw_groups(), json!([{"caption": "a"}, {"caption": "b"}]));
    }

    #[test]
    fn normalize_is_idempotent() {
        let handler = RepeaterType::new(blocks_def());
        let mut entity = ContentEntity::new("pages");
        entity.values.insert("blocks".to_string(), EntityValue::Raw(json!([{"caption": "a"}])));
        handler.normalize(&mut entity).unwrap();
        let first = entity.collection("blocks").expect("colección").to_raw_groups();
        handler.normalize(&mut entity).unwrap();
        let second = entity.collection("blocks").expect("colección").to_raw_groups();
        assert_eq!(first, second);
    }

    #[test]
    fn load_appends_the_aggregate_subquery() {
        let registry = ContentTypeRegistry::from_json(&json!({
            "pages": {
                "fields": {
                    "blocks": {
                        "type": "repeater",
                        "fields": {"caption": {"type": "text"}}
                    }
                }
            }
        })).expect("config");
        let ct = registry.content_type("pages").expect("pages");
        let manager = FieldManager::default();
        let handler = manager.get(ct.field("blocks").expect("blocks")).expect("handler");

        let mut query = crate::query::SqlSelect::new("sqlite", "content");
        handler.load(&mut query, ct).unwrap();
        let sql = query.to_sql();
        assert!(sql.contains("GROUP_CONCAT(DISTINCT f.fieldname||'_'||f.grouping||'_'||f.id)"), "sql: {}", sql);
        assert!(sql.contains("FROM field_values f"), "sql: {}", sql);
        assert!(sql.contains("f.name = 'blocks'"), "sql: {}", sql);
        assert!(sql.ends_with("as blocks FROM content"), "sql: {}", sql);
    }

    #[test]
    fn load_fails_fatally_on_unknown_backend() {
        let registry = ContentTypeRegistry::from_json(&json!({
            "pages": {
                "fields": {
                    "blocks": {"type": "repeater", "fields": {"caption": {"type": "text"}}}
                }
            }
        })).expect("config");
        let ct = registry.content_type("pages").expect("pages");
        let handler = RepeaterType::new(ct.field("blocks").expect("blocks").clone());

        let mut query = crate::query::SqlSelect::new("oracle", "content");
        let before = query.selects().len();
        let err = handler.load(&mut query, ct).unwrap_err();
        assert!(matches!(err, FieldError::UnsupportedBackend(_)));
        // sin SQL parcial: la lista de selección no cambió
        assert_eq!(query.selects().len(), before);
    }
}
