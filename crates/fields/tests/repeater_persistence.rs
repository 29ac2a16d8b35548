use content_domain::{ContentTypeRegistry, SchemaMetadata};
use fields::{ContentEngine, ContentEntity, EntityValue, FieldManager, FieldValueRepository,
             InMemoryContentRepository, QuerySet, StoredValue};
use serde_json::json;
use std::sync::Arc;

fn registry() -> ContentTypeRegistry {
  ContentTypeRegistry::from_json(&json!({
    "entries": {
      "fields": {
        "blocks": {
          "type": "repeater",
          "fields": {
            "text": {"type": "text"}
          }
        }
      }
    }
  })).expect("configuración de tipos")
}

#[test]
fn fresh_insert_stages_one_deferred_save_and_no_deletes() {
  // escenario: repetidor `blocks` con [{"text":"hello"}] y sin filas previas
  let repo = InMemoryContentRepository::new();
  let registry = registry();
  let ct = registry.content_type("entries").expect("entries");
  let manager = FieldManager::default();
  let handler = manager.get(ct.field("blocks").expect("blocks")).expect("handler");

  let mut entity = ContentEntity::new("entries");
  entity.values.insert("blocks".to_string(), EntityValue::Raw(json!([{"text": "hello"}])));

  let mut queries = QuerySet::new();
  handler.persist(&mut queries, &mut entity, &repo).expect("persist");

  // exactamente un insert encolado, cero borrados
  assert_eq!(queries.pending(), 1);
  assert_eq!(repo.field_value_count(), 0, "nada se escribe antes de conocer el id del padre");

  // el dueño de la escritura confirma el insert del padre con id 42
  queries.complete(1, Some(42), &repo).expect("complete");
  assert_eq!(repo.field_value_count(), 1);
  let existing = repo.get_existing_fields(42, "entries", "blocks").expect("existentes");
  assert_eq!(existing.len(), 1);
  let ids = &existing[&0];
  let rows = repo.load_values(ids).expect("filas");
  assert_eq!(rows[0].content_id, Some(42));
  assert_eq!(rows[0].fieldname, "text");
  assert_eq!(rows[0].value, StoredValue::Text("hello".into()));
}

#[test]
fn failed_parent_write_executes_nothing() {
  let repo = InMemoryContentRepository::new();
  let registry = registry();
  let ct = registry.content_type("entries").expect("entries");
  let manager = FieldManager::default();
  let handler = manager.get(ct.field("blocks").expect("blocks")).expect("handler");

  let mut entity = ContentEntity::new("entries");
  entity.values.insert("blocks".to_string(), EntityValue::Raw(json!([{"text": "hello"}])));

  let mut queries = QuerySet::new();
  handler.persist(&mut queries, &mut entity, &repo).expect("persist");
  assert_eq!(queries.pending(), 1);

  // la escritura del padre falla: se descarta la cola completa
  queries.abort();
  queries.complete(1, Some(42), &repo).expect("complete tras abort");
  assert_eq!(repo.field_value_count(), 0);
}

#[test]
fn templatefields_persist_as_json_without_child_rows() {
  let registry = ContentTypeRegistry::from_json(&json!({
    "pages": {
      "fields": {
        "templatefields": {
          "type": "templatefields",
          "fields": {
            "subtitle": {"type": "text"}
          }
        }
      }
    }
  })).expect("configuración");
  let repo = Arc::new(InMemoryContentRepository::new());
  let engine = ContentEngine::new(repo.clone(), registry);

  let mut entity = engine.create("pages").expect("create");
  entity.values.insert("templatefields".to_string(),
                       EntityValue::Raw(json!([{"subtitle": "hola"}])));
  let id = engine.save(&mut entity).expect("save");

  // sin filas hijas: el documento va en la fila padre
  assert_eq!(repo.field_value_count(), 0);

  let reloaded = engine.get(id, "pages").expect("get").expect("registro");
  let collection = reloaded.collection("templatefields").expect("colección");
  assert_eq!(collection.to_raw_groups(), json!([{"subtitle": "hola"}]));
}

#[test]
fn unknown_inner_field_aborts_only_that_field() {
  let registry = ContentTypeRegistry::from_json(&json!({
    "pages": {
      "fields": {
        "title": {"type": "text"},
        "blocks": {
          "type": "repeater",
          "fields": {"caption": {"type": "text"}}
        }
      }
    }
  })).expect("configuración");
  let repo = InMemoryContentRepository::new();
  let ct = registry.content_type("pages").expect("pages");
  let manager = FieldManager::default();

  let mut entity = ContentEntity::new("pages");
  entity.values.insert("title".to_string(), EntityValue::Raw(json!("Hola")));
  entity.values.insert("blocks".to_string(), EntityValue::Raw(json!([{"desconocido": 1}])));

  let mut queries = QuerySet::new();
  let title = manager.get(ct.field("title").expect("title")).expect("handler título");
  title.persist(&mut queries, &mut entity, &repo).expect("persist título");
  assert_eq!(queries.columns()["title"], json!("Hola"));

  // el campo mal configurado falla sin tocar lo ya preparado por el hermano
  let blocks = manager.get(ct.field("blocks").expect("blocks")).expect("handler blocks");
  assert!(blocks.persist(&mut queries, &mut entity, &repo).is_err());
  assert_eq!(queries.columns()["title"], json!("Hola"));
  assert_eq!(queries.pending(), 0);
}
