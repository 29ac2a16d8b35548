use content_domain::ContentTypeRegistry;
use fields::{ContentEngine, EntityValue, FieldValueRepository, StoredValue};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn registry() -> ContentTypeRegistry {
  ContentTypeRegistry::from_json(&json!({
    "pages": {
      "fields": {
        "title": {"type": "text"},
        "blocks": {
          "type": "repeater",
          "fields": {
            "caption": {"type": "text"},
            "weight": {"type": "integer"}
          }
        }
      }
    }
  })).expect("configuración de tipos")
}

#[test]
fn diesel_content_persistence_record_lifecycle() {
  // Use a temporary file-backed SQLite DB for tests to avoid URI parsing
  // options problems with different sqlite builds.
  let tmp_path = std::env::temp_dir().join(format!("content_test_{}.db", Uuid::new_v4()));
  let db_url = tmp_path.to_str().unwrap().to_string();
  std::env::set_var("CONTENT_DB_URL", &db_url);
  // If crate was built with the `pg` feature, skip this sqlite-only test at
  // runtime.
  if cfg!(feature = "pg") {
    eprintln!("skipping sqlite-only persistence test because 'pg' feature is enabled");
    return;
  }
  let repo = Arc::new(content_persistence::new_from_env().expect("failed to create repo"));
  let engine = ContentEngine::new(repo.clone(), registry());

  // crear un registro con dos grupos de bloques
  let mut entity = engine.create("pages").expect("create");
  entity.values.insert("title".to_string(), EntityValue::Raw(json!("Portada")));
  entity.values.insert("blocks".to_string(),
                       EntityValue::Raw(json!([
                         {"caption": "a", "weight": 1},
                         {"caption": "b", "weight": 2}
                       ])));
  let id = engine.save(&mut entity).expect("save");

  // rehidratar: la colección llega perezosa y se materializa al leerla
  let mut loaded = engine.get(id, "pages").expect("get").expect("registro existente");
  assert_eq!(loaded.raw("title"), Some(&json!("Portada")));
  let collection = loaded.collection_mut("blocks").expect("colección");
  let groups = collection.groups(&*repo).expect("carga perezosa");
  assert_eq!(groups.len(), 2);
  assert_eq!(groups[&0]["caption"].value, StoredValue::Text("a".into()));
  assert_eq!(groups[&1]["weight"].value, StoredValue::Integer(2));

  // editar: cambia el grupo 0, desaparece el grupo 1; los ids del grupo 0 se
  // conservan (update en sitio, no delete+insert)
  let before = repo.get_existing_fields(id, "pages", "blocks").expect("existentes");
  let group0_before = before[&0].clone();
  let mut edited = engine.get(id, "pages").expect("get").expect("registro");
  edited.values.insert("blocks".to_string(), EntityValue::Raw(json!([{"caption": "a2", "weight": 1}])));
  engine.save(&mut edited).expect("save editado");
  let after = repo.get_existing_fields(id, "pages", "blocks").expect("existentes");
  assert_eq!(after.len(), 1);
  assert_eq!(after[&0], group0_before);

  let mut reloaded = engine.get(id, "pages").expect("get").expect("registro");
  let collection = reloaded.collection_mut("blocks").expect("colección");
  let groups = collection.groups(&*repo).expect("carga");
  assert_eq!(groups[&0]["caption"].value, StoredValue::Text("a2".into()));

  // borrar el registro elimina también las filas hijas
  engine.delete(&reloaded).expect("delete");
  assert!(engine.get(id, "pages").expect("get").is_none());
  assert!(repo.get_existing_fields(id, "pages", "blocks").expect("existentes").is_empty());

  // Cleanup temporary DB file
  let _ = std::fs::remove_file(tmp_path);
}

// Sólo compila sin el backend Postgres: usa el helper SQLite explícito.
#[cfg(not(feature = "pg"))]
#[test]
fn diesel_typed_columns_round_trip() {
  let tmp_path = std::env::temp_dir().join(format!("content_test_{}.db", Uuid::new_v4()));
  let db_url = tmp_path.to_str().unwrap().to_string();
  let repo = Arc::new(content_persistence::new_sqlite_for_test(&db_url));
  let registry = ContentTypeRegistry::from_json(&json!({
    "entries": {
      "fields": {
        "items": {
          "type": "repeater",
          "fields": {
            "label": {"type": "text"},
            "count": {"type": "integer"},
            "ratio": {"type": "float"},
            "when": {"type": "date"},
            "extra": {"type": "json"}
          }
        }
      }
    }
  })).expect("configuración");
  let engine = ContentEngine::new(repo.clone(), registry);

  let mut entity = engine.create("entries").expect("create");
  entity.values.insert("items".to_string(),
                       EntityValue::Raw(json!([{
                         "label": "uno",
                         "count": 3,
                         "ratio": 0.5,
                         "when": "2026-08-04",
                         "extra": {"k": true}
                       }])));
  let id = engine.save(&mut entity).expect("save");

  let mut loaded = engine.get(id, "entries").expect("get").expect("registro");
  let collection = loaded.collection_mut("items").expect("colección");
  let groups = collection.groups(&*repo).expect("carga");
  let group = &groups[&0];
  assert_eq!(group["label"].value, StoredValue::Text("uno".into()));
  assert_eq!(group["count"].value, StoredValue::Integer(3));
  assert_eq!(group["ratio"].value, StoredValue::Float(0.5));
  assert!(matches!(group["when"].value, StoredValue::Date(_)));
  assert_eq!(group["extra"].value, StoredValue::Json(json!({"k": true})));

  let _ = std::fs::remove_file(tmp_path);
}
