use content_domain::ContentTypeRegistry;
use fields::{ContentEngine, EntityValue, FieldValueRepository, InMemoryContentRepository, LoadState, StoredValue};
use serde_json::json;
use std::sync::Arc;

fn registry() -> ContentTypeRegistry {
  ContentTypeRegistry::from_json(&json!({
    "pages": {
      "fields": {
        "title": {"type": "text"},
        "teaser": {"type": "html"},
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
fn hydrate_persist_hydrate_round_trip() {
  let repo = Arc::new(InMemoryContentRepository::new());
  let engine = ContentEngine::new(repo.clone(), registry());

  // crear y guardar un registro con dos grupos
  let mut entity = engine.create("pages").expect("create");
  entity.values.insert("title".to_string(), EntityValue::Raw(json!("Portada")));
  entity.values.insert("blocks".to_string(),
                       EntityValue::Raw(json!([
                         {"caption": "a", "weight": 1},
                         {"caption": "b", "weight": 2}
                       ])));
  let id = engine.save(&mut entity).expect("save");
  assert_eq!(entity.id, Some(id));

  // primera rehidratación: la colección llega perezosa desde los tokens
  let mut loaded = engine.get(id, "pages").expect("get").expect("registro existente");
  assert_eq!(loaded.raw("title"), Some(&json!("Portada")));
  let collection = loaded.collection_mut("blocks").expect("colección");
  assert_eq!(collection.state(), LoadState::Unloaded);
  let groups = collection.groups(&*repo).expect("carga perezosa");
  assert_eq!(groups.len(), 2);
  let ordered: Vec<&StoredValue> = groups.values().map(|g| &g["caption"].value).collect();
  assert_eq!(ordered, vec![&StoredValue::Text("a".into()), &StoredValue::Text("b".into())]);

  // persistir sin cambios y rehidratar: mismos grupos, mismas captions
  engine.save(&mut loaded).expect("save sin cambios");
  let mut again = engine.get(id, "pages").expect("get").expect("registro existente");
  let collection = again.collection_mut("blocks").expect("colección");
  let groups = collection.groups(&*repo).expect("carga");
  assert_eq!(groups.len(), 2);
  assert_eq!(groups.values().map(|g| &g["caption"].value).collect::<Vec<_>>(),
             vec![&StoredValue::Text("a".into()), &StoredValue::Text("b".into())]);
}

#[test]
fn editing_groups_updates_in_place_and_deletes_removed() {
  let repo = Arc::new(InMemoryContentRepository::new());
  let engine = ContentEngine::new(repo.clone(), registry());

  let mut entity = engine.create("pages").expect("create");
  entity.values.insert("blocks".to_string(),
                       EntityValue::Raw(json!([
                         {"caption": "a", "weight": 1},
                         {"caption": "b", "weight": 2}
                       ])));
  let id = engine.save(&mut entity).expect("save");

  let before = repo.get_existing_fields(id, "pages", "blocks").expect("existentes");
  assert_eq!(before.len(), 2);
  let group0_before = before[&0].clone();

  // editar: el grupo 0 cambia de valor, el grupo 1 desaparece
  let mut edited = engine.get(id, "pages").expect("get").expect("registro");
  edited.values.insert("blocks".to_string(), EntityValue::Raw(json!([{"caption": "a2", "weight": 1}])));
  engine.save(&mut edited).expect("save editado");

  let after = repo.get_existing_fields(id, "pages", "blocks").expect("existentes");
  assert_eq!(after.len(), 1);
  // identidad conservada: las filas del grupo 0 mantienen sus ids
  assert_eq!(after[&0], group0_before);

  let mut reloaded = engine.get(id, "pages").expect("get").expect("registro");
  let collection = reloaded.collection_mut("blocks").expect("colección");
  let groups = collection.groups(&*repo).expect("carga");
  assert_eq!(groups[&0]["caption"].value, StoredValue::Text("a2".into()));
  assert_eq!(groups[&0]["weight"].value, StoredValue::Integer(1));
}

#[test]
fn repeater_set_to_null_persists_as_empty() {
  let repo = Arc::new(InMemoryContentRepository::new());
  let engine = ContentEngine::new(repo.clone(), registry());

  let mut entity = engine.create("pages").expect("create");
  entity.values.insert("blocks".to_string(), EntityValue::Raw(json!([{"caption": "a"}])));
  let id = engine.save(&mut entity).expect("save");
  assert!(repo.field_value_count() > 0);

  // volver a null: la colección queda vacía y el guardado borra las filas
  let mut entity = engine.get(id, "pages").expect("get").expect("registro");
  entity.values.insert("blocks".to_string(), EntityValue::Raw(json!(null)));
  engine.save(&mut entity).expect("save vacío");
  assert_eq!(repo.field_value_count(), 0);

  let mut reloaded = engine.get(id, "pages").expect("get").expect("registro");
  let collection = reloaded.collection_mut("blocks").expect("colección");
  assert!(collection.groups(&*repo).expect("carga").is_empty());
}

#[test]
fn relative_order_survives_group_removal() {
  let repo = Arc::new(InMemoryContentRepository::new());
  let engine = ContentEngine::new(repo.clone(), registry());

  let mut entity = engine.create("pages").expect("create");
  entity.values.insert("blocks".to_string(),
                       EntityValue::Raw(json!([
                         {"caption": "a"},
                         {"caption": "b"},
                         {"caption": "c"}
                       ])));
  let id = engine.save(&mut entity).expect("save");

  // quitar el primer grupo; los demás se renumeran pero conservan el orden
  let mut edited = engine.get(id, "pages").expect("get").expect("registro");
  edited.values.insert("blocks".to_string(), EntityValue::Raw(json!([{"caption": "b"}, {"caption": "c"}])));
  engine.save(&mut edited).expect("save");

  let mut reloaded = engine.get(id, "pages").expect("get").expect("registro");
  let collection = reloaded.collection_mut("blocks").expect("colección");
  let groups = collection.groups(&*repo).expect("carga");
  let captions: Vec<&StoredValue> = groups.values().map(|g| &g["caption"].value).collect();
  assert_eq!(captions, vec![&StoredValue::Text("b".into()), &StoredValue::Text("c".into())]);
}

#[test]
fn delete_removes_record_and_child_rows() {
  let repo = Arc::new(InMemoryContentRepository::new());
  let engine = ContentEngine::new(repo.clone(), registry());

  let mut entity = engine.create("pages").expect("create");
  entity.values.insert("blocks".to_string(), EntityValue::Raw(json!([{"caption": "a"}, {"caption": "b"}])));
  let id = engine.save(&mut entity).expect("save");
  assert_eq!(engine.list("pages").expect("list"), vec![id]);
  assert!(repo.field_value_count() > 0);

  engine.delete(&entity).expect("delete");
  assert!(engine.list("pages").expect("list").is_empty());
  assert_eq!(repo.field_value_count(), 0);
  assert!(engine.get(id, "pages").expect("get").is_none());
}

#[test]
fn unknown_content_type_is_an_error() {
  let repo = Arc::new(InMemoryContentRepository::new());
  let engine = ContentEngine::new(repo, registry());
  assert!(engine.create("entries").is_err());
  assert!(engine.load_query("entries").is_err());
}
