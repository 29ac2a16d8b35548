// Ejemplo mínimo: crear un registro con un campo repetidor y volver a
// leerlo usando el repositorio Diesel construido desde el entorno
// (CONTENT_DB_URL o DATABASE_URL).
use content_domain::ContentTypeRegistry;
use fields::{ContentEngine, EntityValue};
use serde_json::json;
use std::error::Error;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn Error>> {
    let registry = ContentTypeRegistry::from_json(&json!({
        "pages": {
            "fields": {
                "title": {"type": "text"},
                "blocks": {
                    "type": "repeater",
                    "fields": {
                        "caption": {"type": "text"}
                    }
                }
            }
        }
    }))?;
    let repo = Arc::new(content_persistence::new_from_env()?);
    let engine = ContentEngine::new(repo.clone(), registry);

    let mut entity = engine.create("pages")?;
    entity.values.insert("title".to_string(), EntityValue::Raw(json!("Desde el ejemplo")));
    entity.values.insert("blocks".to_string(),
                         EntityValue::Raw(json!([{"caption": "primer bloque"}, {"caption": "segundo"}])));
    let id = engine.save(&mut entity)?;
    println!("registro guardado con id {}", id);

    if let Some(mut loaded) = engine.get(id, "pages")? {
        if let Some(collection) = loaded.collection_mut("blocks") {
            let groups = collection.groups(&*repo)?;
            for (grouping, fields) in groups {
                println!("grupo {}: {:?}", grouping, fields.get("caption").map(|v| v.value.to_raw()));
            }
        }
    }
    Ok(())
}
