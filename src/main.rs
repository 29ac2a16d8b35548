use content_domain::ContentTypeRegistry;
use fields::{ContentEngine, EntityValue};
use serde_json::json;
use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

/// Pequeño menú interactivo para administrar registros de contenido usando
/// el repositorio proporcionado por `content-persistence`.
///
/// Opciones soportadas:
/// 1) Ver registros de un tipo
/// 2) Crear registro (título + bloques)
/// 3) Mostrar registro (hidratado, con sus grupos)
/// 4) Editar bloques de un registro
/// 5) Eliminar registro
/// 6) Salir
fn main() -> Result<(), Box<dyn Error>> {
    // Tipos de contenido de la demo. En una instalación real esto vendría
    // del fichero de configuración del editor.
    let registry = ContentTypeRegistry::from_json(&json!({
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
    }))?;

    // Inicializar repo (aplica migraciones embebidas si procede)
    let repo = Arc::new(content_persistence::new_from_env().map_err(|e| Box::new(e) as Box<dyn Error>)?);
    let engine = ContentEngine::new(repo.clone(), registry);

    loop {
        println!("\n== Content CLI menu ==");
        println!("1) Ver registros de 'pages'");
        println!("2) Crear registro");
        println!("3) Mostrar registro");
        println!("4) Editar bloques de un registro");
        println!("5) Eliminar registro");
        println!("6) Salir");
        print!("Elige una opción: ");
        io::stdout().flush().ok();

        let mut choice = String::new();
        io::stdin().read_line(&mut choice)?;
        match choice.trim() {
            "1" => {
                match engine.list("pages") {
                    Ok(ids) if ids.is_empty() => println!("(sin registros)"),
                    Ok(ids) => {
                        println!("\nID");
                        println!("----");
                        for id in ids {
                            println!("{}", id);
                        }
                    }
                    Err(e) => eprintln!("Error listando registros: {}", e),
                }
            }
            "2" => {
                let title = prompt("Título: ")?;
                let blocks = prompt("Bloques (JSON, ej: [{\"caption\":\"hola\",\"weight\":1}], enter para ninguno): ")?;
                let mut entity = match engine.create("pages") {
                    Ok(e) => e,
                    Err(e) => { eprintln!("Error creando entidad: {}", e); continue; }
                };
                entity.values.insert("title".to_string(), EntityValue::Raw(json!(title.trim())));
                if !blocks.trim().is_empty() {
                    match serde_json::from_str(blocks.trim()) {
                        Ok(parsed) => { entity.values.insert("blocks".to_string(), EntityValue::Raw(parsed)); }
                        Err(e) => { eprintln!("JSON inválido: {}", e); continue; }
                    }
                }
                match engine.save(&mut entity) {
                    Ok(id) => println!("Registro creado: {}", id),
                    Err(e) => eprintln!("Error guardando registro: {}", e),
                }
            }
            "3" => {
                let id = match prompt_id()? { Some(id) => id, None => continue };
                match engine.get(id, "pages") {
                    Ok(Some(mut entity)) => {
                        println!("title: {}", entity.raw("title").cloned().unwrap_or(json!(null)));
                        if let Some(collection) = entity.collection_mut("blocks") {
                            match collection.groups(&*repo) {
                                Ok(groups) if groups.is_empty() => println!("blocks: (vacío)"),
                                Ok(groups) => {
                                    for (grouping, fields) in groups {
                                        let resumen: Vec<String> =
                                            fields.iter()
                                                  .map(|(name, v)| format!("{}={}", name, v.value.to_raw()))
                                                  .collect();
                                        println!("blocks[{}]: {}", grouping, resumen.join(", "));
                                    }
                                }
                                Err(e) => eprintln!("Error cargando bloques: {}", e),
                            }
                        }
                    }
                    Ok(None) => println!("No existe el registro {}", id),
                    Err(e) => eprintln!("Error leyendo registro: {}", e),
                }
            }
            "4" => {
                let id = match prompt_id()? { Some(id) => id, None => continue };
                let blocks = prompt("Bloques nuevos (JSON): ")?;
                let parsed: serde_json::Value = match serde_json::from_str(blocks.trim()) {
                    Ok(v) => v,
                    Err(e) => { eprintln!("JSON inválido: {}", e); continue; }
                };
                match engine.get(id, "pages") {
                    Ok(Some(mut entity)) => {
                        entity.values.insert("blocks".to_string(), EntityValue::Raw(parsed));
                        match engine.save(&mut entity) {
                            Ok(_) => println!("Registro {} actualizado", id),
                            Err(e) => eprintln!("Error guardando: {}", e),
                        }
                    }
                    Ok(None) => println!("No existe el registro {}", id),
                    Err(e) => eprintln!("Error leyendo registro: {}", e),
                }
            }
            "5" => {
                let id = match prompt_id()? { Some(id) => id, None => continue };
                let confirm = prompt(&format!("Confirma borrado de {}? escribir 'yes' para confirmar: ", id))?;
                if confirm.trim().to_lowercase() == "yes" {
                    match engine.get(id, "pages") {
                        Ok(Some(entity)) => match engine.delete(&entity) {
                            Ok(()) => println!("Registro eliminado: {}", id),
                            Err(e) => eprintln!("Error eliminando registro: {}", e),
                        },
                        Ok(None) => println!("No existe el registro {}", id),
                        Err(e) => eprintln!("Error leyendo registro: {}", e),
                    }
                } else {
                    println!("Borrado cancelado");
                }
            }
            "6" => {
                println!("Saliendo...");
                break;
            }
            other => {
                println!("Opción inválida: {}", other);
            }
        }
    }

    Ok(())
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}

fn prompt_id() -> io::Result<Option<i64>> {
    let id_s = prompt("Id del registro: ")?;
    match id_s.trim().parse::<i64>() {
        Ok(id) => Ok(Some(id)),
        Err(_) => { eprintln!("Id inválido"); Ok(None) }
    }
}
