// Archivo: collection.rs
// Propósito: la colección de campos repetidores: contenedor ordenado y
// agrupado de valores, con carga perezosa explícita y la reconciliación del
// estado propuesto contra el estado persistido.
use crate::domain::{FieldValue, StoredValue};
use crate::errors::{FieldError, Result};
use crate::repository::FieldValueRepository;
use content_domain::FieldDefinition;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Estado de la carga perezosa de una colección hidratada por referencias.
/// El punto de suspensión es explícito: el primer acceso al contenido hace
/// el fetch (síncrono) y lo cachea; repetir es un no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

/// Colección ordenada de grupos de un campo repetidor.
///
/// Mapa `índice de grupo -> (nombre de sub-campo -> FieldValue)`. Nunca es
/// nula sobre una entidad: la ausencia de valor se representa con una
/// colección vacía. Los índices de grupo son contiguos sólo por convención;
/// reordenar grupos equivale a reasignar `grouping` en los valores.
#[derive(Debug, Clone)]
pub struct RepeatingFieldCollection {
    contenttype: String,
    name: String,
    references: BTreeMap<i64, Vec<i64>>,
    state: LoadState,
    groups: BTreeMap<i64, IndexMap<String, FieldValue>>,
}

impl RepeatingFieldCollection {
    pub fn new(contenttype: &str, name: &str) -> Self {
        Self { contenttype: contenttype.to_string(),
               name: name.to_string(),
               references: BTreeMap::new(),
               state: LoadState::Loaded,
               groups: BTreeMap::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contenttype(&self) -> &str {
        &self.contenttype
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Número de grupos conocidos (referenciados o ya materializados).
    pub fn len(&self) -> usize {
        if self.groups.is_empty() {
            self.references.len()
        } else {
            self.groups.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registra referencias a filas hijas existentes para un grupo. La
    /// colección pasa a estado `Unloaded`: el contenido se materializa en el
    /// primer acceso.
    pub fn add_from_references(&mut self, ids: &[i64], grouping: i64) {
        let entry = self.references.entry(grouping).or_default();
        for id in ids {
            if !entry.contains(id) {
                entry.push(*id);
            }
        }
        self.state = LoadState::Unloaded;
    }

    /// Construye en memoria los valores de un grupo a partir de datos crudos
    /// (formulario o JSON decodificado). Cada sub-campo debe estar declarado
    /// en `defs`; uno desconocido es un error de configuración.
    pub fn add_from_array(&mut self,
                          fields: &serde_json::Map<String, JsonValue>,
                          grouping: i64,
                          defs: &IndexMap<String, FieldDefinition>)
                          -> Result<()> {
        let mut set = IndexMap::new();
        for (fieldname, raw) in fields {
            let def = defs.get(fieldname).ok_or_else(|| {
                          FieldError::Configuration(format!("sub-campo '{}' no declarado en el repetidor '{}'",
                                                            fieldname, self.name))
                      })?;
            let value = StoredValue::from_raw(def.storage(), raw)?;
            set.insert(fieldname.clone(),
                       FieldValue::new(&self.contenttype, &self.name, fieldname, def.field_type(), grouping, value));
        }
        self.groups.insert(grouping, set);
        Ok(())
    }

    /// Materializa las referencias pendientes a través del repositorio.
    /// Idempotente: una colección ya cargada no vuelve a consultar. En caso
    /// de error se regresa a `Unloaded` para permitir el reintento del
    /// llamador.
    pub fn ensure_loaded(&mut self, repo: &dyn FieldValueRepository) -> Result<()> {
        match self.state {
            LoadState::Loaded => return Ok(()),
            LoadState::Loading => {
                return Err(FieldError::Storage(format!("carga reentrante de la colección '{}'", self.name)))
            }
            LoadState::Unloaded => {}
        }
        self.state = LoadState::Loading;
        let ids: Vec<i64> = self.references.values().flatten().copied().collect();
        log::debug!("cargando {} valores hijos para '{}'", ids.len(), self.name);
        let values = match repo.load_values(&ids) {
            Ok(values) => values,
            Err(e) => {
                self.state = LoadState::Unloaded;
                return Err(e);
            }
        };
        for value in values {
            self.groups.entry(value.grouping).or_default().insert(value.fieldname.clone(), value);
        }
        self.state = LoadState::Loaded;
        Ok(())
    }

    /// Acceso al contenido agrupado; dispara la carga perezosa si hace falta.
    pub fn groups(&mut self, repo: &dyn FieldValueRepository)
                  -> Result<&BTreeMap<i64, IndexMap<String, FieldValue>>> {
        self.ensure_loaded(repo)?;
        Ok(&self.groups)
    }

    /// Contenido agrupado ya materializado (no dispara carga).
    pub fn loaded_groups(&self) -> &BTreeMap<i64, IndexMap<String, FieldValue>> {
        &self.groups
    }

    /// Itera todos los valores materializados en orden de grupo.
    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.groups.values().flat_map(|set| set.values())
    }

    /// Forma cruda de los grupos: lista ordenada de objetos
    /// `sub-campo -> valor`. Renumera los grupos 0..n conservando el orden
    /// relativo.
    pub fn to_raw_groups(&self) -> JsonValue {
        let groups: Vec<JsonValue> = self.groups
                                         .values()
                                         .map(|set| {
                                             let mut obj = serde_json::Map::new();
                                             for (fieldname, value) in set {
                                                 obj.insert(fieldname.clone(), value.value.to_raw());
                                             }
                                             JsonValue::Object(obj)
                                         })
                                         .collect();
        JsonValue::Array(groups)
    }

    /// Reconcilia el estado propuesto contra esta colección (el estado
    /// existente, ya cargado) y devuelve el conjunto de borrado.
    ///
    /// El emparejamiento es por identidad (índice de grupo + nombre de
    /// sub-campo arrastrados desde la hidratación), nunca por comparación de
    /// valores: un valor vaciado sobre una fila retenida es un update, no un
    /// delete+insert.
    ///
    /// - grupos/sub-campos presentes en ambos lados: se sobrescribe el valor
    ///   conservando el id de la fila (update);
    /// - presentes sólo en el propuesto: quedan como filas nuevas (insert);
    /// - presentes sólo en el existente: se devuelven para borrar.
    ///
    /// Tras la llamada la colección contiene el estado propuesto con las
    /// identidades arrastradas.
    pub fn update(&mut self, proposed: &RepeatingFieldCollection) -> Result<Vec<FieldValue>> {
        if self.state != LoadState::Loaded {
            return Err(FieldError::Storage(format!("la colección existente '{}' no está cargada", self.name)));
        }
        if proposed.state != LoadState::Loaded {
            return Err(FieldError::Storage(format!("la colección propuesta '{}' no está cargada", proposed.name)));
        }

        let mut next: BTreeMap<i64, IndexMap<String, FieldValue>> = BTreeMap::new();
        for (grouping, fields) in &proposed.groups {
            let existing_group = self.groups.get(grouping);
            let mut set = IndexMap::new();
            for (fieldname, proposed_value) in fields {
                let carried = existing_group.and_then(|g| g.get(fieldname));
                let fv = match carried {
                    Some(prev) => {
                        let mut fv = prev.clone();
                        fv.value = proposed_value.value.clone();
                        fv.fieldtype = proposed_value.fieldtype.clone();
                        fv.grouping = *grouping;
                        fv
                    }
                    None => {
                        let mut fv = proposed_value.clone();
                        fv.grouping = *grouping;
                        fv
                    }
                };
                set.insert(fieldname.clone(), fv);
            }
            next.insert(*grouping, set);
        }

        let mut deleted = Vec::new();
        for (grouping, fields) in &self.groups {
            let kept = next.get(grouping);
            for (fieldname, value) in fields {
                // sólo las filas ya persistidas tienen algo que borrar
                if value.id.is_none() {
                    continue;
                }
                let retained = kept.map(|set| set.contains_key(fieldname)).unwrap_or(false);
                if !retained {
                    deleted.push(value.clone());
                }
            }
        }

        self.groups = next;
        self.references.clear();
        Ok(deleted)
    }
}

/// Normaliza la forma cruda de un valor repetidor en pares `(grupo, campos)`.
/// Acepta una lista de objetos (los grupos en orden) o un objeto con claves
/// numéricas de grupo (la forma que envían los formularios).
pub fn proposed_groups_from_raw(raw: &JsonValue) -> Result<Vec<(i64, serde_json::Map<String, JsonValue>)>> {
    match raw {
        JsonValue::Null => Ok(vec![]),
        JsonValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                let obj = item.as_object().ok_or_else(|| {
                              FieldError::Validation(format!("el grupo {} no es un objeto", idx))
                          })?;
                out.push((idx as i64, obj.clone()));
            }
            Ok(out)
        }
        JsonValue::Object(map) => {
            let mut out = Vec::with_capacity(map.len());
            for (key, item) in map {
                let grouping = key.parse::<i64>().map_err(|_| {
                                   FieldError::Validation(format!("índice de grupo inválido: '{}'", key))
                               })?;
                let obj = item.as_object().ok_or_else(|| {
                              FieldError::Validation(format!("el grupo {} no es un objeto", key))
                          })?;
                out.push((grouping, obj.clone()));
            }
            out.sort_by_key(|(g, _)| *g);
            Ok(out)
        }
        other => Err(FieldError::Validation(format!("forma de repetidor no reconocida: {}", other))),
    }
}
