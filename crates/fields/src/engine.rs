// Archivo: engine.rs
// Propósito: implementar `ContentEngine`, el dueño del ciclo de vida que
// invoca las operaciones de los handlers en los puntos fijos: pre-consulta
// (`load`), post-lectura (`hydrate`), pre-guardado (`persist`). Cada ciclo
// corre de principio a fin dentro de una petición; el límite transaccional
// pertenece al repositorio/llamador.
use crate::domain::{ContentEntity, RawRow};
use crate::errors::Result;
use crate::field_type::FieldManager;
use crate::query::SqlSelect;
use crate::queryset::QuerySet;
use crate::repository::{ContentRepository, FieldValueRepository};
use content_domain::{ContentTypeRegistry, SchemaMetadata};
use std::sync::Arc;

/// Motor de almacenamiento de contenido.
///
/// Orquesta el registro de tipos de contenido, el registro de handlers y el
/// repositorio inyectado. Un error de configuración en un campo aborta ese
/// campo y hace fallar el ciclo; las operaciones ya encoladas por campos
/// hermanos quedan intactas y no se ejecutan (las acciones diferidas sólo
/// corren tras una escritura del padre con éxito).
pub struct ContentEngine<R>
    where R: ContentRepository + FieldValueRepository
{
    repo: Arc<R>,
    schema: ContentTypeRegistry,
    manager: FieldManager,
}

impl<R> ContentEngine<R> where R: ContentRepository + FieldValueRepository
{
    /// Crea el motor con el registro de handlers por defecto.
    pub fn new(repo: Arc<R>, schema: ContentTypeRegistry) -> Self {
        Self { repo, schema, manager: FieldManager::default() }
    }

    /// Crea el motor con un registro de handlers propio (tipos a medida).
    pub fn with_manager(repo: Arc<R>, schema: ContentTypeRegistry, manager: FieldManager) -> Self {
        Self { repo, schema, manager }
    }

    pub fn schema(&self) -> &ContentTypeRegistry {
        &self.schema
    }

    /// Construye una entidad nueva del tipo dado con todos los campos
    /// declarados inicializados vía `set` (los repetidores quedan como
    /// colección vacía, nunca ausentes).
    pub fn create(&self, contenttype: &str) -> Result<ContentEntity> {
        let ct = self.schema.content_type(contenttype)?;
        let mut entity = ContentEntity::new(contenttype);
        for def in ct.fields().values() {
            let handler = self.manager.get(def)?;
            handler.set(&mut entity, None)?;
        }
        Ok(entity)
    }

    /// Paso pre-consulta: la consulta base del tipo más el aumento de cada
    /// handler (subconsultas agregadas para los repetidores).
    pub fn load_query(&self, contenttype: &str) -> Result<SqlSelect> {
        let ct = self.schema.content_type(contenttype)?;
        let mut query = SqlSelect::new(self.repo.backend(), ct.table());
        for def in ct.fields().values() {
            let handler = self.manager.get(def)?;
            handler.load(&mut query, ct)?;
        }
        Ok(query)
    }

    /// Paso post-lectura: hidrata una fila cruda en una entidad.
    pub fn hydrate_row(&self, row: &RawRow, contenttype: &str) -> Result<ContentEntity> {
        let ct = self.schema.content_type(contenttype)?;
        let mut entity = ContentEntity::new(contenttype);
        entity.id = row.get("id").and_then(|v| v.as_i64());
        for def in ct.fields().values() {
            let handler = self.manager.get(def)?;
            handler.hydrate(row, &mut entity)?;
        }
        Ok(entity)
    }

    /// Recupera y hidrata un registro en una sola pasada (la subconsulta
    /// agregada trae las referencias de los repetidores con la fila).
    pub fn get(&self, id: i64, contenttype: &str) -> Result<Option<ContentEntity>> {
        let ct = self.schema.content_type(contenttype)?;
        let query = self.load_query(contenttype)?;
        match self.repo.get_content(id, ct, &query)? {
            Some(row) => Ok(Some(self.hydrate_row(&row, contenttype)?)),
            None => Ok(None),
        }
    }

    /// Paso pre-guardado y escritura: corre `persist` de cada campo sobre un
    /// `QuerySet`, escribe la fila padre y completa la cola diferida con el
    /// id generado. Si la escritura del padre falla, la cola se descarta sin
    /// ejecutar nada.
    pub fn save(&self, entity: &mut ContentEntity) -> Result<i64> {
        let ct = self.schema.content_type(&entity.contenttype)?;
        let mut queries = QuerySet::new();
        for def in ct.fields().values() {
            let handler = self.manager.get(def)?;
            handler.persist(&mut queries, entity, self.repo.as_ref())?;
        }

        let (rows_affected, id) = match entity.id {
            None => {
                let (rows, new_id) = match self.repo.insert_content(&entity.contenttype, queries.columns()) {
                    Ok(res) => res,
                    Err(e) => {
                        queries.abort();
                        return Err(e);
                    }
                };
                entity.id = Some(new_id);
                (rows, new_id)
            }
            Some(existing_id) => {
                let rows = match self.repo.update_content(existing_id, &entity.contenttype, queries.columns()) {
                    Ok(rows) => rows,
                    Err(e) => {
                        queries.abort();
                        return Err(e);
                    }
                };
                (rows, existing_id)
            }
        };

        log::debug!("guardado {}/{} (filas: {})", entity.contenttype, id, rows_affected);
        queries.complete(rows_affected, Some(id), self.repo.as_ref())?;
        Ok(id)
    }

    /// Ids de registros existentes del tipo.
    pub fn list(&self, contenttype: &str) -> Result<Vec<i64>> {
        self.repo.list_content(contenttype)
    }

    /// Elimina un registro y sus filas hijas de valores.
    pub fn delete(&self, entity: &ContentEntity) -> Result<()> {
        let ct = self.schema.content_type(&entity.contenttype)?;
        let id = match entity.id {
            Some(id) => id,
            None => return Ok(()),
        };
        for def in ct.fields().values().filter(|d| d.is_repeating()) {
            let existing = self.repo.get_existing_fields(id, &entity.contenttype, def.name())?;
            let ids: Vec<i64> = existing.values().flatten().copied().collect();
            for value in self.repo.load_values(&ids)? {
                self.repo.delete(&value)?;
            }
        }
        self.repo.delete_content(id, &entity.contenttype)
    }
}
