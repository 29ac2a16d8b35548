// Archivo: queryset.rs
// Propósito: acumular el trabajo de un ciclo de escritura: las columnas de la
// fila padre y la cola ordenada de acciones diferidas que dependen del id
// generado por ese insert.
use crate::domain::FieldValue;
use crate::errors::Result;
use crate::repository::FieldValueRepository;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

/// Acción diferida registrada durante `persist`: un registro por valor, con
/// el tipo de operación explícito en lugar de closures con estado capturado.
#[derive(Debug, Clone)]
pub enum DeferredAction {
    /// Guardar una fila de valor; `update` distingue insert de update.
    SaveValue { value: FieldValue, update: bool },
    /// Eliminar una fila de valor existente.
    DeleteValue { value: FieldValue },
}

/// Conjunto de consultas de un ciclo de escritura.
///
/// El dueño de la transacción ejecuta la escritura del padre y después llama
/// a `complete` exactamente una vez con el resultado y el id generado; las
/// acciones se ejecutan en orden de registro. Si la escritura del padre
/// falla, el `QuerySet` se descarta sin ejecutar nada (ninguna fila hija
/// huérfana).
#[derive(Debug, Default)]
pub struct QuerySet {
    columns: IndexMap<String, JsonValue>,
    deferred: Vec<DeferredAction>,
}

impl QuerySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepara el valor de una columna de la fila padre.
    pub fn set_column(&mut self, name: &str, value: JsonValue) {
        self.columns.insert(name.to_string(), value);
    }

    pub fn columns(&self) -> &IndexMap<String, JsonValue> {
        &self.columns
    }

    /// Registra una acción a ejecutar cuando se conozca el resultado de la
    /// escritura del padre. Se conserva el orden de registro.
    pub fn on_result(&mut self, action: DeferredAction) {
        self.deferred.push(action);
    }

    /// Número de acciones pendientes.
    pub fn pending(&self) -> usize {
        self.deferred.len()
    }

    /// Ejecuta la cola diferida tras la escritura del padre.
    ///
    /// - Los valores sin `content_id` reciben `generated_id` (el caso de un
    ///   insert de padre recién confirmado).
    /// - Los guardados sólo se ejecutan si la escritura afectó exactamente
    ///   una fila y el id es conocido; los borrados se ejecutan siempre (la
    ///   fila hija existe con independencia del resultado del padre).
    /// - Invocar de nuevo es un no-op: la cola se consume.
    pub fn complete(&mut self,
                    rows_affected: usize,
                    generated_id: Option<i64>,
                    repo: &dyn FieldValueRepository)
                    -> Result<()> {
        let actions: Vec<DeferredAction> = self.deferred.drain(..).collect();
        log::debug!("ejecutando {} acciones diferidas (filas afectadas: {})", actions.len(), rows_affected);
        for action in actions {
            match action {
                DeferredAction::SaveValue { mut value, update } => {
                    if value.content_id.is_none() {
                        value.content_id = generated_id;
                    }
                    if rows_affected != 1 || value.content_id.is_none() {
                        continue;
                    }
                    repo.save(&value, update)?;
                }
                DeferredAction::DeleteValue { value } => {
                    repo.delete(&value)?;
                }
            }
        }
        Ok(())
    }

    /// Descarta la cola sin ejecutar nada (escritura del padre fallida).
    pub fn abort(&mut self) {
        self.deferred.clear();
    }
}
