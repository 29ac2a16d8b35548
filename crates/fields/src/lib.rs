//! Crate `fields` — el motor de persistencia e hidratación de campos.
//!
//! Este crate define el valor almacenado por columna tipada (`FieldValue`),
//! la colección de campos repetidores (`RepeatingFieldCollection`) con su
//! reconciliación y carga perezosa, el contrato polimórfico de tipos de
//! campo (`FieldType`), la cola de acciones diferidas (`QuerySet`) y el
//! motor de ciclo de vida (`ContentEngine`). También expone los contratos de
//! persistencia (`ContentRepository`, `FieldValueRepository`) y una
//! implementación en memoria útil para pruebas.
//!
//! Diseño resumido:
//! - Persistencia por filas hijas: cada grupo de un campo repetidor se
//!   normaliza en filas `(registro, campo, grupo)` y se reensambla al leer.
//! - Reconciliación por identidad: el estado propuesto se compara con el
//!   persistido por referencia arrastrada, nunca por valor; el resultado son
//!   inserts/updates/deletes puntuales.
//! - Acciones diferidas: los inserts cuyo padre aún no tiene id quedan en
//!   una cola ordenada que se completa cuando la escritura confirma.
//!
//! Ejemplo rápido:
//! ```rust
//! use content_domain::ContentTypeRegistry;
//! use fields::{ContentEngine, InMemoryContentRepository};
//! use std::sync::Arc;
//! let registry = ContentTypeRegistry::from_str(
//!     r#"{"pages": {"fields": {"title": {"type": "text"}}}}"#).unwrap();
//! let repo = Arc::new(InMemoryContentRepository::new());
//! let engine = ContentEngine::new(repo, registry);
//! ```
pub mod collection;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod field_type;
pub mod query;
pub mod queryset;
pub mod repeater;
pub mod repository;
pub mod stubs;

pub use collection::*;
pub use domain::*;
pub use engine::*;
pub use errors::*;
pub use field_type::*;
pub use query::*;
pub use queryset::*;
pub use repeater::*;
pub use repository::*;
pub use stubs::*;
