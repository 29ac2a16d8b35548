//! Implementación Diesel de los contratos de persistencia del motor de
//! campos (`ContentRepository` + `FieldValueRepository`). Este archivo
//! expone el módulo `schema` y reexporta el repositorio Diesel; la
//! implementación detallada está en `content_persistence.rs`.

mod content_persistence;
pub mod schema;

#[cfg(not(feature = "pg"))]
pub use content_persistence::new_sqlite_for_test;
pub use content_persistence::{new_from_env, DieselContentRepository, MIGRATIONS};
