mod contenttype;
mod errors;
mod field_definition;
mod storage;

pub use contenttype::{ContentType, ContentTypeRegistry, SchemaMetadata};
pub use errors::SchemaError;
pub use field_definition::FieldDefinition;
pub use storage::StorageKind;
