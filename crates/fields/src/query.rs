// Archivo: query.rs
// Propósito: aumento de la consulta de carga (subconsulta agregada por campo
// repetidor), generación del fragmento de agregación por backend y el códec
// del formato de cable `nombre_grupo_id`.
use crate::errors::{FieldError, Result};
use std::collections::BTreeMap;

/// Fragmento de agregación específico de la plataforma para la columna de
/// referencias. Falla de forma fatal (sin SQL parcial) si el backend no es
/// uno de los tres soportados.
pub fn platform_group_concat(backend: &str) -> Result<&'static str> {
    match backend {
        "mysql" => Ok("GROUP_CONCAT(DISTINCT CONCAT_WS('_', f.fieldname, f.grouping, f.id))"),
        "sqlite" => Ok("GROUP_CONCAT(DISTINCT f.fieldname||'_'||f.grouping||'_'||f.id)"),
        "postgresql" => Ok("string_agg(concat_ws('_', f.fieldname,f.grouping,f.id), ',' ORDER BY f.grouping)"),
        other => Err(FieldError::UnsupportedBackend(other.to_string())),
    }
}

/// Contrato mínimo del constructor de consultas que consume el paso `load`:
/// permite añadir selects y expone la cláusula FROM y el backend activo.
pub trait SelectQuery {
    /// Identificador del backend relacional ("mysql", "sqlite", "postgresql").
    fn backend(&self) -> &str;
    /// Tabla de la cláusula FROM.
    fn from_table(&self) -> &str;
    /// Alias de la cláusula FROM; cuando no hay alias se usa la tabla.
    fn from_alias(&self) -> &str;
    /// Añade una expresión a la lista de selección.
    fn add_select(&mut self, expr: String);
}

/// Constructor de SELECT simple usado por el motor y las pruebas. Las
/// implementaciones de repositorio pueden ejecutar `to_sql()` tal cual o
/// derivar una consulta equivalente.
#[derive(Debug, Clone)]
pub struct SqlSelect {
    backend: String,
    table: String,
    alias: Option<String>,
    selects: Vec<String>,
}

impl SqlSelect {
    pub fn new(backend: &str, table: &str) -> Self {
        let mut q = Self { backend: backend.to_string(), table: table.to_string(), alias: None, selects: Vec::new() };
        q.selects.push(format!("{}.*", q.from_alias_owned()));
        q
    }

    pub fn with_alias(backend: &str, table: &str, alias: &str) -> Self {
        let mut q = Self { backend: backend.to_string(),
                           table: table.to_string(),
                           alias: Some(alias.to_string()),
                           selects: Vec::new() };
        q.selects.push(format!("{}.*", q.from_alias_owned()));
        q
    }

    fn from_alias_owned(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.table.clone())
    }

    pub fn selects(&self) -> &[String] {
        &self.selects
    }

    pub fn to_sql(&self) -> String {
        match &self.alias {
            Some(alias) => format!("SELECT {} FROM {} {}", self.selects.join(", "), self.table, alias),
            None => format!("SELECT {} FROM {}", self.selects.join(", "), self.table),
        }
    }
}

impl SelectQuery for SqlSelect {
    fn backend(&self) -> &str {
        &self.backend
    }

    fn from_table(&self) -> &str {
        &self.table
    }

    fn from_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    fn add_select(&mut self, expr: String) {
        self.selects.push(expr);
    }
}

/// Codifica una referencia a fila hija en el formato de cable.
pub fn encode_reference(fieldname: &str, grouping: i64, id: i64) -> String {
    format!("{}_{}_{}", fieldname, grouping, id)
}

/// Decodifica un token `nombre_grupo_id`. El nombre puede contener guiones
/// bajos: el split se hace desde la derecha (id, luego grupo, resto nombre).
pub fn decode_reference(token: &str) -> Result<(String, i64, i64)> {
    let mut parts: Vec<&str> = token.split('_').collect();
    if parts.len() < 3 {
        return Err(FieldError::Validation(format!("token de referencia inválido: '{}'", token)));
    }
    let id = parts.pop()
                  .and_then(|s| s.parse::<i64>().ok())
                  .ok_or_else(|| FieldError::Validation(format!("id inválido en token '{}'", token)))?;
    let grouping = parts.pop()
                        .and_then(|s| s.parse::<i64>().ok())
                        .ok_or_else(|| FieldError::Validation(format!("grupo inválido en token '{}'", token)))?;
    Ok((parts.join("_"), grouping, id))
}

/// Decodifica la cadena agregada completa (tokens separados por comas) en
/// referencias agrupadas: grupo -> ids de filas hijas. Los tokens vacíos se
/// descartan y los ids duplicados se ignoran.
pub fn decode_aggregate(raw: &str) -> Result<BTreeMap<i64, Vec<i64>>> {
    let mut refs: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    for token in raw.split(',').filter(|t| !t.is_empty()) {
        let (_, grouping, id) = decode_reference(token)?;
        let ids = refs.entry(grouping).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_concat_per_backend() {
        assert!(platform_group_concat("mysql").unwrap().starts_with("GROUP_CONCAT(DISTINCT CONCAT_WS"));
        assert!(platform_group_concat("sqlite").unwrap().contains("||'_'||"));
        assert!(platform_group_concat("postgresql").unwrap().starts_with("string_agg"));
    }

    #[test]
    fn group_concat_unknown_backend_is_fatal() {
        match platform_group_concat("oracle") {
            Err(FieldError::UnsupportedBackend(name)) => assert_eq!(name, "oracle"),
            other => panic!("se esperaba UnsupportedBackend, hubo {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn reference_round_trip() {
        let token = encode_reference("caption", 0, 17);
        assert_eq!(token, "caption_0_17");
        let (name, grouping, id) = decode_reference(&token).unwrap();
        assert_eq!((name.as_str(), grouping, id), ("caption", 0, 17));
    }

    #[test]
    fn reference_name_with_underscores() {
        let (name, grouping, id) = decode_reference("sub_caption_2_40").unwrap();
        assert_eq!((name.as_str(), grouping, id), ("sub_caption", 2, 40));
    }

    #[test]
    fn decode_aggregate_groups_and_dedups() {
        let refs = decode_aggregate("caption_0_17,weight_0_18,caption_1_19,caption_1_19,").unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[&0], vec![17, 18]);
        assert_eq!(refs[&1], vec![19]);
    }

    #[test]
    fn decode_reference_rejects_short_tokens() {
        assert!(decode_reference("caption_0").is_err());
        assert!(decode_reference("caption_x_y").is_err());
    }

    #[test]
    fn sql_select_renders_from_and_alias() {
        let mut q = SqlSelect::with_alias("sqlite", "content", "c");
        q.add_select("(SELECT 1) as extra".to_string());
        assert_eq!(q.to_sql(), "SELECT c.*, (SELECT 1) as extra FROM content c");
        let q = SqlSelect::new("sqlite", "content");
        assert_eq!(q.from_alias(), "content");
    }
}
