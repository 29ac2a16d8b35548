use crate::schema;
use crate::schema::content::dsl as content_dsl;
use crate::schema::field_values::dsl as fv_dsl;
use chrono::{NaiveDateTime, Utc};
use content_domain::ContentType;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::Error as DieselError;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use fields::{platform_group_concat, ContentRepository, FieldError, FieldValue, FieldValueRepository, RawRow,
             Result, SelectQuery, SqlSelect, StoredValue};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
#[cfg(all(feature = "pg", not(test)))]
type DbPool = Pool<ConnectionManager<PgConnection>>;
#[cfg(any(test, not(feature = "pg")))]
type DbPool = Pool<ConnectionManager<SqliteConnection>>;
#[cfg(all(feature = "pg", not(test)))]
type DbConn = PgConnection;
#[cfg(any(test, not(feature = "pg")))]
type DbConn = SqliteConnection;
#[cfg(any(test, not(feature = "pg")))]
diesel::define_sql_function! {
  fn last_insert_rowid() -> diesel::sql_types::BigInt;
}
/// Repo Diesel que implementa `ContentRepository` y `FieldValueRepository`.
pub struct DieselContentRepository {
  pool: Arc<DbPool>,
}
impl DieselContentRepository {
  pub fn new(database_url: &str) -> Self {
    #[cfg(any(test, not(feature = "pg")))]
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    #[cfg(all(feature = "pg", not(test)))]
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder().max_size(4).build(manager).expect("no se pudo crear el pool de conexiones");
    let repo = DieselContentRepository { pool: Arc::new(pool) };
    if let Ok(mut c) = repo.conn_raw() {
      let _ = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut c);
      let _ = diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(&mut c);
      let _ = c.run_pending_migrations(MIGRATIONS);
    }
    repo
  }
  fn conn_raw(&self) -> std::result::Result<PooledConnection<ConnectionManager<DbConn>>, r2d2::Error> {
    // Note: when built with pg feature this will be adjusted by cfg above
    self.pool.get()
  }
  fn conn(&self) -> Result<PooledConnection<ConnectionManager<DbConn>>> {
    self.conn_raw().map_err(|e| FieldError::Storage(format!("pool: {}", e)))
  }
}
// Diesel row structs for the content tables
#[derive(Debug, Queryable)]
struct ContentRow {
  pub id: i64,
  pub contenttype: String,
  #[allow(dead_code)]
  pub created_at_ts: i64,
  pub data: String,
}
#[derive(Debug, Insertable)]
#[diesel(table_name = schema::content)]
struct NewContentRow {
  pub contenttype: String,
  pub created_at_ts: i64,
  pub data: String,
}
#[derive(Debug, Queryable)]
struct FieldValueRow {
  pub id: i64,
  pub content_id: Option<i64>,
  pub contenttype: String,
  pub name: String,
  pub fieldname: String,
  pub fieldtype: String,
  pub grouping: i64,
  pub value_text: Option<String>,
  pub value_integer: Option<i64>,
  pub value_float: Option<f64>,
  pub value_date: Option<String>,
  pub value_json: Option<String>,
}
#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = schema::field_values)]
#[diesel(treat_none_as_null = true)]
struct NewFieldValueRow {
  pub content_id: Option<i64>,
  pub contenttype: String,
  pub name: String,
  pub fieldname: String,
  pub fieldtype: String,
  pub grouping: i64,
  pub value_text: Option<String>,
  pub value_integer: Option<i64>,
  pub value_float: Option<f64>,
  pub value_date: Option<String>,
  pub value_json: Option<String>,
}
#[derive(QueryableByName)]
struct AggRow {
  #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Text>)]
  pub agg: Option<String>,
}
fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T> {
  res.map_err(|e| FieldError::Storage(format!("db: {}", e)))
}
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
fn row_from_value(value: &FieldValue) -> NewFieldValueRow {
  let (value_text, value_integer, value_float, value_date, value_json) = match &value.value {
    StoredValue::Text(s) => (Some(s.clone()), None, None, None, None),
    StoredValue::Integer(n) => (None, Some(*n), None, None, None),
    StoredValue::Float(n) => (None, None, Some(*n), None, None),
    StoredValue::Date(d) => (None, None, None, Some(d.format(DATE_FORMAT).to_string()), None),
    StoredValue::Json(j) => (None, None, None, None, Some(j.to_string())),
  };
  NewFieldValueRow { content_id: value.content_id,
                     contenttype: value.contenttype.clone(),
                     name: value.name.clone(),
                     fieldname: value.fieldname.clone(),
                     fieldtype: value.fieldtype.clone(),
                     grouping: value.grouping,
                     value_text,
                     value_integer,
                     value_float,
                     value_date,
                     value_json }
}
fn value_from_row(row: FieldValueRow) -> Result<FieldValue> {
  let value = if let Some(s) = row.value_text {
    StoredValue::Text(s)
  } else if let Some(n) = row.value_integer {
    StoredValue::Integer(n)
  } else if let Some(n) = row.value_float {
    StoredValue::Float(n)
  } else if let Some(d) = row.value_date {
    let parsed = NaiveDateTime::parse_from_str(&d, DATE_FORMAT)
      .map_err(|e| FieldError::Validation(format!("fecha inválida en fila {}: {}", row.id, e)))?;
    StoredValue::Date(parsed)
  } else if let Some(j) = row.value_json {
    StoredValue::Json(serde_json::from_str(&j).map_err(|e| {
                        FieldError::Serialization(format!("json inválido en fila {}: {}", row.id, e))
                      })?)
  } else {
    return Err(FieldError::Validation(format!("fila de valor {} sin columna poblada", row.id)));
  };
  Ok(FieldValue { id: Some(row.id),
                  content_id: row.content_id,
                  contenttype: row.contenttype,
                  name: row.name,
                  fieldname: row.fieldname,
                  fieldtype: row.fieldtype,
                  grouping: row.grouping,
                  value })
}
// Recuperación del id generado: RETURNING en Postgres, last_insert_rowid()
// en SQLite.
#[cfg(all(feature = "pg", not(test)))]
fn insert_content_row(conn: &mut DbConn, row: &NewContentRow) -> Result<(usize, i64)> {
  let id = map_db_err(diesel::insert_into(schema::content::table).values(row)
                                                                 .returning(content_dsl::id)
                                                                 .get_result::<i64>(conn))?;
  Ok((1, id))
}
#[cfg(any(test, not(feature = "pg")))]
fn insert_content_row(conn: &mut DbConn, row: &NewContentRow) -> Result<(usize, i64)> {
  let rows = map_db_err(diesel::insert_into(schema::content::table).values(row).execute(conn))?;
  let id = map_db_err(diesel::select(last_insert_rowid()).get_result::<i64>(conn))?;
  Ok((rows, id))
}
#[cfg(all(feature = "pg", not(test)))]
fn insert_field_value_row(conn: &mut DbConn, row: &NewFieldValueRow) -> Result<i64> {
  map_db_err(diesel::insert_into(schema::field_values::table).values(row)
                                                             .returning(fv_dsl::id)
                                                             .get_result::<i64>(conn))
}
#[cfg(any(test, not(feature = "pg")))]
fn insert_field_value_row(conn: &mut DbConn, row: &NewFieldValueRow) -> Result<i64> {
  map_db_err(diesel::insert_into(schema::field_values::table).values(row).execute(conn))?;
  map_db_err(diesel::select(last_insert_rowid()).get_result::<i64>(conn))
}
impl ContentRepository for DieselContentRepository {
  #[cfg(all(feature = "pg", not(test)))]
  fn backend(&self) -> &str {
    "postgresql"
  }
  #[cfg(any(test, not(feature = "pg")))]
  fn backend(&self) -> &str {
    "sqlite"
  }
  fn insert_content(&self, contenttype: &str, columns: &IndexMap<String, JsonValue>) -> Result<(usize, i64)> {
    let mut conn = self.conn()?;
    let mut data = serde_json::Map::new();
    for (k, v) in columns {
      data.insert(k.clone(), v.clone());
    }
    let row = NewContentRow { contenttype: contenttype.to_string(),
                              created_at_ts: Utc::now().timestamp(),
                              data: JsonValue::Object(data).to_string() };
    let (rows, id) = insert_content_row(&mut conn, &row)?;
    log::debug!("insert content {}/{} ({} filas)", contenttype, id, rows);
    Ok((rows, id))
  }
  fn update_content(&self, id: i64, contenttype: &str, columns: &IndexMap<String, JsonValue>) -> Result<usize> {
    let mut conn = self.conn()?;
    let mut data = serde_json::Map::new();
    for (k, v) in columns {
      data.insert(k.clone(), v.clone());
    }
    map_db_err(diesel::update(content_dsl::content.filter(content_dsl::id.eq(id))
                                                  .filter(content_dsl::contenttype.eq(contenttype)))
                 .set(content_dsl::data.eq(JsonValue::Object(data).to_string()))
                 .execute(&mut conn))
  }
  fn get_content(&self, id: i64, content_type: &ContentType, query: &SqlSelect) -> Result<Option<RawRow>> {
    let mut conn = self.conn()?;
    let opt = content_dsl::content.filter(content_dsl::id.eq(id))
                                  .filter(content_dsl::contenttype.eq(content_type.name()))
                                  .first::<ContentRow>(&mut conn)
                                  .optional()
                                  .map_err(|e| FieldError::Storage(format!("db: {}", e)))?;
    let row = match opt {
      Some(row) => row,
      None => return Ok(None),
    };
    let mut raw = RawRow::new();
    raw.insert("id".to_string(), JsonValue::from(row.id));
    raw.insert("contenttype".to_string(), JsonValue::String(row.contenttype.clone()));
    let data: JsonValue = serde_json::from_str(&row.data).unwrap_or(serde_json::json!({}));
    if let Some(obj) = data.as_object() {
      for (k, v) in obj {
        raw.insert(k.clone(), v.clone());
      }
    }
    // Una subconsulta agregada por campo repetidor, equivalente a la que
    // añade el paso de carga sobre `query`.
    for def in content_type.fields().values().filter(|d| d.is_repeating()) {
      let aggregate = platform_group_concat(query.backend())?;
      let sql = format!("SELECT {} AS agg FROM {} f WHERE f.content_id = {} AND f.contenttype='{}' AND f.name = \
                         '{}'",
                        aggregate,
                        content_type.field_value_table(),
                        id,
                        content_type.name(),
                        def.name());
      let rows: Vec<AggRow> = map_db_err(diesel::sql_query(sql).load(&mut conn))?;
      let agg = rows.into_iter().next().and_then(|r| r.agg);
      raw.insert(def.name().to_string(), agg.map(JsonValue::String).unwrap_or(JsonValue::Null));
    }
    Ok(Some(raw))
  }
  fn list_content(&self, contenttype: &str) -> Result<Vec<i64>> {
    let mut conn = self.conn()?;
    map_db_err(content_dsl::content.filter(content_dsl::contenttype.eq(contenttype))
                                   .select(content_dsl::id)
                                   .order(content_dsl::id.asc())
                                   .load::<i64>(&mut conn))
  }
  fn delete_content(&self, id: i64, contenttype: &str) -> Result<()> {
    let mut conn = self.conn()?;
    let rows = map_db_err(diesel::delete(content_dsl::content.filter(content_dsl::id.eq(id))
                                                             .filter(content_dsl::contenttype.eq(contenttype)))
                            .execute(&mut conn))?;
    if rows == 0 {
      return Err(FieldError::NotFound(format!("registro {}/{}", contenttype, id)));
    }
    Ok(())
  }
}
impl FieldValueRepository for DieselContentRepository {
  fn save(&self, value: &FieldValue, update: bool) -> Result<i64> {
    let mut conn = self.conn()?;
    let row = row_from_value(value);
    if update {
      let vid = value.id
                     .ok_or_else(|| FieldError::Validation("update de fila hija sin id".to_string()))?;
      map_db_err(diesel::update(fv_dsl::field_values.filter(fv_dsl::id.eq(vid))).set(&row).execute(&mut conn))?;
      Ok(vid)
    } else {
      if value.content_id.is_none() {
        return Err(FieldError::Validation(format!("insert de fila hija sin content_id ('{}')", value.fieldname)));
      }
      insert_field_value_row(&mut conn, &row)
    }
  }
  fn delete(&self, value: &FieldValue) -> Result<()> {
    let vid = value.id
                   .ok_or_else(|| FieldError::Validation("borrado de fila hija sin id".to_string()))?;
    let mut conn = self.conn()?;
    map_db_err(diesel::delete(fv_dsl::field_values.filter(fv_dsl::id.eq(vid))).execute(&mut conn))?;
    Ok(())
  }
  fn get_existing_fields(&self, content_id: i64, contenttype: &str, fieldname: &str)
                         -> Result<BTreeMap<i64, Vec<i64>>> {
    let mut conn = self.conn()?;
    let rows: Vec<(i64, i64)> = map_db_err(fv_dsl::field_values.filter(fv_dsl::content_id.eq(content_id))
                                                               .filter(fv_dsl::contenttype.eq(contenttype))
                                                               .filter(fv_dsl::name.eq(fieldname))
                                                               .select((fv_dsl::id, fv_dsl::grouping))
                                                               .order((fv_dsl::grouping.asc(), fv_dsl::id.asc()))
                                                               .load(&mut conn))?;
    let mut grouped: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    for (id, grouping) in rows {
      grouped.entry(grouping).or_default().push(id);
    }
    Ok(grouped)
  }
  fn load_values(&self, ids: &[i64]) -> Result<Vec<FieldValue>> {
    let mut conn = self.conn()?;
    let rows = map_db_err(fv_dsl::field_values.filter(fv_dsl::id.eq_any(ids.to_vec()))
                                              .order((fv_dsl::grouping.asc(), fv_dsl::id.asc()))
                                              .load::<FieldValueRow>(&mut conn))?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
      out.push(value_from_row(row)?);
    }
    Ok(out)
  }
}
/// Crear repo desde las variables de entorno (o default sqlite in-memory en
/// tests)
#[cfg(all(feature = "pg", not(test)))]
pub fn new_from_env() -> Result<DieselContentRepository> {
  dotenvy::dotenv().ok();
  let url = std::env::var("CONTENT_DB_URL").or_else(|_| std::env::var("DATABASE_URL")).map_err(|_| {
              FieldError::Storage("CONTENT_DB_URL / DATABASE_URL not set".to_string())
            })?;
  if !(url.starts_with("postgres") || url.starts_with("postgresql://") || url.contains("@")) {
    return Err(FieldError::Storage("content-persistence: CONTENT_DB_URL does not look like Postgres URL".to_string()));
  }
  Ok(DieselContentRepository::new(&url))
}
#[cfg(test)]
pub fn new_from_env() -> Result<DieselContentRepository> {
  dotenvy::dotenv().ok();
  let url = std::env::var("CONTENT_DB_URL").unwrap_or_else(|_| "file:contentdb?mode=memory&cache=shared".into());
  Ok(DieselContentRepository::new(&url))
}
#[cfg(all(not(feature = "pg"), not(test)))]
pub fn new_from_env() -> Result<DieselContentRepository> {
  dotenvy::dotenv().ok();
  let url = std::env::var("CONTENT_DB_URL").or_else(|_| std::env::var("DATABASE_URL")).map_err(|_| {
              FieldError::Storage("CONTENT_DB_URL / DATABASE_URL not set".to_string())
            })?;
  let url_l = url.to_lowercase();
  if url_l.starts_with("file:") || url_l.contains("mode=memory") || url_l.contains("sqlite") || url_l.ends_with(".db") {
    return Ok(DieselContentRepository::new(&url));
  }
  Err(FieldError::Storage("content-persistence was compiled without 'pg' feature; enable the 'pg' feature to use \
                           Postgres in production"
                                           .to_string()))
}
// Test helper: construct a DieselContentRepository backed by explicit SQLite
// connection manager. This bypasses environment parsing and avoids cases
// where the build or features might cause the ConnectionManager to treat
// the string as Postgres connection info.
#[cfg(not(feature = "pg"))]
pub fn new_sqlite_for_test(database_url: &str) -> DieselContentRepository {
  use diesel::r2d2::ConnectionManager;
  use diesel::sqlite::SqliteConnection;
  let manager = ConnectionManager::<SqliteConnection>::new(database_url);
  let pool = Pool::builder().max_size(4).build(manager).expect("no se pudo crear el pool de conexiones");
  let repo = DieselContentRepository { pool: Arc::new(pool) };
  if let Ok(mut c) = repo.conn_raw() {
    let _ = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut c);
    let _ = diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(&mut c);
    let _ = c.run_pending_migrations(MIGRATIONS);
  }
  repo
}
