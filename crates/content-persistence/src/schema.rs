// Simplified Diesel schema shared by SQLite (tests) and Postgres.
// Tablas: content, field_values
use diesel::allow_tables_to_appear_in_same_query;
diesel::table! {
    content (id) {
        id -> BigInt,
        contenttype -> Text,
        created_at_ts -> BigInt,
        data -> Text,
    }
}
diesel::table! {
    field_values (id) {
        id -> BigInt,
        content_id -> Nullable<BigInt>,
        contenttype -> Text,
        name -> Text,
        fieldname -> Text,
        fieldtype -> Text,
        grouping -> BigInt,
        value_text -> Nullable<Text>,
        value_integer -> Nullable<BigInt>,
        value_float -> Nullable<Double>,
        value_date -> Nullable<Text>,
        value_json -> Nullable<Text>,
    }
}
allow_tables_to_appear_in_same_query!(content, field_values);
