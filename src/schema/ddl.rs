//! DDL rendering for entity descriptors.

use crate::schema::descriptor::EntityDescriptor;

/// Name of the shared trigger function that stamps `last_modified`.
pub const TOUCH_FUNCTION: &str = "touch_last_modified";

/// Creates the shared trigger function. Tables without a `last_modified`
/// column pass through unchanged.
pub const TOUCH_FUNCTION_SQL: &str = "CREATE OR REPLACE FUNCTION touch_last_modified() RETURNS trigger AS $$
BEGIN
    NEW := jsonb_populate_record(NEW, jsonb_build_object('last_modified', now()));
    RETURN NEW;
END;
$$ LANGUAGE plpgsql";

pub(crate) fn render(descriptor: &EntityDescriptor) -> Vec<String> {
    let table = descriptor.table();
    let mut statements = vec![create_table(descriptor)];

    for column in descriptor.indexed_columns() {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} ({})",
            index_name(table, column.name()),
            column.name()
        ));
    }

    if descriptor.has_touch_trigger() {
        statements.push(format!(
            "CREATE OR REPLACE TRIGGER {table}_touch_last_modified BEFORE INSERT OR UPDATE ON {table} \
             FOR EACH ROW EXECUTE FUNCTION {TOUCH_FUNCTION}()"
        ));
    }
    statements
}

fn create_table(descriptor: &EntityDescriptor) -> String {
    let mut lines: Vec<String> = descriptor
        .columns()
        .iter()
        .map(|c| c.definition().to_string())
        .collect();
    lines.extend(descriptor.foreign_keys().filter_map(|c| {
        c.foreign_key_target()
            .map(|target| format!("FOREIGN KEY ({}) REFERENCES {target}(id)", c.name()))
    }));

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        descriptor.table(),
        lines.join(",\n    ")
    )
}

pub fn index_name(table: &str, column: &str) -> String {
    format!("ix_{table}_{column}")
}
