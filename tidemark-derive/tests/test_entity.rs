//! Tests for the `Entity` derive.
//!
//! Everything here works from descriptors and synthesized statements, so no
//! database is required.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tidemark::schema::{EntityDescriptor, IdentityMode};
use tidemark::sql::{Filter, Selection, Synthesizer};
use tidemark::{Entity, Value};
use uuid::Uuid;

#[derive(Entity, Debug, Clone, PartialEq)]
#[table_name = "customers"]
pub struct Customer {
    #[primary_key]
    pub id: Option<Uuid>,
    #[size = 64]
    #[unique]
    pub email: String,
    pub display_name: Option<String>,
    #[range(0, 150)]
    pub age: i32,
    #[default_expr = "now()"]
    #[indexed]
    pub signed_up: DateTime<Utc>,
    #[skip]
    pub session_token: String,
}

#[derive(Entity, Debug, Clone)]
#[table_name = "orders"]
#[touch_trigger = false]
pub struct Order {
    #[primary_key]
    pub id: Uuid,
    #[foreign_key = "customers"]
    pub customer_id: Uuid,
    #[identity]
    pub number: i64,
    #[precision(12, 2)]
    #[check = "total >= 0"]
    pub total: Decimal,
    #[check = "status = 'open'"]
    #[check = "status = 'shipped'"]
    #[checks_any]
    pub status: String,
    #[column_name = "placed_on"]
    pub placed: NaiveDate,
}

#[derive(Entity, Debug, Clone)]
pub struct AuditEvent {
    #[primary_key]
    pub id: Option<Uuid>,
    #[column_type = "Jsonb"]
    pub payload: String,
}

#[derive(Entity, Debug, Clone)]
pub struct HTTPStatusCode {
    #[primary_key]
    pub id: Option<Uuid>,
    pub code: i32,
}

fn customer() -> Customer {
    Customer {
        id: None,
        email: "ada@example.com".into(),
        display_name: None,
        age: 36,
        signed_up: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        session_token: "secret".into(),
    }
}

#[test]
fn test_table_and_columns() {
    let descriptor = EntityDescriptor::of::<Customer>().unwrap();
    assert_eq!(descriptor.table(), "customers");
    assert_eq!(descriptor.columns().len(), 5);
    assert_eq!(descriptor.skipped_members(), ["session_token"]);

    let email = descriptor.column("email").unwrap();
    assert_eq!(email.definition(), "email VARCHAR(64) NOT NULL UNIQUE");
    assert!(!email.is_indexed());
    assert!(descriptor.column("signed_up").unwrap().is_indexed());
    assert!(descriptor
        .ddl()
        .contains("CREATE INDEX IF NOT EXISTS ix_customers_signed_up ON customers (signed_up)"));

    let age = descriptor.column("age").unwrap();
    assert_eq!(age.check_clause().as_deref(), Some("CHECK ( age >= 0 AND age <= 150 )"));

    assert!(descriptor.column("display_name").unwrap().is_nullable());
    assert!(descriptor.primary_key().is_primary_key());
}

#[test]
fn test_default_table_name() {
    assert_eq!(AuditEvent::table_name(), "audit_events");
    assert_eq!(HTTPStatusCode::table_name(), "http_status_codes");
}

#[test]
fn test_column_type_override() {
    let descriptor = EntityDescriptor::of::<AuditEvent>().unwrap();
    assert_eq!(descriptor.column("payload").unwrap().type_text(), "JSONB");
}

#[test]
fn test_foreign_key_identity_and_checks() {
    let descriptor = EntityDescriptor::of::<Order>().unwrap();
    let ddl = descriptor.ddl();
    assert!(ddl.contains("FOREIGN KEY (customer_id) REFERENCES customers(id)"));
    assert!(ddl.contains("CREATE INDEX IF NOT EXISTS ix_orders_customer_id ON orders (customer_id)"));
    assert!(ddl.contains("number BIGINT NOT NULL GENERATED ALWAYS AS IDENTITY"));
    assert!(ddl.contains("total NUMERIC(12,2) NOT NULL CHECK ( total >= 0 )"));
    assert!(ddl.contains("CHECK ( (status = 'open') OR (status = 'shipped') )"));
    assert!(!ddl.contains("TRIGGER"));

    assert_eq!(descriptor.column("number").unwrap().identity(), IdentityMode::Always);
    assert!(descriptor.column("placed_on").is_some());
    assert_eq!(descriptor.member_column("placed").unwrap(), "placed_on");
}

#[test]
fn test_generated_accessors() {
    let entity = customer();
    assert_eq!(entity.id(), None);
    assert_eq!(entity.column_value("email"), Some(Value::Text("ada@example.com".into())));
    assert!(entity.column_value("session_token").is_none());

    let id = Uuid::new_v4();
    let stored = entity.clone().with_id(id);
    assert_eq!(stored.id, Some(id));
    assert_eq!(stored.email, entity.email);
}

#[test]
fn test_insert_statement_for_derived_entity() {
    let synth = Synthesizer::for_entity::<Customer>().unwrap();
    let statement = synth.insert(&customer()).unwrap();
    assert!(statement.text.starts_with("INSERT INTO customers ("));
    assert!(statement.text.ends_with("RETURNING id"));
    assert!(!statement.text.contains("session_token"));
    assert_eq!(statement.parameters.len(), 4);
}

#[test]
fn test_filter_accepts_member_or_column_name() {
    let synth = Synthesizer::for_entity::<Order>().unwrap();
    let by_member = synth
        .select(&Filter::all().eq("placed", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()), Selection::All)
        .unwrap();
    let by_column = synth
        .select(&Filter::all().eq("placed_on", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()), Selection::All)
        .unwrap();
    assert_eq!(by_member.text, by_column.text);
    assert!(by_member.text.contains("placed_on = $1"));
}
