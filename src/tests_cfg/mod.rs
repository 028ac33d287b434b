//! Entities shared by the unit tests.

use chrono::{DateTime, NaiveDate, Utc};
use may_postgres::Row;
use uuid::Uuid;

use crate::executor::DbError;
use crate::schema::{Entity, EntityDescriptor, IdentityMode, SqlField, TableBuilder};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: Option<Uuid>,
    pub user_name: String,
    pub bio: Option<String>,
    pub active: bool,
    pub created: DateTime<Utc>,
}

impl Account {
    pub fn named(user_name: &str) -> Self {
        Self {
            id: None,
            user_name: user_name.to_string(),
            bio: None,
            active: true,
            created: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
        }
    }
}

impl Entity for Account {
    fn table_name() -> &'static str {
        "accounts"
    }

    fn define(table: &mut TableBuilder) {
        table.column::<Option<Uuid>>("id").primary_key();
        table.column::<String>("user_name").size(64).unique();
        table.column::<Option<String>>("bio");
        table.column::<bool>("active").default_expr("true");
        table.column::<DateTime<Utc>>("created").default_expr("now()").indexed();
    }

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn with_id(self, id: Uuid) -> Self {
        Self { id: Some(id), ..self }
    }

    fn column_value(&self, member: &str) -> Option<Value> {
        match member {
            "id" => Some(self.id.to_value()),
            "user_name" => Some(self.user_name.to_value()),
            "bio" => Some(self.bio.to_value()),
            "active" => Some(self.active.to_value()),
            "created" => Some(self.created.to_value()),
            _ => None,
        }
    }

    fn from_row(row: &Row, descriptor: &EntityDescriptor) -> Result<Self, DbError> {
        Ok(Self {
            id: SqlField::from_row(row, descriptor.member_column("id")?)?,
            user_name: SqlField::from_row(row, descriptor.member_column("user_name")?)?,
            bio: SqlField::from_row(row, descriptor.member_column("bio")?)?,
            active: SqlField::from_row(row, descriptor.member_column("active")?)?,
            created: SqlField::from_row(row, descriptor.member_column("created")?)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub id: Uuid,
    pub account_id: Uuid,
    pub role: String,
    pub joined: NaiveDate,
}

impl Entity for Membership {
    fn table_name() -> &'static str {
        "memberships"
    }

    fn define(table: &mut TableBuilder) {
        table.column::<Uuid>("id").primary_key();
        table.column::<Uuid>("account_id").foreign_key("accounts");
        table
            .column::<String>("role")
            .check("role = 'owner'")
            .check("role = 'member'")
            .checks_any();
        table.column::<NaiveDate>("joined");
        table.touch_trigger(false);
    }

    fn id(&self) -> Option<Uuid> {
        crate::schema::KeyField::key(&self.id)
    }

    fn with_id(self, id: Uuid) -> Self {
        Self { id, ..self }
    }

    fn column_value(&self, member: &str) -> Option<Value> {
        match member {
            "id" => Some(self.id.to_value()),
            "account_id" => Some(self.account_id.to_value()),
            "role" => Some(self.role.to_value()),
            "joined" => Some(self.joined.to_value()),
            _ => None,
        }
    }

    fn from_row(row: &Row, descriptor: &EntityDescriptor) -> Result<Self, DbError> {
        Ok(Self {
            id: SqlField::from_row(row, descriptor.member_column("id")?)?,
            account_id: SqlField::from_row(row, descriptor.member_column("account_id")?)?,
            role: SqlField::from_row(row, descriptor.member_column("role")?)?,
            joined: SqlField::from_row(row, descriptor.member_column("joined")?)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: Option<Uuid>,
    pub seq: i64,
    pub body: String,
    pub score: Option<f64>,
    pub draft: String,
}

impl Entity for Note {
    fn table_name() -> &'static str {
        "notes"
    }

    fn define(table: &mut TableBuilder) {
        table.column::<Option<Uuid>>("id").primary_key();
        table.column::<i64>("seq").identity(IdentityMode::Always);
        table.column::<String>("body");
        table.column::<Option<f64>>("score");
        table.skip("draft");
    }

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn with_id(self, id: Uuid) -> Self {
        Self { id: Some(id), ..self }
    }

    fn column_value(&self, member: &str) -> Option<Value> {
        match member {
            "id" => Some(self.id.to_value()),
            "seq" => Some(self.seq.to_value()),
            "body" => Some(self.body.to_value()),
            "score" => Some(self.score.to_value()),
            _ => None,
        }
    }

    fn from_row(row: &Row, descriptor: &EntityDescriptor) -> Result<Self, DbError> {
        Ok(Self {
            id: SqlField::from_row(row, descriptor.member_column("id")?)?,
            seq: SqlField::from_row(row, descriptor.member_column("seq")?)?,
            body: SqlField::from_row(row, descriptor.member_column("body")?)?,
            score: SqlField::from_row(row, descriptor.member_column("score")?)?,
            draft: String::new(),
        })
    }
}

/// `number` is generated by default unless the caller supplies one.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub id: Option<Uuid>,
    pub number: Option<i64>,
    pub title: String,
}

impl Ticket {
    pub fn titled(title: &str) -> Self {
        Self {
            id: None,
            number: None,
            title: title.to_string(),
        }
    }
}

impl Entity for Ticket {
    fn table_name() -> &'static str {
        "tickets"
    }

    fn define(table: &mut TableBuilder) {
        table.column::<Option<Uuid>>("id").primary_key();
        table.column::<Option<i64>>("number").identity(IdentityMode::ByDefault);
        table.column::<String>("title");
    }

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn with_id(self, id: Uuid) -> Self {
        Self { id: Some(id), ..self }
    }

    fn column_value(&self, member: &str) -> Option<Value> {
        match member {
            "id" => Some(self.id.to_value()),
            "number" => Some(self.number.to_value()),
            "title" => Some(self.title.to_value()),
            _ => None,
        }
    }

    fn from_row(row: &Row, descriptor: &EntityDescriptor) -> Result<Self, DbError> {
        Ok(Self {
            id: SqlField::from_row(row, descriptor.member_column("id")?)?,
            number: SqlField::from_row(row, descriptor.member_column("number")?)?,
            title: SqlField::from_row(row, descriptor.member_column("title")?)?,
        })
    }
}
