//! Schema metadata: type mapping, column and entity descriptors, DDL.

pub mod column;
pub mod ddl;
pub mod descriptor;
pub mod field;
pub mod naming;
pub mod table;
pub mod types;

pub use column::{CheckJoin, ColumnDescriptor, ColumnSpec, IdentityMode};
pub use ddl::{TOUCH_FUNCTION, TOUCH_FUNCTION_SQL};
pub use descriptor::EntityDescriptor;
pub use field::{KeyField, SqlField};
pub use naming::{snake_case, NameConvention, SnakeCase};
pub use table::{Entity, TableBuilder};
pub use types::{ColumnSize, ColumnType, Mapping, SemanticType, StorageClass, TypeMap};
