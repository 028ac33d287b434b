//! Semantic type to column type mapping.
//!
//! A field's Rust type is described by a [`SemanticType`]. A [`TypeMap`] turns it
//! into an abstract [`ColumnType`] plus an effective [`ColumnSize`], and the column
//! type renders its PostgreSQL type text.

use postgres_types::Type;
use std::collections::HashMap;
use std::fmt;

use crate::error::ConfigurationError;

/// The kind of value a member holds, independent of any SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    Decimal,
    Char,
    String,
    Bytes,
    Uuid,
    Date,
    Time,
    DateTime,
    DateTimeTz,
    Interval,
    Json,
    IpAddr,
    IpNetwork,
    MacAddress,
    BitString,
    Point,
    Line,
    LineSegment,
    Box,
    Path,
    Polygon,
    Circle,
    IntRange,
    BigIntRange,
    DecimalRange,
    DateRange,
    DateTimeRange,
    DateTimeTzRange,
    Array(&'static SemanticType),
    /// A caller-defined kind, resolved only by entries added with [`TypeMap::with`].
    Named(&'static str),
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticType::Array(inner) => write!(f, "Array<{inner}>"),
            SemanticType::Named(name) => write!(f, "Named({name})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Declared or implied size of a column. The variants are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnSize {
    #[default]
    None,
    /// Character or bit length
    Length(u32),
    /// Numeric precision and scale, or fractional-second precision for time types
    Precision { precision: u8, scale: u8 },
    /// Inclusive value range, rendered as a check constraint
    Range { min: i64, max: i64 },
}

impl ColumnSize {
    pub fn is_none(&self) -> bool {
        matches!(self, ColumnSize::None)
    }

    /// Sort key used when laying out columns.
    pub fn magnitude(&self) -> u32 {
        match self {
            ColumnSize::Length(n) => *n,
            ColumnSize::Precision { precision, .. } => u32::from(*precision),
            ColumnSize::None | ColumnSize::Range { .. } => 0,
        }
    }
}

impl fmt::Display for ColumnSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSize::None => f.write_str("none"),
            ColumnSize::Length(n) => write!(f, "length {n}"),
            ColumnSize::Precision { precision, scale } => write!(f, "precision({precision}, {scale})"),
            ColumnSize::Range { min, max } => write!(f, "range({min}..={max})"),
        }
    }
}

/// Storage classes in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StorageClass {
    /// Fixed on-disk width in bytes
    Fixed(u16),
    /// Variable width with a declared bound
    Bounded,
    /// Variable width without a bound
    Unbounded,
}

impl StorageClass {
    pub fn rank(&self) -> u8 {
        match self {
            StorageClass::Fixed(_) => 0,
            StorageClass::Bounded => 1,
            StorageClass::Unbounded => 2,
        }
    }
}

/// Abstract column types, rendered as PostgreSQL type text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    SmallInt,
    Integer,
    BigInt,
    SmallSerial,
    Serial,
    BigSerial,
    Real,
    DoublePrecision,
    Numeric,
    Money,
    Boolean,
    Char,
    VarChar,
    Text,
    Citext,
    Bytea,
    Bit,
    VarBit,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Interval,
    Uuid,
    Json,
    Jsonb,
    JsonPath,
    Xml,
    Inet,
    Cidr,
    MacAddr,
    MacAddr8,
    Point,
    Line,
    LineSegment,
    Box,
    Path,
    Polygon,
    Circle,
    TsVector,
    TsQuery,
    Int4Range,
    Int8Range,
    NumRange,
    DateRange,
    TsRange,
    TsTzRange,
    Int4MultiRange,
    Int8MultiRange,
    NumMultiRange,
    DateMultiRange,
    TsMultiRange,
    TsTzMultiRange,
    Oid,
    RegClass,
    PgLsn,
    PgSnapshot,
    Hstore,
    Ltree,
    SmallIntArray,
    IntegerArray,
    BigIntArray,
    RealArray,
    DoubleArray,
    NumericArray,
    BooleanArray,
    TextArray,
    UuidArray,
    TimestampTzArray,
    JsonbArray,
}

impl ColumnType {
    fn base_text(&self) -> &'static str {
        match self {
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::SmallSerial => "SMALLSERIAL",
            ColumnType::Serial => "SERIAL",
            ColumnType::BigSerial => "BIGSERIAL",
            ColumnType::Real => "REAL",
            ColumnType::DoublePrecision => "DOUBLE PRECISION",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Money => "MONEY",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Char => "CHAR",
            ColumnType::VarChar => "VARCHAR",
            ColumnType::Text => "TEXT",
            ColumnType::Citext => "CITEXT",
            ColumnType::Bytea => "BYTEA",
            ColumnType::Bit => "BIT",
            ColumnType::VarBit => "VARBIT",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
            ColumnType::TimeTz => "TIMETZ",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::TimestampTz => "TIMESTAMPTZ",
            ColumnType::Interval => "INTERVAL",
            ColumnType::Uuid => "UUID",
            ColumnType::Json => "JSON",
            ColumnType::Jsonb => "JSONB",
            ColumnType::JsonPath => "JSONPATH",
            ColumnType::Xml => "XML",
            ColumnType::Inet => "INET",
            ColumnType::Cidr => "CIDR",
            ColumnType::MacAddr => "MACADDR",
            ColumnType::MacAddr8 => "MACADDR8",
            ColumnType::Point => "POINT",
            ColumnType::Line => "LINE",
            ColumnType::LineSegment => "LSEG",
            ColumnType::Box => "BOX",
            ColumnType::Path => "PATH",
            ColumnType::Polygon => "POLYGON",
            ColumnType::Circle => "CIRCLE",
            ColumnType::TsVector => "TSVECTOR",
            ColumnType::TsQuery => "TSQUERY",
            ColumnType::Int4Range => "INT4RANGE",
            ColumnType::Int8Range => "INT8RANGE",
            ColumnType::NumRange => "NUMRANGE",
            ColumnType::DateRange => "DATERANGE",
            ColumnType::TsRange => "TSRANGE",
            ColumnType::TsTzRange => "TSTZRANGE",
            ColumnType::Int4MultiRange => "INT4MULTIRANGE",
            ColumnType::Int8MultiRange => "INT8MULTIRANGE",
            ColumnType::NumMultiRange => "NUMMULTIRANGE",
            ColumnType::DateMultiRange => "DATEMULTIRANGE",
            ColumnType::TsMultiRange => "TSMULTIRANGE",
            ColumnType::TsTzMultiRange => "TSTZMULTIRANGE",
            ColumnType::Oid => "OID",
            ColumnType::RegClass => "REGCLASS",
            ColumnType::PgLsn => "PG_LSN",
            ColumnType::PgSnapshot => "PG_SNAPSHOT",
            ColumnType::Hstore => "HSTORE",
            ColumnType::Ltree => "LTREE",
            ColumnType::SmallIntArray => "SMALLINT[]",
            ColumnType::IntegerArray => "INTEGER[]",
            ColumnType::BigIntArray => "BIGINT[]",
            ColumnType::RealArray => "REAL[]",
            ColumnType::DoubleArray => "DOUBLE PRECISION[]",
            ColumnType::NumericArray => "NUMERIC[]",
            ColumnType::BooleanArray => "BOOLEAN[]",
            ColumnType::TextArray => "TEXT[]",
            ColumnType::UuidArray => "UUID[]",
            ColumnType::TimestampTzArray => "TIMESTAMPTZ[]",
            ColumnType::JsonbArray => "JSONB[]",
        }
    }

    /// The type a bound parameter is cast to when the server cannot infer it.
    ///
    /// Carries no size modifier: an explicit cast to `VARCHAR(n)` truncates
    /// where an assignment raises, and bare `CHAR` or `BIT` mean length one.
    /// Serial pseudo-types cast as their integer type.
    pub fn cast_text(&self) -> &'static str {
        match self {
            ColumnType::Char => "BPCHAR",
            ColumnType::Bit => "VARBIT",
            ColumnType::SmallSerial => "SMALLINT",
            ColumnType::Serial => "INTEGER",
            ColumnType::BigSerial => "BIGINT",
            other => other.base_text(),
        }
    }

    /// Render the type text including any size modifier.
    ///
    /// Range sizes never appear in the type text; they become check constraints.
    pub fn type_text(&self, size: &ColumnSize) -> String {
        let base = self.base_text();
        match (self, size) {
            (ColumnType::Char | ColumnType::VarChar | ColumnType::Bit | ColumnType::VarBit, ColumnSize::Length(n)) => {
                format!("{base}({n})")
            }
            (ColumnType::Numeric, ColumnSize::Precision { precision, scale }) => {
                format!("{base}({precision},{scale})")
            }
            (ColumnType::Time | ColumnType::Timestamp | ColumnType::Interval, ColumnSize::Precision { precision, .. }) => {
                format!("{base}({precision})")
            }
            (ColumnType::TimeTz, ColumnSize::Precision { precision, .. }) => format!("TIME({precision}) WITH TIME ZONE"),
            (ColumnType::TimestampTz, ColumnSize::Precision { precision, .. }) => {
                format!("TIMESTAMP({precision}) WITH TIME ZONE")
            }
            _ => base.to_string(),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::SmallInt
                | ColumnType::Integer
                | ColumnType::BigInt
                | ColumnType::SmallSerial
                | ColumnType::Serial
                | ColumnType::BigSerial
        )
    }

    fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(
                self,
                ColumnType::Real | ColumnType::DoublePrecision | ColumnType::Numeric | ColumnType::Money
            )
    }

    /// Whether an explicit size is meaningful for this type.
    pub fn accepts_size(&self, size: &ColumnSize) -> bool {
        match size {
            ColumnSize::None => true,
            ColumnSize::Length(n) => {
                *n > 0 && matches!(self, ColumnType::Char | ColumnType::VarChar | ColumnType::Bit | ColumnType::VarBit)
            }
            ColumnSize::Precision { precision, scale } => match self {
                ColumnType::Numeric => *precision > 0 && scale <= precision,
                ColumnType::Real | ColumnType::DoublePrecision => *precision > 0 && *precision <= 53,
                ColumnType::Time
                | ColumnType::TimeTz
                | ColumnType::Timestamp
                | ColumnType::TimestampTz
                | ColumnType::Interval => *precision <= 6,
                _ => false,
            },
            ColumnSize::Range { min, max } => self.is_numeric() && min <= max,
        }
    }

    /// Whether check constraints may be declared on this type.
    pub fn accepts_checks(&self) -> bool {
        !matches!(
            self,
            ColumnType::Bytea
                | ColumnType::Json
                | ColumnType::Jsonb
                | ColumnType::JsonPath
                | ColumnType::Xml
                | ColumnType::Point
                | ColumnType::Line
                | ColumnType::LineSegment
                | ColumnType::Box
                | ColumnType::Path
                | ColumnType::Polygon
                | ColumnType::Circle
                | ColumnType::TsVector
                | ColumnType::TsQuery
                | ColumnType::Hstore
                | ColumnType::PgSnapshot
                | ColumnType::SmallIntArray
                | ColumnType::IntegerArray
                | ColumnType::BigIntArray
                | ColumnType::RealArray
                | ColumnType::DoubleArray
                | ColumnType::NumericArray
                | ColumnType::BooleanArray
                | ColumnType::TextArray
                | ColumnType::UuidArray
                | ColumnType::TimestampTzArray
                | ColumnType::JsonbArray
        )
    }

    pub fn storage(&self) -> StorageClass {
        match self {
            ColumnType::Boolean => StorageClass::Fixed(1),
            ColumnType::SmallInt | ColumnType::SmallSerial => StorageClass::Fixed(2),
            ColumnType::Integer
            | ColumnType::Serial
            | ColumnType::Real
            | ColumnType::Date
            | ColumnType::Oid
            | ColumnType::RegClass => StorageClass::Fixed(4),
            ColumnType::MacAddr => StorageClass::Fixed(6),
            ColumnType::BigInt
            | ColumnType::BigSerial
            | ColumnType::DoublePrecision
            | ColumnType::Money
            | ColumnType::Time
            | ColumnType::Timestamp
            | ColumnType::TimestampTz
            | ColumnType::MacAddr8
            | ColumnType::PgLsn => StorageClass::Fixed(8),
            ColumnType::TimeTz => StorageClass::Fixed(12),
            ColumnType::Interval | ColumnType::Uuid | ColumnType::Point => StorageClass::Fixed(16),
            ColumnType::Line | ColumnType::Circle => StorageClass::Fixed(24),
            ColumnType::LineSegment | ColumnType::Box => StorageClass::Fixed(32),
            ColumnType::Char
            | ColumnType::VarChar
            | ColumnType::Bit
            | ColumnType::VarBit
            | ColumnType::Numeric
            | ColumnType::Inet
            | ColumnType::Cidr => StorageClass::Bounded,
            _ => StorageClass::Unbounded,
        }
    }

    /// Variable-length types store a length header with each value.
    pub fn is_variable_length(&self) -> bool {
        !matches!(self.storage(), StorageClass::Fixed(_)) && !matches!(self, ColumnType::Char | ColumnType::Bit)
    }

    /// Wire type for binary COPY, when the crate can encode values of this type.
    pub fn postgres_type(&self) -> Option<Type> {
        let ty = match self {
            ColumnType::SmallInt | ColumnType::SmallSerial => Type::INT2,
            ColumnType::Integer | ColumnType::Serial => Type::INT4,
            ColumnType::BigInt | ColumnType::BigSerial => Type::INT8,
            ColumnType::Real => Type::FLOAT4,
            ColumnType::DoublePrecision => Type::FLOAT8,
            ColumnType::Numeric => Type::NUMERIC,
            ColumnType::Boolean => Type::BOOL,
            ColumnType::Char => Type::BPCHAR,
            ColumnType::VarChar => Type::VARCHAR,
            ColumnType::Text => Type::TEXT,
            ColumnType::Bytea => Type::BYTEA,
            ColumnType::Date => Type::DATE,
            ColumnType::Time => Type::TIME,
            ColumnType::Timestamp => Type::TIMESTAMP,
            ColumnType::TimestampTz => Type::TIMESTAMPTZ,
            ColumnType::Uuid => Type::UUID,
            ColumnType::Json => Type::JSON,
            ColumnType::Jsonb => Type::JSONB,
            ColumnType::Inet => Type::INET,
            ColumnType::IntegerArray => Type::INT4_ARRAY,
            ColumnType::BigIntArray => Type::INT8_ARRAY,
            ColumnType::TextArray => Type::TEXT_ARRAY,
            ColumnType::UuidArray => Type::UUID_ARRAY,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_text())
    }
}

/// One entry of a [`TypeMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub column_type: ColumnType,
    /// Size applied when the declaration gives none
    pub default_size: ColumnSize,
    /// Alternative type used when an explicit length is declared (`TEXT` becomes `VARCHAR(n)`)
    pub sized: Option<ColumnType>,
}

impl Mapping {
    pub const fn new(column_type: ColumnType) -> Self {
        Self {
            column_type,
            default_size: ColumnSize::None,
            sized: None,
        }
    }

    pub fn with_default_size(mut self, size: ColumnSize) -> Self {
        self.default_size = size;
        self
    }

    pub fn sized_as(mut self, column_type: ColumnType) -> Self {
        self.sized = Some(column_type);
        self
    }
}

/// Pluggable semantic-type mapping table.
#[derive(Debug, Clone)]
pub struct TypeMap {
    entries: HashMap<SemanticType, Mapping>,
}

const fn precision(precision: u8, scale: u8) -> ColumnSize {
    ColumnSize::Precision { precision, scale }
}

impl TypeMap {
    /// An empty table; every lookup fails until entries are added.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The PostgreSQL defaults.
    pub fn postgres() -> Self {
        use ColumnType as C;
        use SemanticType as S;

        let entries = [
            (S::Bool, Mapping::new(C::Boolean)),
            (S::I8, Mapping::new(C::SmallInt)),
            (S::I16, Mapping::new(C::SmallInt)),
            (S::I32, Mapping::new(C::Integer)),
            (S::I64, Mapping::new(C::BigInt)),
            (S::I128, Mapping::new(C::Numeric).with_default_size(precision(39, 0))),
            (S::U8, Mapping::new(C::SmallInt)),
            (S::U16, Mapping::new(C::Integer)),
            (S::U32, Mapping::new(C::BigInt)),
            (S::U64, Mapping::new(C::Numeric).with_default_size(precision(20, 0))),
            (S::U128, Mapping::new(C::Numeric).with_default_size(precision(39, 0))),
            (S::F32, Mapping::new(C::Real).with_default_size(precision(24, 0))),
            (S::F64, Mapping::new(C::DoublePrecision).with_default_size(precision(53, 0))),
            (S::Decimal, Mapping::new(C::Numeric).with_default_size(precision(10, 2))),
            (S::Char, Mapping::new(C::Char).with_default_size(ColumnSize::Length(1))),
            (S::String, Mapping::new(C::Text).sized_as(C::VarChar)),
            (S::Bytes, Mapping::new(C::Bytea)),
            (S::Uuid, Mapping::new(C::Uuid)),
            (S::Date, Mapping::new(C::Date)),
            (S::Time, Mapping::new(C::Time)),
            (S::DateTime, Mapping::new(C::Timestamp)),
            (S::DateTimeTz, Mapping::new(C::TimestampTz)),
            (S::Interval, Mapping::new(C::Interval)),
            (S::Json, Mapping::new(C::Jsonb)),
            (S::IpAddr, Mapping::new(C::Inet)),
            (S::IpNetwork, Mapping::new(C::Cidr)),
            (S::MacAddress, Mapping::new(C::MacAddr)),
            (S::BitString, Mapping::new(C::VarBit).sized_as(C::Bit)),
            (S::Point, Mapping::new(C::Point)),
            (S::Line, Mapping::new(C::Line)),
            (S::LineSegment, Mapping::new(C::LineSegment)),
            (S::Box, Mapping::new(C::Box)),
            (S::Path, Mapping::new(C::Path)),
            (S::Polygon, Mapping::new(C::Polygon)),
            (S::Circle, Mapping::new(C::Circle)),
            (S::IntRange, Mapping::new(C::Int4Range)),
            (S::BigIntRange, Mapping::new(C::Int8Range)),
            (S::DecimalRange, Mapping::new(C::NumRange)),
            (S::DateRange, Mapping::new(C::DateRange)),
            (S::DateTimeRange, Mapping::new(C::TsRange)),
            (S::DateTimeTzRange, Mapping::new(C::TsTzRange)),
            (S::Array(&S::I16), Mapping::new(C::SmallIntArray)),
            (S::Array(&S::I32), Mapping::new(C::IntegerArray)),
            (S::Array(&S::I64), Mapping::new(C::BigIntArray)),
            (S::Array(&S::F32), Mapping::new(C::RealArray)),
            (S::Array(&S::F64), Mapping::new(C::DoubleArray)),
            (S::Array(&S::Decimal), Mapping::new(C::NumericArray)),
            (S::Array(&S::Bool), Mapping::new(C::BooleanArray)),
            (S::Array(&S::String), Mapping::new(C::TextArray)),
            (S::Array(&S::Uuid), Mapping::new(C::UuidArray)),
            (S::Array(&S::DateTimeTz), Mapping::new(C::TimestampTzArray)),
            (S::Array(&S::Json), Mapping::new(C::JsonbArray)),
        ];

        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Add or replace an entry.
    #[must_use]
    pub fn with(mut self, semantic: SemanticType, mapping: Mapping) -> Self {
        self.entries.insert(semantic, mapping);
        self
    }

    pub fn get(&self, semantic: &SemanticType) -> Option<&Mapping> {
        self.entries.get(semantic)
    }

    /// Map a member's semantic type and optional explicit size.
    ///
    /// An explicit size always overrides the implied default.
    pub fn map(
        &self,
        member: &str,
        semantic: SemanticType,
        explicit: ColumnSize,
    ) -> Result<(ColumnType, ColumnSize), ConfigurationError> {
        let mapping = self
            .entries
            .get(&semantic)
            .ok_or_else(|| ConfigurationError::UnmappedType {
                member: member.to_string(),
                semantic: semantic.to_string(),
            })?;

        if explicit.is_none() {
            return Ok((mapping.column_type, mapping.default_size));
        }

        let column_type = match (explicit, mapping.sized) {
            (ColumnSize::Length(_), Some(sized)) => sized,
            _ => mapping.column_type,
        };
        Ok((column_type, explicit))
    }
}

impl Default for TypeMap {
    fn default() -> Self {
        Self::postgres()
    }
}
