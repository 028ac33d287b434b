//! Statically typed field bindings.
//!
//! [`SqlField`] ties a Rust field type to its [`SemanticType`], its bound
//! [`Value`] and its row decoding. Generated entity code goes through this trait
//! rather than inspecting fields at run time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use may_postgres::Row;
use postgres_types::FromSqlOwned;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::net::IpAddr;
use uuid::Uuid;

use crate::executor::DbError;
use crate::schema::types::SemanticType;
use crate::value::{Value, WideInteger};

pub trait SqlField: Sized {
    const SEMANTIC: SemanticType;
    const NULLABLE: bool = false;

    /// The driver-level type the column is decoded as.
    type Raw: FromSqlOwned;

    fn to_value(&self) -> Value;

    /// # Errors
    ///
    /// Returns `DbError::Decode` when the raw value does not fit the field type.
    fn from_raw(raw: Self::Raw) -> Result<Self, DbError>;

    /// Decode the named column of a row.
    ///
    /// # Errors
    ///
    /// Returns `DbError` when the column is missing, has an incompatible type, or
    /// does not fit the field type.
    fn from_row(row: &Row, column: &str) -> Result<Self, DbError> {
        let raw: Self::Raw = row
            .try_get(column)
            .map_err(|e| DbError::Decode(format!("column `{column}`: {e}")))?;
        Self::from_raw(raw)
    }
}

fn out_of_range<T>(what: &str, value: impl std::fmt::Display) -> Result<T, DbError> {
    Err(DbError::Decode(format!("value {value} does not fit {what}")))
}

macro_rules! direct_field {
    ($($ty:ty => $semantic:expr, $variant:ident);* $(;)?) => {
        $(
            impl SqlField for $ty {
                const SEMANTIC: SemanticType = $semantic;
                type Raw = $ty;

                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }

                fn from_raw(raw: Self::Raw) -> Result<Self, DbError> {
                    Ok(raw)
                }
            }
        )*
    };
}

direct_field! {
    bool => SemanticType::Bool, Bool;
    i16 => SemanticType::I16, SmallInt;
    i32 => SemanticType::I32, Int;
    i64 => SemanticType::I64, BigInt;
    f32 => SemanticType::F32, Real;
    f64 => SemanticType::F64, Double;
    Decimal => SemanticType::Decimal, Decimal;
    String => SemanticType::String, Text;
    Vec<u8> => SemanticType::Bytes, Bytes;
    Uuid => SemanticType::Uuid, Uuid;
    NaiveDate => SemanticType::Date, Date;
    NaiveTime => SemanticType::Time, Time;
    NaiveDateTime => SemanticType::DateTime, Timestamp;
    DateTime<Utc> => SemanticType::DateTimeTz, TimestampTz;
    serde_json::Value => SemanticType::Json, Json;
    IpAddr => SemanticType::IpAddr, Inet;
    Vec<String> => SemanticType::Array(&SemanticType::String), TextArray;
    Vec<i32> => SemanticType::Array(&SemanticType::I32), IntArray;
    Vec<i64> => SemanticType::Array(&SemanticType::I64), BigIntArray;
    Vec<Uuid> => SemanticType::Array(&SemanticType::Uuid), UuidArray;
}

macro_rules! widened_field {
    ($($ty:ty => $semantic:ident, $raw:ty, $variant:ident);* $(;)?) => {
        $(
            impl SqlField for $ty {
                const SEMANTIC: SemanticType = SemanticType::$semantic;
                type Raw = $raw;

                fn to_value(&self) -> Value {
                    Value::$variant(<$raw>::from(*self))
                }

                fn from_raw(raw: Self::Raw) -> Result<Self, DbError> {
                    <$ty>::try_from(raw).or_else(|_| out_of_range(stringify!($ty), raw))
                }
            }
        )*
    };
}

widened_field! {
    i8 => I8, i16, SmallInt;
    u8 => U8, i16, SmallInt;
    u16 => U16, i32, Int;
    u32 => U32, i64, BigInt;
}

impl SqlField for u64 {
    const SEMANTIC: SemanticType = SemanticType::U64;
    type Raw = Decimal;

    fn to_value(&self) -> Value {
        Value::Decimal(Decimal::from(*self))
    }

    fn from_raw(raw: Self::Raw) -> Result<Self, DbError> {
        match raw.to_u64() {
            Some(v) if raw.fract().is_zero() => Ok(v),
            _ => out_of_range("u64", raw),
        }
    }
}

impl SqlField for i128 {
    const SEMANTIC: SemanticType = SemanticType::I128;
    type Raw = WideInteger;

    fn to_value(&self) -> Value {
        Value::I128(*self)
    }

    fn from_raw(raw: Self::Raw) -> Result<Self, DbError> {
        raw.to_i128().map_or_else(|| out_of_range("i128", raw), Ok)
    }
}

impl SqlField for u128 {
    const SEMANTIC: SemanticType = SemanticType::U128;
    type Raw = WideInteger;

    fn to_value(&self) -> Value {
        Value::U128(*self)
    }

    fn from_raw(raw: Self::Raw) -> Result<Self, DbError> {
        raw.to_u128().map_or_else(|| out_of_range("u128", raw), Ok)
    }
}

impl SqlField for char {
    const SEMANTIC: SemanticType = SemanticType::Char;
    type Raw = String;

    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }

    fn from_raw(raw: Self::Raw) -> Result<Self, DbError> {
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => out_of_range("char", format!("{raw:?}")),
        }
    }
}

impl<T: SqlField> SqlField for Option<T> {
    const SEMANTIC: SemanticType = T::SEMANTIC;
    const NULLABLE: bool = true;
    type Raw = Option<T::Raw>;

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, SqlField::to_value)
    }

    fn from_raw(raw: Self::Raw) -> Result<Self, DbError> {
        raw.map(T::from_raw).transpose()
    }
}

/// Field types usable as an entity's primary key.
///
/// `Option<Uuid>` is the usual choice: `None` until the row is inserted. A bare
/// `Uuid` treats the nil UUID as "not yet assigned".
pub trait KeyField: SqlField {
    fn key(&self) -> Option<Uuid>;
    fn from_key(id: Uuid) -> Self;
}

impl KeyField for Uuid {
    fn key(&self) -> Option<Uuid> {
        (!self.is_nil()).then_some(*self)
    }

    fn from_key(id: Uuid) -> Self {
        id
    }
}

impl KeyField for Option<Uuid> {
    fn key(&self) -> Option<Uuid> {
        self.filter(|id| !id.is_nil())
    }

    fn from_key(id: Uuid) -> Self {
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_is_nullable_with_inner_semantic() {
        assert!(<Option<String> as SqlField>::NULLABLE);
        assert!(!<String as SqlField>::NULLABLE);
        assert_eq!(<Option<i64> as SqlField>::SEMANTIC, SemanticType::I64);
        assert_eq!(None::<i64>.to_value(), Value::Null);
        assert_eq!(Some(5i64).to_value(), Value::BigInt(5));
    }

    #[test]
    fn test_unsigned_widening() {
        assert_eq!(200u8.to_value(), Value::SmallInt(200));
        assert_eq!(u8::from_raw(255).unwrap(), 255);
        assert!(u8::from_raw(256).is_err());
        assert!(u32::from_raw(-1).is_err());
    }

    #[test]
    fn test_u64_through_numeric() {
        assert_eq!(u64::MAX.to_value(), Value::Decimal(Decimal::from(u64::MAX)));
        assert_eq!(u64::from_raw(Decimal::from(42u64)).unwrap(), 42);
        assert!(u64::from_raw(Decimal::new(15, 1)).is_err());
        assert!(u64::from_raw(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_128_bit_fields_cover_their_full_range() {
        assert_eq!(i128::from_raw(WideInteger::from(i128::MIN)).unwrap(), i128::MIN);
        assert_eq!(u128::from_raw(WideInteger::from(u128::MAX)).unwrap(), u128::MAX);
        assert!(i128::from_raw(WideInteger::from(u128::MAX)).is_err());
        assert!(u128::from_raw(WideInteger::from(-1i128)).is_err());
    }

    #[test]
    fn test_char_requires_single_character() {
        assert_eq!(char::from_raw("x".to_string()).unwrap(), 'x');
        assert!(char::from_raw("xy".to_string()).is_err());
        assert!(char::from_raw(String::new()).is_err());
    }

    #[test]
    fn test_option_from_raw() {
        assert_eq!(<Option<u8>>::from_raw(None).unwrap(), None);
        assert_eq!(<Option<u8>>::from_raw(Some(7)).unwrap(), Some(7));
        assert!(<Option<u8>>::from_raw(Some(-7)).is_err());
    }

    #[test]
    fn test_key_field() {
        assert_eq!(Uuid::nil().key(), None);
        assert_eq!(None::<Uuid>.key(), None);
        let id = Uuid::new_v4();
        assert_eq!(<Option<Uuid>>::from_key(id).key(), Some(id));
        assert_eq!(id.key(), Some(id));
    }
}
