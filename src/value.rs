//! Bound parameter values.
//!
//! [`Value`] is the owned, dynamically-typed value carried by synthesized
//! statements. It implements [`ToSql`] so a parameter snapshot can be bound to
//! the driver directly, and it knows how to render itself for text-format COPY.

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres_types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use rust_decimal::Decimal;
use std::error::Error as StdError;
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// A single bindable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    /// 128-bit integers travel as NUMERIC.
    I128(i128),
    U128(u128),
    Real(f32),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
    Inet(IpAddr),
    TextArray(Vec<String>),
    IntArray(Vec<i32>),
    BigIntArray(Vec<i64>),
    UuidArray(Vec<Uuid>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the value in PostgreSQL's COPY text representation, unescaped.
    ///
    /// Returns `None` for NULL.
    pub fn copy_text(&self) -> Option<String> {
        let text = match self {
            Value::Null => return None,
            Value::Bool(v) => if *v { "t".to_string() } else { "f".to_string() },
            Value::SmallInt(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::BigInt(v) => v.to_string(),
            Value::I128(v) => v.to_string(),
            Value::U128(v) => v.to_string(),
            Value::Real(v) => float_text(*v),
            Value::Double(v) => float_text(*v),
            Value::Decimal(v) => v.to_string(),
            Value::Text(v) => v.clone(),
            Value::Bytes(v) => {
                let mut out = String::with_capacity(2 + v.len() * 2);
                out.push_str("\\x");
                for b in v {
                    out.push_str(&format!("{b:02x}"));
                }
                out
            }
            Value::Uuid(v) => v.to_string(),
            Value::Date(v) => v.format("%Y-%m-%d").to_string(),
            Value::Time(v) => v.format("%H:%M:%S%.f").to_string(),
            Value::Timestamp(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            Value::TimestampTz(v) => v.format("%Y-%m-%d %H:%M:%S%.f+00").to_string(),
            Value::Json(v) => v.to_string(),
            Value::Inet(v) => v.to_string(),
            Value::TextArray(v) => array_literal(v.iter().map(|s| quote_array_element(s))),
            Value::IntArray(v) => array_literal(v.iter().map(ToString::to_string)),
            Value::BigIntArray(v) => array_literal(v.iter().map(ToString::to_string)),
            Value::UuidArray(v) => array_literal(v.iter().map(ToString::to_string)),
        };
        Some(text)
    }
}

/// Rust prints infinities as `inf`; COPY and the float input functions want
/// `Infinity`.
fn float_text<F: Into<f64> + ToString + Copy>(v: F) -> String {
    let wide: f64 = v.into();
    if wide.is_nan() {
        "NaN".to_string()
    } else if wide.is_infinite() {
        if wide > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        v.to_string()
    }
}

fn array_literal(items: impl Iterator<Item = String>) -> String {
    let items: Vec<String> = items.collect();
    format!("{{{}}}", items.join(","))
}

fn quote_array_element(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Integers are narrowed or widened to the width the server asked for.
fn integer_to_sql(
    v: i64,
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
    if *ty == Type::INT2 {
        i16::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        Decimal::from(v).to_sql(ty, out)
    } else {
        v.to_sql(ty, out)
    }
}

fn wide_to_sql(
    v: WideInteger,
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
    if *ty == Type::NUMERIC {
        return v.to_sql(ty, out);
    }
    let narrow = v
        .to_i128()
        .and_then(|n| i64::try_from(n).ok())
        .ok_or_else(|| format!("integer {v} does not fit {ty}"))?;
    integer_to_sql(narrow, ty, out)
}

const NUMERIC_POSITIVE: u16 = 0x0000;
const NUMERIC_NEGATIVE: u16 = 0x4000;
const NUMERIC_BASE: u128 = 10_000;

/// A 128-bit integer in PostgreSQL's binary NUMERIC form.
///
/// `rust_decimal` stops at 96 bits, so `i128` and `u128` fields encode their
/// base-10000 digits directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WideInteger {
    negative: bool,
    magnitude: u128,
}

impl WideInteger {
    pub fn to_i128(self) -> Option<i128> {
        if self.negative {
            0i128.checked_sub_unsigned(self.magnitude)
        } else {
            i128::try_from(self.magnitude).ok()
        }
    }

    pub fn to_u128(self) -> Option<u128> {
        if self.negative && self.magnitude != 0 {
            None
        } else {
            Some(self.magnitude)
        }
    }
}

impl From<i128> for WideInteger {
    fn from(v: i128) -> Self {
        Self {
            negative: v < 0,
            magnitude: v.unsigned_abs(),
        }
    }
}

impl From<u128> for WideInteger {
    fn from(v: u128) -> Self {
        Self {
            negative: false,
            magnitude: v,
        }
    }
}

impl fmt::Display for WideInteger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative && self.magnitude != 0 {
            f.write_str("-")?;
        }
        write!(f, "{}", self.magnitude)
    }
}

impl ToSql for WideInteger {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        // least significant first
        let mut digits: Vec<i16> = Vec::with_capacity(10);
        let mut rest = self.magnitude;
        while rest > 0 {
            digits.push(i16::try_from(rest % NUMERIC_BASE)?);
            rest /= NUMERIC_BASE;
        }
        let weight = i16::try_from(digits.len().saturating_sub(1))?;
        let trailing_zeros = digits.iter().take_while(|d| **d == 0).count();
        let significant = &digits[trailing_zeros..];

        out.put_i16(i16::try_from(significant.len())?);
        out.put_i16(weight);
        out.put_u16(if self.negative && self.magnitude != 0 {
            NUMERIC_NEGATIVE
        } else {
            NUMERIC_POSITIVE
        });
        out.put_u16(0); // display scale
        for digit in significant.iter().rev() {
            out.put_i16(*digit);
        }
        Ok(IsNull::No)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for WideInteger {
    fn from_sql(_ty: &Type, mut raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        if raw.len() < 8 {
            return Err("NUMERIC value is truncated".into());
        }
        let count = usize::try_from(raw.get_i16()).map_err(|_| "NUMERIC digit count is negative")?;
        let weight = i32::from(raw.get_i16());
        let negative = match raw.get_u16() {
            NUMERIC_POSITIVE => false,
            NUMERIC_NEGATIVE => true,
            _ => return Err("NUMERIC value is not a finite number".into()),
        };
        let _scale = raw.get_u16();
        if raw.len() != count * 2 {
            return Err("NUMERIC digit count does not match its payload".into());
        }

        let overflow = || "NUMERIC value does not fit 128 bits";
        let mut magnitude: u128 = 0;
        let mut exponent = weight;
        for _ in 0..count {
            let digit = raw.get_i16();
            if !(0..10_000).contains(&digit) {
                return Err("NUMERIC digit out of range".into());
            }
            if exponent < 0 {
                if digit != 0 {
                    return Err("NUMERIC value has a fractional part".into());
                }
            } else {
                magnitude = magnitude
                    .checked_mul(NUMERIC_BASE)
                    .and_then(|m| m.checked_add(digit.unsigned_abs().into()))
                    .ok_or_else(overflow)?;
            }
            exponent -= 1;
        }
        // digits omitted below the last one sent are zeros
        for _ in 0..=exponent {
            magnitude = magnitude.checked_mul(NUMERIC_BASE).ok_or_else(overflow)?;
        }
        Ok(Self { negative, magnitude })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::SmallInt(v) => integer_to_sql(i64::from(*v), ty, out),
            Value::Int(v) => integer_to_sql(i64::from(*v), ty, out),
            Value::BigInt(v) => integer_to_sql(*v, ty, out),
            Value::I128(v) => wide_to_sql(WideInteger::from(*v), ty, out),
            Value::U128(v) => wide_to_sql(WideInteger::from(*v), ty, out),
            Value::Real(v) => {
                if *ty == Type::FLOAT8 {
                    f64::from(*v).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::Double(v) => v.to_sql(ty, out),
            Value::Decimal(v) => v.to_sql(ty, out),
            Value::Text(v) => v.to_sql(ty, out),
            Value::Bytes(v) => v.to_sql(ty, out),
            Value::Uuid(v) => v.to_sql(ty, out),
            Value::Date(v) => v.to_sql(ty, out),
            Value::Time(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => v.to_sql(ty, out),
            Value::TimestampTz(v) => v.to_sql(ty, out),
            Value::Json(v) => v.to_sql(ty, out),
            Value::Inet(v) => v.to_sql(ty, out),
            Value::TextArray(v) => v.to_sql(ty, out),
            Value::IntArray(v) => v.to_sql(ty, out),
            Value::BigIntArray(v) => v.to_sql(ty, out),
            Value::UuidArray(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            other => match other.copy_text() {
                Some(text) => f.write_str(&text),
                None => f.write_str("NULL"),
            },
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Real,
    f64 => Double,
    Decimal => Decimal,
    String => Text,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    serde_json::Value => Json,
    IpAddr => Inet,
    Vec<String> => TextArray,
    Vec<i32> => IntArray,
    Vec<i64> => BigIntArray,
    Vec<Uuid> => UuidArray,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_text_scalars() {
        assert_eq!(Value::Bool(true).copy_text().as_deref(), Some("t"));
        assert_eq!(Value::Int(-4).copy_text().as_deref(), Some("-4"));
        assert_eq!(Value::Null.copy_text(), None);
        assert_eq!(Value::Bytes(vec![0x01, 0xab]).copy_text().as_deref(), Some("\\x01ab"));
    }

    #[test]
    fn test_copy_text_spells_out_non_finite_floats() {
        assert_eq!(Value::Double(f64::INFINITY).copy_text().as_deref(), Some("Infinity"));
        assert_eq!(Value::Real(f32::NEG_INFINITY).copy_text().as_deref(), Some("-Infinity"));
        assert_eq!(Value::Double(f64::NAN).copy_text().as_deref(), Some("NaN"));
        assert_eq!(Value::Real(1.5).copy_text().as_deref(), Some("1.5"));
    }

    fn numeric_bytes(v: &impl ToSql) -> BytesMut {
        let mut out = BytesMut::new();
        v.to_sql(&Type::NUMERIC, &mut out).unwrap();
        out
    }

    #[test]
    fn test_wide_integer_numeric_layout() {
        // 10000 is a single base-10000 digit of weight 1
        let out = numeric_bytes(&WideInteger::from(10_000i128));
        assert_eq!(&out[..], &[0, 1, 0, 1, 0, 0, 0, 0, 0, 1]);

        let out = numeric_bytes(&WideInteger::from(-42i128));
        assert_eq!(&out[..], &[0, 1, 0, 0, 0x40, 0, 0, 0, 0, 42]);

        let out = numeric_bytes(&WideInteger::from(0u128));
        assert_eq!(&out[..], &[0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_wide_integer_reaches_past_decimal_range() {
        for v in [i128::MAX, i128::MIN, -1, 0, 79_228_162_514_264_337_593_543_950_336] {
            let bytes = numeric_bytes(&Value::I128(v));
            let back = WideInteger::from_sql(&Type::NUMERIC, &bytes).unwrap();
            assert_eq!(back.to_i128(), Some(v));
        }
        let bytes = numeric_bytes(&Value::U128(u128::MAX));
        let back = WideInteger::from_sql(&Type::NUMERIC, &bytes).unwrap();
        assert_eq!(back.to_u128(), Some(u128::MAX));
        assert_eq!(back.to_i128(), None);
    }

    #[test]
    fn test_wide_integer_reads_driver_encoded_numerics() {
        let bytes = numeric_bytes(&Decimal::from(123_456_789_000i64));
        let back = WideInteger::from_sql(&Type::NUMERIC, &bytes).unwrap();
        assert_eq!(back.to_i128(), Some(123_456_789_000));

        let bytes = numeric_bytes(&Decimal::new(15, 1));
        assert!(WideInteger::from_sql(&Type::NUMERIC, &bytes).is_err());
    }

    #[test]
    fn test_wide_integer_narrows_for_integer_columns() {
        let mut out = BytesMut::new();
        Value::I128(7).to_sql(&Type::INT8, &mut out).unwrap();
        assert_eq!(out.len(), 8);
        assert!(Value::U128(u128::MAX).to_sql(&Type::INT8, &mut BytesMut::new()).is_err());
    }

    #[test]
    fn test_copy_text_arrays_quote_elements() {
        let v = Value::TextArray(vec!["a\"b".to_string(), "c".to_string()]);
        assert_eq!(v.copy_text().as_deref(), Some("{\"a\\\"b\",\"c\"}"));
        assert_eq!(Value::IntArray(vec![1, 2]).copy_text().as_deref(), Some("{1,2}"));
    }

    #[test]
    fn test_integer_widening_to_declared_type() {
        let mut out = BytesMut::new();
        Value::Int(7).to_sql(&Type::INT8, &mut out).unwrap();
        assert_eq!(out.len(), 8);

        let mut out = BytesMut::new();
        Value::BigInt(7).to_sql(&Type::INT2, &mut out).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_integer_narrowing_out_of_range_fails() {
        let mut out = BytesMut::new();
        assert!(Value::BigInt(i64::MAX).to_sql(&Type::INT4, &mut out).is_err());
    }

    #[test]
    fn test_null_is_null() {
        let mut out = BytesMut::new();
        let is_null = Value::Null.to_sql(&Type::TEXT, &mut out).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }
}
