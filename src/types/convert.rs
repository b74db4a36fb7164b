//! Conversion of raw cell values into Rust types.
//!
//! Conversions follow general-purpose value conversion rules: integers widen
//! and narrow with overflow checks, floats round half-to-even when converted
//! to integers, text is parsed, and everything except bytes renders to text.

use thiserror::Error;

use crate::types::SqlValue;

/// A non-null value could not be converted to the requested type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("null cannot be converted to {target}")]
    Null { target: &'static str },

    #[error("value {value} is out of range for {target}")]
    Overflow { value: String, target: &'static str },

    #[error("could not parse {value:?} as {target}: {message}")]
    Parse {
        value: String,
        target: &'static str,
        message: String,
    },

    #[error("cannot convert {from} to {target}")]
    Unsupported {
        from: &'static str,
        target: &'static str,
    },

    #[error("{value} is not a defined member of {target}")]
    UndefinedEnumValue { value: i64, target: &'static str },
}

/// Types a raw cell value can be converted into.
pub trait FromSqlValue: Sized {
    /// The value returned for a null cell: the type's zero or default.
    fn from_null() -> Result<Self, ConversionError>;

    /// Convert a non-null cell value.
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError>;
}

fn integral(value: SqlValue, target: &'static str) -> Result<i128, ConversionError> {
    match value {
        SqlValue::Null => Err(ConversionError::Null { target }),
        SqlValue::Bool(b) => Ok(i128::from(b)),
        SqlValue::Int16(i) => Ok(i128::from(i)),
        SqlValue::Int32(i) => Ok(i128::from(i)),
        SqlValue::Int64(i) => Ok(i128::from(i)),
        SqlValue::Float64(v) => {
            let rounded = v.round_ties_even();
            if !rounded.is_finite() || rounded.abs() > i64::MAX as f64 * 2.0 {
                return Err(ConversionError::Overflow {
                    value: v.to_string(),
                    target,
                });
            }
            Ok(rounded as i128)
        }
        SqlValue::Text(s) => s.trim().parse::<i128>().map_err(|e| ConversionError::Parse {
            value: s.clone(),
            target,
            message: e.to_string(),
        }),
        SqlValue::Bytes(_) => Err(ConversionError::Unsupported {
            from: "bytes",
            target,
        }),
    }
}

macro_rules! impl_integral {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromSqlValue for $ty {
                fn from_null() -> Result<Self, ConversionError> {
                    Ok(0)
                }

                fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
                    let wide = integral(value, stringify!($ty))?;
                    <$ty>::try_from(wide).map_err(|_| ConversionError::Overflow {
                        value: wide.to_string(),
                        target: stringify!($ty),
                    })
                }
            }
        )*
    };
}

impl_integral!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromSqlValue for f64 {
    fn from_null() -> Result<Self, ConversionError> {
        Ok(0.0)
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Err(ConversionError::Null { target: "f64" }),
            SqlValue::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
            SqlValue::Int16(i) => Ok(f64::from(i)),
            SqlValue::Int32(i) => Ok(f64::from(i)),
            SqlValue::Int64(i) => Ok(i as f64),
            SqlValue::Float64(v) => Ok(v),
            SqlValue::Text(s) => s.trim().parse::<f64>().map_err(|e| ConversionError::Parse {
                value: s.clone(),
                target: "f64",
                message: e.to_string(),
            }),
            SqlValue::Bytes(_) => Err(ConversionError::Unsupported {
                from: "bytes",
                target: "f64",
            }),
        }
    }
}

impl FromSqlValue for f32 {
    fn from_null() -> Result<Self, ConversionError> {
        Ok(0.0)
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        f64::from_sql_value(value).map(|v| v as f32)
    }
}

impl FromSqlValue for bool {
    fn from_null() -> Result<Self, ConversionError> {
        Ok(false)
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Err(ConversionError::Null { target: "bool" }),
            SqlValue::Bool(b) => Ok(b),
            SqlValue::Int16(i) => Ok(i != 0),
            SqlValue::Int32(i) => Ok(i != 0),
            SqlValue::Int64(i) => Ok(i != 0),
            SqlValue::Float64(v) => Ok(v != 0.0),
            SqlValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(true)
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(false)
                } else {
                    Err(ConversionError::Parse {
                        value: s.clone(),
                        target: "bool",
                        message: "expected `true` or `false`".to_string(),
                    })
                }
            }
            SqlValue::Bytes(_) => Err(ConversionError::Unsupported {
                from: "bytes",
                target: "bool",
            }),
        }
    }
}

impl FromSqlValue for String {
    fn from_null() -> Result<Self, ConversionError> {
        Ok(String::new())
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Text(s) => Ok(s),
            SqlValue::Bytes(_) => Err(ConversionError::Unsupported {
                from: "bytes",
                target: "String",
            }),
            other => Ok(other.to_string()),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_null() -> Result<Self, ConversionError> {
        Ok(Vec::new())
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Bytes(b) => Ok(b),
            other => Err(ConversionError::Unsupported {
                from: other.kind(),
                target: "Vec<u8>",
            }),
        }
    }
}

impl FromSqlValue for SqlValue {
    fn from_null() -> Result<Self, ConversionError> {
        Ok(SqlValue::Null)
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_null() -> Result<Self, ConversionError> {
        Ok(None)
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        T::from_sql_value(value).map(Some)
    }
}

/// Reads the integral discriminant of an enumeration from a raw cell value.
/// Only integer cells are accepted; text and floats are rejected.
#[doc(hidden)]
pub fn enum_discriminant(value: SqlValue, target: &'static str) -> Result<i64, ConversionError> {
    match value {
        SqlValue::Int16(i) => Ok(i64::from(i)),
        SqlValue::Int32(i) => Ok(i64::from(i)),
        SqlValue::Int64(i) => Ok(i),
        SqlValue::Null => Err(ConversionError::Null { target }),
        other => Err(ConversionError::Unsupported {
            from: other.kind(),
            target,
        }),
    }
}

/// Declares an enumeration with explicit integer discriminants that can be
/// read from a cell with [`value`](crate::traits::DataRecord).
///
/// A null cell maps to the member whose discriminant is `0`.
///
/// ```
/// dbexec::sql_enum! {
///     pub enum Status {
///         Pending = 0,
///         Active = 1,
///         Archived = 2,
///     }
/// }
///
/// assert_eq!(Status::from_discriminant(1), Some(Status::Active));
/// ```
#[macro_export]
macro_rules! sql_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            /// Look up the member with the given discriminant.
            pub fn from_discriminant(value: i64) -> ::std::option::Option<Self> {
                $(
                    if value == $value {
                        return ::std::option::Option::Some($name::$variant);
                    }
                )+
                ::std::option::Option::None
            }
        }

        impl $crate::types::FromSqlValue for $name {
            fn from_null() -> ::std::result::Result<Self, $crate::types::ConversionError> {
                Self::from_discriminant(0).ok_or($crate::types::ConversionError::UndefinedEnumValue {
                    value: 0,
                    target: stringify!($name),
                })
            }

            fn from_sql_value(
                value: $crate::types::SqlValue,
            ) -> ::std::result::Result<Self, $crate::types::ConversionError> {
                let discriminant = $crate::types::enum_discriminant(value, stringify!($name))?;
                Self::from_discriminant(discriminant).ok_or(
                    $crate::types::ConversionError::UndefinedEnumValue {
                        value: discriminant,
                        target: stringify!($name),
                    },
                )
            }
        }
    };
}
