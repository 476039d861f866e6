//! Value rules for edits: what text a type accepts, which type text drifts to, and which
//! type changes keep the current value.

use crate::types::{FieldType, ScalarType};
use crate::value::{unescape_bytes, Value};

/// True when `text` is a valid (or still being typed) value of `field_type`.
/// Empty text always passes and means "no value".
pub fn accepts(field_type: &FieldType, text: &str) -> bool {
    if text.is_empty() {
        return true;
    }
    match field_type {
        FieldType::Message(_) | FieldType::Unknown => true,
        FieldType::Number => text == "-" || fits_i64(text) || fits_u64(text),
        FieldType::Scalar(st) => scalar_accepts(*st, text),
    }
}

fn scalar_accepts(st: ScalarType, text: &str) -> bool {
    use ScalarType::*;
    match st {
        String => true,
        Bytes => unescape_bytes(text).is_some() || text.ends_with('\\') || text.ends_with("\\x"),
        Bool => text == "0" || text == "1",
        Float | Double => float_syntax(text),
        Int32 | Sint32 | Sfixed32 => text == "-" || text.parse::<i32>().is_ok() && integer_syntax(text),
        Int64 | Sint64 | Sfixed64 => text == "-" || fits_i64(text),
        Uint32 | Fixed32 => digits(text) && text.parse::<u32>().is_ok(),
        Uint64 | Fixed64 => fits_u64(text),
    }
}

/// Suggest a type that fits `text` better than `field_type`; `None` when the text already
/// fits or no other type is a better fit.
pub fn drift(field_type: &FieldType, text: &str) -> Option<FieldType> {
    if accepts(field_type, text) {
        return None;
    }
    let suggestion = match field_type {
        FieldType::Message(_) | FieldType::Unknown => return None,
        FieldType::Scalar(ScalarType::String) | FieldType::Scalar(ScalarType::Bytes) => return None,
        FieldType::Scalar(ScalarType::Bool) => {
            if text.parse::<i32>().is_ok() && integer_syntax(text) {
                ScalarType::Int32
            } else if fits_i64(text) {
                ScalarType::Int64
            } else if fits_u64(text) {
                ScalarType::Uint64
            } else {
                non_integer(text)
            }
        }
        FieldType::Scalar(st) if st.is_unsigned_integer() => {
            if fits_i64(text) && text.starts_with('-') {
                ScalarType::Int64
            } else if fits_u64(text) {
                ScalarType::Uint64
            } else {
                non_integer(text)
            }
        }
        FieldType::Scalar(st) if st.is_signed_integer() => {
            if fits_i64(text) {
                ScalarType::Int64
            } else if fits_u64(text) {
                ScalarType::Uint64
            } else {
                non_integer(text)
            }
        }
        FieldType::Number => non_integer(text),
        FieldType::Scalar(_) => ScalarType::String,
    };
    let suggestion = FieldType::Scalar(suggestion);
    (&suggestion != field_type && accepts(&suggestion, text)).then_some(suggestion)
}

fn non_integer(text: &str) -> ScalarType {
    if is_float_text(text) {
        ScalarType::Float
    } else {
        ScalarType::String
    }
}

/// Stored value for accepted `text` under `field_type`.
pub fn value_from_text(field_type: &FieldType, text: &str) -> Value {
    match field_type {
        FieldType::Scalar(ScalarType::Bool) => match text {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            _ => Value::Null,
        },
        FieldType::Scalar(ScalarType::String | ScalarType::Bytes) | FieldType::Unknown => Value::text(text),
        _ if text.is_empty() => Value::Null,
        _ => Value::text(text),
    }
}

fn is_numeric(field_type: &FieldType) -> bool {
    match field_type {
        FieldType::Number => true,
        FieldType::Scalar(st) => st.is_numeric(),
        _ => false,
    }
}

fn is_bool(field_type: &FieldType) -> bool {
    *field_type == FieldType::Scalar(ScalarType::Bool)
}

/// True when changing a scalar from `old` to `new` keeps `value`: a value-less node, or a
/// `0`/`1` moving between `bool` and a numeric type.
pub fn is_seamless(old: &FieldType, new: &FieldType, value: &Value) -> bool {
    if old.is_message() || new.is_message() {
        return false;
    }
    if value.is_null() || old == new {
        return true;
    }
    let bool_numeric = (is_bool(old) && is_numeric(new)) || (is_numeric(old) && is_bool(new));
    bool_numeric && value.as_bit().is_some()
}

/// `value` re-expressed for `new` after a seamless change.
pub fn convert_seamless(new: &FieldType, value: &Value) -> Value {
    match (value.as_bit(), is_bool(new)) {
        (Some(bit), true) => Value::Bool(bit),
        (Some(bit), false) => Value::text(if bit { "1" } else { "0" }),
        (None, _) => value.clone(),
    }
}

fn digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn integer_syntax(text: &str) -> bool {
    digits(text.strip_prefix('-').unwrap_or(text))
}

fn fits_i64(text: &str) -> bool {
    integer_syntax(text) && text.parse::<i64>().is_ok()
}

fn fits_u64(text: &str) -> bool {
    digits(text) && text.parse::<u64>().is_ok()
}

/// Optional `-`, digits, at most one `.`; `-`, `.`, `-.` and a trailing `.` pass as partial input.
fn float_syntax(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    body.bytes().filter(|&b| b == b'.').count() <= 1 && body.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

/// A complete float: float syntax with at least one digit and not a plain integer.
fn is_float_text(text: &str) -> bool {
    float_syntax(text) && text.bytes().any(|b| b.is_ascii_digit()) && !integer_syntax(text)
}
