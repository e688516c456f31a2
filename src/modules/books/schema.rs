//! Declarative payload schemas for book writes.
//!
//! Each schema is a table of field rules checked in declaration order by the
//! pure [`validate`] function. Properties absent from the table are rejected,
//! which is how the update schema keeps `isbn` out of PUT bodies.

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

/// Earliest publication year accepted.
pub const MIN_YEAR: i64 = 1450;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Non-empty string
    Text,
    /// Whole number no smaller than `min`; when `to_current_year` is set,
    /// also no larger than the current UTC year at validation time
    Integer { min: i64, to_current_year: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn text(name: &'static str) -> FieldRule {
    FieldRule {
        name,
        kind: FieldKind::Text,
    }
}

const fn integer(name: &'static str, min: i64, to_current_year: bool) -> FieldRule {
    FieldRule {
        name,
        kind: FieldKind::Integer {
            min,
            to_current_year,
        },
    }
}

/// Named rule table; every listed field is required, nothing else is allowed.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [FieldRule],
}

pub static CREATE_SCHEMA: Schema = Schema {
    name: "book.create",
    fields: &[
        text("isbn"),
        text("amazon_url"),
        text("author"),
        text("language"),
        integer("pages", 1, false),
        text("publisher"),
        text("title"),
        integer("year", MIN_YEAR, true),
    ],
};

pub static UPDATE_SCHEMA: Schema = Schema {
    name: "book.update",
    fields: &[
        text("amazon_url"),
        text("author"),
        text("language"),
        integer("pages", 1, false),
        text("publisher"),
        text("title"),
        integer("year", MIN_YEAR, true),
    ],
};

/// Result of checking a payload against a schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Check `payload` against `schema`, one message per violated rule.
pub fn validate(payload: &Value, schema: &Schema) -> ValidationOutcome {
    validate_at(payload, schema, i64::from(OffsetDateTime::now_utc().year()))
}

/// [`validate`] with an explicit current year.
pub fn validate_at(payload: &Value, schema: &Schema, current_year: i64) -> ValidationOutcome {
    let Some(object) = payload.as_object() else {
        return ValidationOutcome::from_errors(vec![
            "instance is not of a type(s) object".to_string()
        ]);
    };

    let mut errors = Vec::new();

    for rule in schema.fields {
        match object.get(rule.name) {
            None => errors.push(format!("instance requires property \"{}\"", rule.name)),
            Some(value) => check_field(rule, value, current_year, &mut errors),
        }
    }

    for key in object.keys() {
        if !schema.fields.iter().any(|rule| rule.name == key) {
            errors.push(format!(
                "instance is not allowed to have the additional property \"{}\"",
                key
            ));
        }
    }

    ValidationOutcome::from_errors(errors)
}

fn check_field(rule: &FieldRule, value: &Value, current_year: i64, errors: &mut Vec<String>) {
    let path = format!("instance.{}", rule.name);

    match rule.kind {
        FieldKind::Text => match value.as_str() {
            None => errors.push(format!("{} is not of a type(s) string", path)),
            Some(s) if s.is_empty() => {
                errors.push(format!("{} does not meet minimum length of 1", path))
            }
            Some(_) => {}
        },
        FieldKind::Integer {
            min,
            to_current_year,
        } => {
            let Some(number) = whole_number(value) else {
                errors.push(format!("{} is not of a type(s) integer", path));
                return;
            };
            if number < min {
                errors.push(format!("{} must be greater than or equal to {}", path, min));
            }
            if to_current_year && number > current_year {
                errors.push(format!(
                    "{} must be less than or equal to {}",
                    path, current_year
                ));
            }
        }
    }
}

/// A JSON number with no fractional part that fits in `i64`. `2017` and
/// `2017.0` are the same integer; `2017.5` is not one.
pub fn whole_number(value: &Value) -> Option<i64> {
    if let Some(number) = value.as_i64() {
        return Some(number);
    }
    let float = value.as_f64()?;
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    let in_range = float >= i64::MIN as f64 && float < i64::MAX as f64;
    if float.is_finite() && float.fract() == 0.0 && in_range {
        Some(float as i64)
    } else {
        None
    }
}

/// Rewrite whole-valued floats in the schema's integer fields as integers so
/// a validated payload decodes into `i64` fields.
pub fn normalize(mut payload: Value, schema: &Schema) -> Value {
    if let Some(object) = payload.as_object_mut() {
        for rule in schema.fields {
            if !matches!(rule.kind, FieldKind::Integer { .. }) {
                continue;
            }
            if let Some(value) = object.get_mut(rule.name) {
                if let Some(number) = whole_number(value) {
                    *value = Value::from(number);
                }
            }
        }
    }
    payload
}
