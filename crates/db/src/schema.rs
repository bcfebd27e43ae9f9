//! Field declarations for a collection and the casting rules derived from them.

use serde_json::{Number, Value};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, Month,
    OffsetDateTime, PrimitiveDateTime, UtcOffset,
};
use uuid::Uuid;

use crate::error::StoreError;
use crate::query::Filter;

pub const ID_FIELD: &str = "_id";
pub const VERSION_FIELD: &str = "__v";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Id,
    String,
    Number,
    Boolean,
    Date,
    StringArray,
    DateArray,
}

impl FieldKind {
    /// Kind of a single element; scalars are their own element kind.
    pub fn element(self) -> FieldKind {
        match self {
            FieldKind::StringArray => FieldKind::String,
            FieldKind::DateArray => FieldKind::Date,
            other => other,
        }
    }

    pub fn is_array(self) -> bool {
        matches!(self, FieldKind::StringArray | FieldKind::DateArray)
    }

    pub fn label(self) -> &'static str {
        match self {
            FieldKind::Id => "ObjectId",
            FieldKind::String => "String",
            FieldKind::Number => "Number",
            FieldKind::Boolean => "Boolean",
            FieldKind::Date => "Date",
            FieldKind::StringArray => "[String]",
            FieldKind::DateArray => "[Date]",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub hidden: bool,
}

/// Declared shape of a collection.
#[derive(Debug, Clone)]
pub struct CollectionSchema {
    name: String,
    fields: Vec<FieldDef>,
    unique: Vec<String>,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            unique: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
            hidden: false,
        });
        self
    }

    /// Declare a field that reads leave out unless explicitly projected.
    pub fn hidden_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
            hidden: true,
        });
        self
    }

    pub fn unique(mut self, name: impl Into<String>) -> Self {
        self.unique.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_fields(&self) -> &[String] {
        &self.unique
    }

    pub fn hidden_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.hidden)
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn kind_of(&self, path: &str) -> Option<FieldKind> {
        match path {
            ID_FIELD => Some(FieldKind::Id),
            VERSION_FIELD => Some(FieldKind::Number),
            _ => self
                .fields
                .iter()
                .find(|f| f.name == path)
                .map(|f| f.kind),
        }
    }

    /// Cast every comparison value in `filter` to the kind of its path.
    pub fn cast_filter(&self, filter: &Filter) -> Result<Filter, StoreError> {
        Ok(match filter {
            Filter::True => Filter::True,
            Filter::And(clauses) => Filter::And(
                clauses
                    .iter()
                    .map(|c| self.cast_filter(c))
                    .collect::<Result<_, _>>()?,
            ),
            Filter::Not(inner) => Filter::Not(Box::new(self.cast_filter(inner)?)),
            Filter::Cmp { path, op, value } => {
                let kind = self
                    .kind_of(path)
                    .ok_or_else(|| StoreError::UnknownField(path.clone()))?;
                Filter::Cmp {
                    path: path.clone(),
                    op: *op,
                    value: cast_value(kind, path, value)?,
                }
            }
        })
    }
}

/// Convert `value` to the canonical JSON form of `kind`.
///
/// Scalars given for array kinds are cast as a single element so that they can
/// be compared against array members.
pub fn cast_value(kind: FieldKind, path: &str, value: &Value) -> Result<Value, StoreError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if let Value::Array(items) = value {
        if kind.is_array() {
            return items
                .iter()
                .map(|item| cast_scalar(kind.element(), path, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array);
        }
        return Err(cast_error(kind, path, value));
    }
    cast_scalar(kind.element(), path, value)
}

fn cast_scalar(kind: FieldKind, path: &str, value: &Value) -> Result<Value, StoreError> {
    let cast = match (kind, value) {
        (FieldKind::String, Value::String(_)) => Some(value.clone()),
        (FieldKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (FieldKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
        (FieldKind::Number, Value::Number(_)) => Some(value.clone()),
        (FieldKind::Number, Value::String(s)) => s.trim().parse::<f64>().ok().and_then(number),
        (FieldKind::Boolean, Value::Bool(_)) => Some(value.clone()),
        (FieldKind::Boolean, Value::String(s)) => match s.as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        (FieldKind::Date, Value::String(s)) => parse_date(s).map(|d| Value::String(format_date(d))),
        (FieldKind::Date, Value::Number(n)) => n
            .as_i64()
            .and_then(date_from_millis)
            .map(|d| Value::String(format_date(d))),
        (FieldKind::Id, Value::String(s)) => Uuid::parse_str(s)
            .ok()
            .map(|id| Value::String(id.hyphenated().to_string())),
        _ => None,
    };
    cast.ok_or_else(|| cast_error(kind, path, value))
}

fn cast_error(kind: FieldKind, path: &str, value: &Value) -> StoreError {
    let value = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    StoreError::Cast {
        path: path.to_string(),
        value,
        kind: kind.label(),
    }
}

/// JSON number for `f`, using an integer representation when `f` is integral.
pub fn number(f: f64) -> Option<Value> {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return Some(Value::Number(Number::from(f as i64)));
    }
    Number::from_f64(f).map(Value::Number)
}

/// Parse the date notations accepted on input.
pub fn parse_date(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(dt);
    }
    if let Ok(d) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Some(d.midnight().assume_utc());
    }
    let local_formats = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
        format_description!("[year]-[month]-[day],[hour]:[minute]"),
    ];
    local_formats
        .iter()
        .find_map(|fmt| PrimitiveDateTime::parse(raw, *fmt).ok())
        .map(PrimitiveDateTime::assume_utc)
}

fn date_from_millis(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}

/// Canonical stored form: UTC with millisecond precision, so that stored dates
/// order correctly as plain strings.
pub fn format_date(dt: OffsetDateTime) -> String {
    let utc = dt.to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        utc.year(),
        u8::from(utc.month()),
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second(),
        utc.millisecond()
    )
}

/// Calendar month (1-12) of a stored date value.
pub fn month_of(value: &Value) -> Option<u8> {
    let raw = value.as_str()?;
    parse_date(raw).map(|dt| u8::from(dt.to_offset(UtcOffset::UTC).month()))
}

/// Midnight UTC on the given calendar day, canonically formatted.
pub fn day_start(year: i32, month: Month, day: u8) -> Option<String> {
    Date::from_calendar_date(year, month, day)
        .ok()
        .map(|d| format_date(d.midnight().assume_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::CmpOp;
    use serde_json::json;

    fn schema() -> CollectionSchema {
        CollectionSchema::new("tours")
            .field("name", FieldKind::String)
            .field("price", FieldKind::Number)
            .field("secretTour", FieldKind::Boolean)
            .field("startDates", FieldKind::DateArray)
            .hidden_field("createdAt", FieldKind::Date)
            .unique("name")
    }

    #[test]
    fn numeric_strings_cast_to_numbers() {
        assert_eq!(
            cast_value(FieldKind::Number, "price", &json!("500")).unwrap(),
            json!(500)
        );
        assert_eq!(
            cast_value(FieldKind::Number, "price", &json!("4.5")).unwrap(),
            json!(4.5)
        );
    }

    #[test]
    fn non_numeric_string_is_a_cast_error() {
        let err = cast_value(FieldKind::Number, "price", &json!("cheap")).unwrap_err();
        assert!(matches!(err, StoreError::Cast { ref path, .. } if path == "price"));
    }

    #[test]
    fn dates_are_canonicalised() {
        let expected = json!("2021-03-21T10:00:00.000Z");
        for raw in [
            "2021-03-21T10:00:00Z",
            "2021-03-21T12:00:00+02:00",
            "2021-03-21,10:00",
            "2021-03-21T10:00",
        ] {
            assert_eq!(
                cast_value(FieldKind::Date, "startDates", &json!(raw)).unwrap(),
                expected,
                "input {raw}"
            );
        }
        assert_eq!(
            cast_value(FieldKind::Date, "d", &json!("2024-01-01")).unwrap(),
            json!("2024-01-01T00:00:00.000Z")
        );
    }

    #[test]
    fn array_kinds_accept_scalars_and_arrays() {
        assert_eq!(
            cast_value(FieldKind::DateArray, "startDates", &json!("2024-03-01")).unwrap(),
            json!("2024-03-01T00:00:00.000Z")
        );
        assert_eq!(
            cast_value(FieldKind::DateArray, "startDates", &json!(["2024-03-01"])).unwrap(),
            json!(["2024-03-01T00:00:00.000Z"])
        );
    }

    #[test]
    fn malformed_id_is_a_cast_error() {
        assert!(cast_value(FieldKind::Id, "_id", &json!("not-an-id")).is_err());
    }

    #[test]
    fn cast_filter_rejects_undeclared_paths() {
        let err = schema()
            .cast_filter(&Filter::eq("colour", "red"))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownField(ref p) if p == "colour"));
    }

    #[test]
    fn cast_filter_converts_values() {
        let cast = schema()
            .cast_filter(&Filter::cmp("price", CmpOp::Gte, "500"))
            .unwrap();
        assert_eq!(cast, Filter::cmp("price", CmpOp::Gte, 500));
    }

    #[test]
    fn month_of_reads_utc_month() {
        assert_eq!(month_of(&json!("2024-03-15T00:00:00.000Z")), Some(3));
        assert_eq!(month_of(&json!(42)), None);
    }

    #[test]
    fn hidden_fields_are_listed() {
        assert_eq!(schema().hidden_fields(), vec!["createdAt"]);
    }
}
