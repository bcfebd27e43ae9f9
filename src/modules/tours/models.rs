//! Tour document shape, write-time constraints and output shaping.

use natours_db::{
    schema::{cast_value, format_date, number},
    CmpOp, CollectionSchema, Document, FieldKind, Filter, StoreError,
};
use serde_json::Value;
use time::OffsetDateTime;

use crate::utils::slugify;

pub const COLLECTION: &str = "tours";

/// A violated constraint: the field and the message reported for it.
pub type Violation = (&'static str, String);

/// Stored collection layout, including server-owned fields.
pub fn tour_schema() -> CollectionSchema {
    TOUR_FIELDS
        .iter()
        .fold(CollectionSchema::new(COLLECTION), |schema, spec| {
            if spec.hidden {
                schema.hidden_field(spec.name, spec.kind)
            } else {
                schema.field(spec.name, spec.kind)
            }
        })
        .field("slug", FieldKind::String)
        .unique("name")
}

/// Tours readable through the public API.
pub fn visible() -> Filter {
    Filter::cmp("secretTour", CmpOp::Ne, true)
}

enum Rule {
    MaxLength(usize, &'static str),
    MinLength(usize, &'static str),
    Alpha(&'static str),
    OneOf(&'static [&'static str], &'static str),
    Min(f64, &'static str),
    Max(f64, &'static str),
}

impl Rule {
    fn check(&self, value: &Value) -> Option<&'static str> {
        let ok = match self {
            Rule::MaxLength(max, _) => value.as_str().map_or(true, |s| s.chars().count() <= *max),
            Rule::MinLength(min, _) => value.as_str().map_or(true, |s| s.chars().count() >= *min),
            Rule::Alpha(_) => value
                .as_str()
                .map_or(true, |s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic())),
            Rule::OneOf(allowed, _) => value.as_str().is_some_and(|s| allowed.contains(&s)),
            Rule::Min(min, _) => value.as_f64().map_or(true, |n| n >= *min),
            Rule::Max(max, _) => value.as_f64().map_or(true, |n| n <= *max),
        };
        if ok {
            return None;
        }
        Some(match self {
            Rule::MaxLength(_, msg)
            | Rule::MinLength(_, msg)
            | Rule::Alpha(msg)
            | Rule::OneOf(_, msg)
            | Rule::Min(_, msg)
            | Rule::Max(_, msg) => msg,
        })
    }
}

struct FieldSpec {
    name: &'static str,
    kind: FieldKind,
    required: Option<&'static str>,
    trim: bool,
    hidden: bool,
    rules: &'static [Rule],
}

impl FieldSpec {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: None,
            trim: false,
            hidden: false,
            rules: &[],
        }
    }

    const fn required(mut self, message: &'static str) -> Self {
        self.required = Some(message);
        self
    }

    const fn trimmed(mut self) -> Self {
        self.trim = true;
        self
    }

    const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    const fn rules(mut self, rules: &'static [Rule]) -> Self {
        self.rules = rules;
        self
    }

    /// Outcome of checking one submitted value.
    fn admit(&self, raw: Option<&Value>) -> Admit {
        let value = match raw {
            Some(Value::String(s)) if self.trim => Value::String(s.trim().to_string()),
            Some(v) => v.clone(),
            None => Value::Null,
        };

        let blank = value.is_null() || value.as_str().is_some_and(str::is_empty);
        if blank {
            return match self.required {
                Some(message) => Admit::Violation(message.to_string()),
                None if value.is_null() || self.kind != FieldKind::String => Admit::Null,
                None => Admit::Value(value),
            };
        }

        let value = match cast_value(self.kind, self.name, &value) {
            Ok(Value::Array(items)) => Value::Array(items),
            Ok(v) if self.kind.is_array() => Value::Array(vec![v]),
            Ok(v) => v,
            Err(StoreError::Cast { path, value, kind }) => {
                return Admit::Violation(format!(
                    "Cast to {kind} failed for value \"{value}\" at path \"{path}\""
                ));
            }
            Err(other) => return Admit::Violation(other.to_string()),
        };

        match self.rules.iter().find_map(|rule| rule.check(&value)) {
            Some(message) => Admit::Violation(message.to_string()),
            None => Admit::Value(value),
        }
    }
}

enum Admit {
    Value(Value),
    Null,
    Violation(String),
}

const DIFFICULTIES: &[&str] = &["easy", "medium", "difficult"];

const NAME_RULES: &[Rule] = &[
    Rule::MaxLength(40, "A tour name must have less or equal than 40 characters"),
    Rule::MinLength(10, "A tour name must have more or equal than 10 characters"),
    Rule::Alpha("Tour must only contain characters"),
];

const DIFFICULTY_RULES: &[Rule] = &[Rule::OneOf(
    DIFFICULTIES,
    "Difficulty is either: easy, medium or difficult",
)];

const RATING_RULES: &[Rule] = &[
    Rule::Min(1.0, "Rating must be above 1.0"),
    Rule::Max(5.0, "Rating must be below 5.0"),
];

static TOUR_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", FieldKind::String)
        .required("A tour must have a name")
        .trimmed()
        .rules(NAME_RULES),
    FieldSpec::new("duration", FieldKind::Number).required("A tour must have a duration"),
    FieldSpec::new("maxGroupSize", FieldKind::Number).required("A tour must have a group size"),
    FieldSpec::new("difficulty", FieldKind::String)
        .required("A tour must have a difficulty")
        .rules(DIFFICULTY_RULES),
    FieldSpec::new("ratingsAverage", FieldKind::Number).rules(RATING_RULES),
    FieldSpec::new("ratingsQuantity", FieldKind::Number),
    FieldSpec::new("price", FieldKind::Number).required("A tour must have a price"),
    FieldSpec::new("priceDiscount", FieldKind::Number),
    FieldSpec::new("summary", FieldKind::String)
        .required("A tour must have a summary")
        .trimmed(),
    FieldSpec::new("description", FieldKind::String).trimmed(),
    FieldSpec::new("imageCover", FieldKind::String).required("A tour must have a cover image"),
    FieldSpec::new("images", FieldKind::StringArray),
    FieldSpec::new("createdAt", FieldKind::Date).hidden(),
    FieldSpec::new("startDates", FieldKind::DateArray),
    FieldSpec::new("secretTour", FieldKind::Boolean),
];

/// Validate a new tour and fill in defaults.
///
/// Keys outside the constraint table are dropped.
pub fn validate_new(body: &Document) -> Result<Document, Vec<Violation>> {
    let mut tour = Document::new();
    let mut violations = Vec::new();

    for spec in TOUR_FIELDS {
        match spec.admit(body.get(spec.name)) {
            Admit::Value(value) => {
                tour.insert(spec.name.to_string(), value);
            }
            Admit::Null => {}
            Admit::Violation(message) => violations.push((spec.name, message)),
        }
    }

    if let (Some(discount), Some(price)) = (
        tour.get("priceDiscount").and_then(Value::as_f64),
        tour.get("price").and_then(Value::as_f64),
    ) {
        if discount >= price {
            violations.push((
                "priceDiscount",
                format!(
                    "Discount price ({}) should be below regular price",
                    tour["priceDiscount"]
                ),
            ));
        }
    }

    if !violations.is_empty() {
        return Err(violations);
    }

    apply_defaults(&mut tour);
    Ok(tour)
}

/// Validate the keys present in a partial update.
///
/// The discount rule is not re-checked here since the stored price is not
/// consulted.
pub fn validate_changes(patch: &Document) -> Result<Document, Vec<Violation>> {
    let mut changes = Document::new();
    let mut violations = Vec::new();

    for spec in TOUR_FIELDS.iter().filter(|spec| patch.contains_key(spec.name)) {
        match spec.admit(patch.get(spec.name)) {
            Admit::Value(value) => {
                changes.insert(spec.name.to_string(), value);
            }
            Admit::Null => {
                changes.insert(spec.name.to_string(), Value::Null);
            }
            Admit::Violation(message) => violations.push((spec.name, message)),
        }
    }

    if violations.is_empty() {
        Ok(changes)
    } else {
        Err(violations)
    }
}

fn apply_defaults(tour: &mut Document) {
    let defaults = [
        ("ratingsAverage", Value::from(0)),
        ("ratingsQuantity", Value::from(4.5)),
        ("images", Value::Array(Vec::new())),
        ("startDates", Value::Array(Vec::new())),
        ("secretTour", Value::Bool(false)),
        (
            "createdAt",
            Value::String(format_date(OffsetDateTime::now_utc())),
        ),
    ];
    for (field, value) in defaults {
        tour.entry(field).or_insert(value);
    }
}

/// Derive the URL slug from the tour name.
pub fn assign_slug(tour: &mut Document) {
    if let Some(name) = tour.get("name").and_then(Value::as_str) {
        let slug = slugify(name);
        tour.insert("slug".to_string(), Value::String(slug));
    }
}

/// Add the computed `durationWeeks` when `duration` is part of the document.
pub fn present(mut tour: Document) -> Document {
    if let Some(weeks) = tour
        .get("duration")
        .and_then(Value::as_f64)
        .and_then(|days| number(days / 7.0))
    {
        tour.insert("durationWeeks".to_string(), weeks);
    }
    tour
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn forest_hiker() -> Value {
        json!({
            "name": "TheForestHiker",
            "duration": 5,
            "maxGroupSize": 25,
            "difficulty": "easy",
            "ratingsAverage": 4.7,
            "ratingsQuantity": 37,
            "price": 397,
            "summary": "Breathtaking hike through the Canadian Banff National Park",
            "imageCover": "tour-1-cover.jpg",
            "startDates": ["2021-04-25,10:00", "2021-07-20,10:00"]
        })
    }

    fn messages(violations: &[Violation]) -> Vec<&str> {
        violations.iter().map(|(_, m)| m.as_str()).collect()
    }

    #[test]
    fn valid_tour_gets_defaults_and_canonical_dates() {
        let tour = validate_new(&doc(forest_hiker())).unwrap();
        assert_eq!(tour["secretTour"], json!(false));
        assert_eq!(tour["images"], json!([]));
        assert_eq!(tour["ratingsAverage"], json!(4.7));
        assert_eq!(
            tour["startDates"],
            json!(["2021-04-25T10:00:00.000Z", "2021-07-20T10:00:00.000Z"])
        );
        assert!(tour["createdAt"].is_string());
    }

    #[test]
    fn rating_defaults_apply_when_omitted() {
        let mut body = doc(forest_hiker());
        body.remove("ratingsAverage");
        body.remove("ratingsQuantity");
        let tour = validate_new(&body).unwrap();
        assert_eq!(tour["ratingsAverage"], json!(0));
        assert_eq!(tour["ratingsQuantity"], json!(4.5));
    }

    #[test]
    fn missing_required_fields_are_all_reported() {
        let violations = validate_new(&Document::new()).unwrap_err();
        assert_eq!(
            messages(&violations),
            vec![
                "A tour must have a name",
                "A tour must have a duration",
                "A tour must have a group size",
                "A tour must have a difficulty",
                "A tour must have a price",
                "A tour must have a summary",
                "A tour must have a cover image",
            ]
        );
    }

    #[test]
    fn name_constraints() {
        let mut body = doc(forest_hiker());
        body.insert("name".into(), json!("Short"));
        assert_eq!(
            messages(&validate_new(&body).unwrap_err()),
            vec!["A tour name must have more or equal than 10 characters"]
        );

        body.insert("name".into(), json!("The Forest Hiker"));
        assert_eq!(
            messages(&validate_new(&body).unwrap_err()),
            vec!["Tour must only contain characters"]
        );

        body.insert("name".into(), json!("A".repeat(41)));
        assert_eq!(
            messages(&validate_new(&body).unwrap_err()),
            vec!["A tour name must have less or equal than 40 characters"]
        );

        body.insert("name".into(), json!("   TheSeaExplorer  "));
        assert_eq!(validate_new(&body).unwrap()["name"], json!("TheSeaExplorer"));
    }

    #[test]
    fn difficulty_and_rating_bounds() {
        let mut body = doc(forest_hiker());
        body.insert("difficulty".into(), json!("extreme"));
        body.insert("ratingsAverage".into(), json!(6));
        assert_eq!(
            messages(&validate_new(&body).unwrap_err()),
            vec![
                "Difficulty is either: easy, medium or difficult",
                "Rating must be below 5.0",
            ]
        );
    }

    #[test]
    fn discount_must_be_below_price_on_create() {
        let mut body = doc(forest_hiker());
        body.insert("priceDiscount".into(), json!(397));
        let violations = validate_new(&body).unwrap_err();
        assert_eq!(violations[0].0, "priceDiscount");
        assert_eq!(
            violations[0].1,
            "Discount price (397) should be below regular price"
        );

        body.insert("priceDiscount".into(), json!(100));
        assert_eq!(validate_new(&body).unwrap()["priceDiscount"], json!(100));
    }

    #[test]
    fn numeric_strings_are_cast_and_garbage_is_reported() {
        let mut body = doc(forest_hiker());
        body.insert("price".into(), json!("450"));
        assert_eq!(validate_new(&body).unwrap()["price"], json!(450));

        body.insert("price".into(), json!("cheap"));
        assert_eq!(
            messages(&validate_new(&body).unwrap_err()),
            vec!["Cast to Number failed for value \"cheap\" at path \"price\""]
        );
    }

    #[test]
    fn single_values_for_list_fields_become_one_element_lists() {
        let mut body = doc(forest_hiker());
        body.insert("images".into(), json!("tour-1-1.jpg"));
        body.insert("startDates".into(), json!("2024-03-01"));
        let tour = validate_new(&body).unwrap();
        assert_eq!(tour["images"], json!(["tour-1-1.jpg"]));
        assert_eq!(tour["startDates"], json!(["2024-03-01T00:00:00.000Z"]));

        let changes =
            validate_changes(&doc(json!({"images": "a.jpg", "startDates": "2024-03-15"}))).unwrap();
        assert_eq!(changes["images"], json!(["a.jpg"]));
        assert_eq!(changes["startDates"], json!(["2024-03-15T00:00:00.000Z"]));
    }

    #[test]
    fn unknown_and_server_owned_keys_are_dropped() {
        let mut body = doc(forest_hiker());
        body.insert("slug".into(), json!("custom"));
        body.insert("rating".into(), json!(5));
        let tour = validate_new(&body).unwrap();
        assert!(!tour.contains_key("slug"));
        assert!(!tour.contains_key("rating"));
    }

    #[test]
    fn changes_only_check_present_keys() {
        let changes = validate_changes(&doc(json!({"price": "500", "priceDiscount": 900}))).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes["price"], json!(500));

        let violations = validate_changes(&doc(json!({"name": null}))).unwrap_err();
        assert_eq!(messages(&violations), vec!["A tour must have a name"]);

        let changes = validate_changes(&doc(json!({"description": null}))).unwrap();
        assert_eq!(changes["description"], Value::Null);
    }

    #[test]
    fn slug_and_duration_weeks() {
        let mut tour = validate_new(&doc(forest_hiker())).unwrap();
        assign_slug(&mut tour);
        assert_eq!(tour["slug"], json!("theforesthiker"));

        let shaped = present(doc(json!({"duration": 14})));
        assert_eq!(shaped["durationWeeks"], json!(2));
        let shaped = present(doc(json!({"name": "x"})));
        assert!(!shaped.contains_key("durationWeeks"));
    }

    #[test]
    fn schema_declares_hidden_created_at_and_unique_name() {
        let schema = tour_schema();
        assert_eq!(schema.hidden_fields(), vec!["createdAt"]);
        assert_eq!(schema.unique_fields(), ["name".to_string()]);
        assert_eq!(schema.kind_of("startDates"), Some(FieldKind::DateArray));
        assert_eq!(schema.kind_of("slug"), Some(FieldKind::String));
    }
}
