use serde_json::Value;
use std::cmp::Ordering;

use crate::error::StoreError;
use crate::query::{CmpOp, Filter, Order, Projection, SortSpec};
use crate::schema::ID_FIELD;
use crate::Document;

pub fn eval_filter(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::Cmp { path, op, value } => cmp_matches(get_path(doc, path), *op, value),
    }
}

fn cmp_matches(actual: Option<&Value>, op: CmpOp, expected: &Value) -> bool {
    match actual {
        // Scalars compare against each element; the array matches if any element does.
        Some(Value::Array(items)) if !expected.is_array() => match op {
            CmpOp::Ne => !items.iter().any(|item| values_equal(item, expected)),
            _ => items.iter().any(|item| scalar_matches(item, op, expected)),
        },
        Some(v) => scalar_matches(v, op, expected),
        None => match op {
            CmpOp::Eq => expected.is_null(),
            CmpOp::Ne => !expected.is_null(),
            _ => false,
        },
    }
}

fn scalar_matches(actual: &Value, op: CmpOp, expected: &Value) -> bool {
    match op {
        CmpOp::Eq => values_equal(actual, expected),
        CmpOp::Ne => !values_equal(actual, expected),
        _ if type_rank(actual) != type_rank(expected) => false,
        CmpOp::Gt => compare_values(actual, expected) == Ordering::Greater,
        CmpOp::Gte => compare_values(actual, expected) != Ordering::Less,
        CmpOp::Lt => compare_values(actual, expected) == Ordering::Less,
        CmpOp::Lte => compare_values(actual, expected) != Ordering::Greater,
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.total_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut cur = doc.get(parts.next()?)?;
    for part in parts {
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur)
}

/// Missing fields sort before present ones, as nulls do.
pub fn compare_docs(a: &Document, b: &Document, sort: &[SortSpec]) -> Ordering {
    for s in sort {
        let ord = match (get_path(a, &s.field), get_path(b, &s.field)) {
            (Some(x), Some(y)) => compare_values(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return match s.order {
                Order::Asc => ord,
                Order::Desc => ord.reverse(),
            };
        }
    }
    Ordering::Equal
}

pub fn check_projection(projection: &Projection) -> Result<(), StoreError> {
    if let Projection::Include(fields) = projection {
        if fields.iter().any(|f| f.starts_with('-')) {
            return Err(StoreError::InvalidProjection(
                "projection cannot have a mix of inclusion and exclusion".into(),
            ));
        }
    }
    Ok(())
}

pub fn project(doc: &Document, projection: &Projection, hidden: &[&str]) -> Document {
    match projection {
        Projection::Include(fields) => {
            let mut out = Document::new();
            if let Some(id) = doc.get(ID_FIELD) {
                out.insert(ID_FIELD.to_string(), id.clone());
            }
            for f in fields {
                if let Some(v) = doc.get(f) {
                    out.insert(f.clone(), v.clone());
                }
            }
            out
        }
        Projection::Exclude(fields) => doc
            .iter()
            .filter(|(k, _)| !hidden.contains(&k.as_str()) && !fields.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        Projection::All => doc
            .iter()
            .filter(|(k, _)| !hidden.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn comparison_requires_matching_types() {
        let d = doc(json!({"price": 500}));
        assert!(eval_filter(&d, &Filter::cmp("price", CmpOp::Gte, 500)));
        assert!(!eval_filter(&d, &Filter::cmp("price", CmpOp::Gt, 500)));
        assert!(!eval_filter(&d, &Filter::cmp("price", CmpOp::Gt, "100")));
    }

    #[test]
    fn ne_matches_missing_fields() {
        let d = doc(json!({"name": "x"}));
        assert!(eval_filter(&d, &Filter::cmp("secretTour", CmpOp::Ne, true)));
        let secret = doc(json!({"secretTour": true}));
        assert!(!eval_filter(&secret, &Filter::cmp("secretTour", CmpOp::Ne, true)));
    }

    #[test]
    fn array_fields_match_any_element() {
        let d = doc(json!({"startDates": ["2024-03-01T00:00:00.000Z", "2025-01-01T00:00:00.000Z"]}));
        assert!(eval_filter(
            &d,
            &Filter::cmp("startDates", CmpOp::Gte, "2025-01-01T00:00:00.000Z")
        ));
        assert!(!eval_filter(
            &d,
            &Filter::cmp("startDates", CmpOp::Gt, "2025-01-01T00:00:00.000Z")
        ));
    }

    #[test]
    fn integer_and_float_forms_are_equal() {
        assert!(values_equal(&json!(4), &json!(4.0)));
    }

    #[test]
    fn sort_by_multiple_keys() {
        let a = doc(json!({"price": 500, "name": "b"}));
        let b = doc(json!({"price": 500, "name": "a"}));
        let sort = [SortSpec::desc("price"), SortSpec::asc("name")];
        assert_eq!(compare_docs(&a, &b, &sort), Ordering::Greater);
    }

    #[test]
    fn include_projection_keeps_id() {
        let d = doc(json!({"_id": "1", "name": "n", "price": 3, "createdAt": "x"}));
        let out = project(&d, &Projection::Include(vec!["name".into()]), &["createdAt"]);
        assert_eq!(Value::Object(out), json!({"_id": "1", "name": "n"}));
    }

    #[test]
    fn exclude_projection_drops_hidden_fields() {
        let d = doc(json!({"_id": "1", "__v": 0, "createdAt": "x", "name": "n"}));
        let out = project(&d, &Projection::Exclude(vec!["__v".into()]), &["createdAt"]);
        assert_eq!(Value::Object(out), json!({"_id": "1", "name": "n"}));
    }

    #[test]
    fn include_can_name_hidden_fields() {
        let d = doc(json!({"_id": "1", "createdAt": "x"}));
        let out = project(&d, &Projection::Include(vec!["createdAt".into()]), &["createdAt"]);
        assert_eq!(Value::Object(out), json!({"_id": "1", "createdAt": "x"}));
    }

    #[test]
    fn mixed_projection_is_rejected() {
        let p = Projection::Include(vec!["name".into(), "-price".into()]);
        assert!(check_projection(&p).is_err());
    }
}
