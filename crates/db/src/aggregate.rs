//! Declarative aggregation pipelines evaluated over a snapshot of a collection.

use serde_json::Value;
use std::cmp::Ordering;

use crate::eval::{compare_docs, compare_values, eval_filter, get_path, values_equal};
use crate::query::{Filter, SortSpec};
use crate::schema::{month_of, number, ID_FIELD};
use crate::Document;

/// Value computed from a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Field(String),
    Literal(Value),
    ToUpper(Box<Expr>),
    Month(Box<Expr>),
}

impl Expr {
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn to_upper(self) -> Self {
        Expr::ToUpper(Box::new(self))
    }

    pub fn month(self) -> Self {
        Expr::Month(Box::new(self))
    }

    fn eval(&self, doc: &Document) -> Value {
        match self {
            Expr::Field(name) => get_path(doc, name).cloned().unwrap_or(Value::Null),
            Expr::Literal(v) => v.clone(),
            Expr::ToUpper(inner) => match inner.eval(doc) {
                Value::String(s) => Value::String(s.to_uppercase()),
                Value::Null => Value::String(String::new()),
                other => Value::String(other.to_string().to_uppercase()),
            },
            Expr::Month(inner) => month_of(&inner.eval(doc))
                .map(Value::from)
                .unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    Push(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    /// One output document per element of the named array field.
    Unwind(String),
    Group {
        id: Expr,
        fields: Vec<(String, Accumulator)>,
    },
    AddFields(Vec<(String, Expr)>),
    Unset(Vec<String>),
    Sort(Vec<SortSpec>),
    Limit(usize),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Insert `stage` ahead of every existing stage.
    pub fn prepend(mut self, stage: Stage) -> Self {
        self.stages.insert(0, stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub(crate) fn stages_mut(&mut self) -> &mut [Stage] {
        &mut self.stages
    }
}

pub(crate) fn run(mut docs: Vec<Document>, pipeline: &Pipeline) -> Vec<Document> {
    for stage in pipeline.stages() {
        docs = match stage {
            Stage::Match(filter) => docs.into_iter().filter(|d| eval_filter(d, filter)).collect(),
            Stage::Unwind(field) => unwind(docs, field),
            Stage::Group { id, fields } => group(docs, id, fields),
            Stage::AddFields(fields) => docs
                .into_iter()
                .map(|mut d| {
                    for (name, expr) in fields {
                        let v = expr.eval(&d);
                        d.insert(name.clone(), v);
                    }
                    d
                })
                .collect(),
            Stage::Unset(fields) => docs
                .into_iter()
                .map(|mut d| {
                    for f in fields {
                        d.remove(f);
                    }
                    d
                })
                .collect(),
            Stage::Sort(sort) => {
                docs.sort_by(|a, b| compare_docs(a, b, sort));
                docs
            }
            Stage::Limit(n) => {
                docs.truncate(*n);
                docs
            }
        };
    }
    docs
}

fn unwind(docs: Vec<Document>, field: &str) -> Vec<Document> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match doc.get(field) {
            Some(Value::Array(items)) => {
                for item in items.clone() {
                    let mut copy = doc.clone();
                    copy.insert(field.to_string(), item);
                    out.push(copy);
                }
            }
            Some(Value::Null) | None => {}
            Some(_) => out.push(doc),
        }
    }
    out
}

enum AccState {
    Sum { total: f64, integral: bool },
    Avg { total: f64, count: usize },
    Min(Option<Value>),
    Max(Option<Value>),
    Push(Vec<Value>),
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Sum(_) => AccState::Sum {
                total: 0.0,
                integral: true,
            },
            Accumulator::Avg(_) => AccState::Avg { total: 0.0, count: 0 },
            Accumulator::Min(_) => AccState::Min(None),
            Accumulator::Max(_) => AccState::Max(None),
            Accumulator::Push(_) => AccState::Push(Vec::new()),
        }
    }

    fn feed(&mut self, acc: &Accumulator, doc: &Document) {
        match (self, acc) {
            (AccState::Sum { total, integral }, Accumulator::Sum(e)) => {
                let v = e.eval(doc);
                if let Some(n) = v.as_f64() {
                    *total += n;
                    *integral &= v.is_i64() || v.is_u64();
                }
            }
            (AccState::Avg { total, count }, Accumulator::Avg(e)) => {
                if let Some(n) = e.eval(doc).as_f64() {
                    *total += n;
                    *count += 1;
                }
            }
            (AccState::Min(cur), Accumulator::Min(e)) => {
                keep_extreme(cur, e.eval(doc), Ordering::Less);
            }
            (AccState::Max(cur), Accumulator::Max(e)) => {
                keep_extreme(cur, e.eval(doc), Ordering::Greater);
            }
            (AccState::Push(items), Accumulator::Push(e)) => items.push(e.eval(doc)),
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Sum { total, integral } => {
                if integral {
                    number(total).unwrap_or(Value::Null)
                } else {
                    serde_json::Number::from_f64(total)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            AccState::Avg { count: 0, .. } => Value::Null,
            AccState::Avg { total, count } => serde_json::Number::from_f64(total / count as f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AccState::Min(v) | AccState::Max(v) => v.unwrap_or(Value::Null),
            AccState::Push(items) => Value::Array(items),
        }
    }
}

fn keep_extreme(cur: &mut Option<Value>, candidate: Value, wanted: Ordering) {
    if candidate.is_null() {
        return;
    }
    let replace = match cur {
        Some(existing) => compare_values(&candidate, existing) == wanted,
        None => true,
    };
    if replace {
        *cur = Some(candidate);
    }
}

/// Groups keep the order in which their keys were first seen.
fn group(docs: Vec<Document>, id: &Expr, fields: &[(String, Accumulator)]) -> Vec<Document> {
    let mut groups: Vec<(Value, Vec<AccState>)> = Vec::new();
    for doc in &docs {
        let key = id.eval(doc);
        let idx = match groups.iter().position(|(k, _)| values_equal(k, &key)) {
            Some(idx) => idx,
            None => {
                let states = fields.iter().map(|(_, acc)| AccState::new(acc)).collect();
                groups.push((key, states));
                groups.len() - 1
            }
        };
        for (state, (_, acc)) in groups[idx].1.iter_mut().zip(fields) {
            state.feed(acc, doc);
        }
    }

    groups
        .into_iter()
        .map(|(key, states)| {
            let mut out = Document::new();
            out.insert(ID_FIELD.to_string(), key);
            for (state, (name, _)) in states.into_iter().zip(fields) {
                out.insert(name.clone(), state.finish());
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::CmpOp;
    use serde_json::json;

    fn docs(values: Vec<Value>) -> Vec<Document> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn unwind_fans_out_and_drops_empty_arrays() {
        let input = docs(vec![
            json!({"name": "a", "tags": [1, 2, 3]}),
            json!({"name": "b", "tags": []}),
            json!({"name": "c"}),
        ]);
        let out = run(input, &Pipeline::new().stage(Stage::Unwind("tags".into())));
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|d| d["name"] == json!("a")));
    }

    #[test]
    fn group_computes_accumulators() {
        let input = docs(vec![
            json!({"difficulty": "medium", "price": 300, "rating": 4.5}),
            json!({"difficulty": "medium", "price": 500, "rating": 4.9}),
            json!({"difficulty": "easy", "price": 100, "rating": 4.7}),
        ]);
        let pipeline = Pipeline::new()
            .stage(Stage::Group {
                id: Expr::field("difficulty").to_upper(),
                fields: vec![
                    ("num".into(), Accumulator::Sum(Expr::literal(1))),
                    ("avgPrice".into(), Accumulator::Avg(Expr::field("price"))),
                    ("minPrice".into(), Accumulator::Min(Expr::field("price"))),
                    ("maxPrice".into(), Accumulator::Max(Expr::field("price"))),
                ],
            })
            .stage(Stage::Sort(vec![SortSpec::desc("avgPrice")]));
        let out = run(input, &pipeline);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["_id"], json!("MEDIUM"));
        assert_eq!(out[0]["num"], json!(2));
        assert_eq!(out[0]["avgPrice"], json!(400.0));
        assert_eq!(out[0]["minPrice"], json!(300));
        assert_eq!(out[0]["maxPrice"], json!(500));
        assert_eq!(out[1]["_id"], json!("EASY"));
    }

    #[test]
    fn month_grouping_with_push_add_fields_and_unset() {
        let input = docs(vec![json!({
            "name": "Alpha",
            "startDates": ["2024-03-01T00:00:00.000Z", "2024-03-15T00:00:00.000Z", "2024-07-01T00:00:00.000Z"]
        })]);
        let pipeline = Pipeline::new()
            .stage(Stage::Unwind("startDates".into()))
            .stage(Stage::Group {
                id: Expr::field("startDates").month(),
                fields: vec![
                    ("count".into(), Accumulator::Sum(Expr::literal(1))),
                    ("names".into(), Accumulator::Push(Expr::field("name"))),
                ],
            })
            .stage(Stage::AddFields(vec![("month".into(), Expr::field("_id"))]))
            .stage(Stage::Unset(vec!["_id".into()]))
            .stage(Stage::Sort(vec![SortSpec::desc("count")]))
            .stage(Stage::Limit(1));
        let out = run(input, &pipeline);
        assert_eq!(out.len(), 1);
        assert_eq!(
            Value::Object(out[0].clone()),
            json!({"count": 2, "names": ["Alpha", "Alpha"], "month": 3})
        );
    }

    #[test]
    fn prepend_puts_stage_first() {
        let p = Pipeline::new()
            .stage(Stage::Limit(3))
            .prepend(Stage::Match(Filter::cmp("secretTour", CmpOp::Ne, true)));
        assert!(matches!(p.stages()[0], Stage::Match(_)));
    }
}
