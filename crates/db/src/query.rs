//! Query description types shared by `find`, `count` and aggregation `$match` stages.

use serde_json::Value;

/// Comparison operators understood by the filter evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Predicate over a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Not(Box<Filter>),
    Cmp { path: String, op: CmpOp, value: Value },
}

impl Default for Filter {
    fn default() -> Self {
        Filter::True
    }
}

impl Filter {
    pub fn cmp(path: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        Filter::Cmp {
            path: path.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(path, CmpOp::Eq, value)
    }

    /// A filter no document satisfies.
    pub fn none() -> Self {
        Filter::Not(Box::new(Filter::True))
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s and dropping `True`.
    pub fn and(self, other: Filter) -> Self {
        let mut clauses = Vec::new();
        for part in [self, other] {
            match part {
                Filter::True => {}
                Filter::And(inner) => clauses.extend(inner),
                clause => clauses.push(clause),
            }
        }
        match clauses.len() {
            0 => Filter::True,
            1 => clauses.remove(0),
            _ => Filter::And(clauses),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: Order::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: Order::Desc,
        }
    }
}

/// Which fields a read returns.
///
/// Hidden schema fields are dropped by `All` and `Exclude`, and only come back
/// when an `Include` list names them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

/// Options for `Collection::find`.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Vec<SortSpec>,
    pub projection: Projection,
    pub skip: usize,
    pub limit: Option<usize>,
}
