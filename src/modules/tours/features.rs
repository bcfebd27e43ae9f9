//! Query-string driven listing: filter, sort, field selection and pagination.
//!
//! Each stage takes a [`TourQuery`] by value and returns the refined one;
//! [`translate`] threads them in the only supported order.

use std::collections::BTreeMap;

use natours_db::{schema::VERSION_FIELD, CmpOp, FindOptions, Filter, Projection, SortSpec};

use super::models::visible;
use crate::utils::parse_leading_int;

/// Keys that steer the query rather than filter it.
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 100;

/// Query-string parameters; a repeated key keeps its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: BTreeMap<String, String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Set `key`, replacing any value taken from the request.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    fn filters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params
            .iter()
            .filter(|(key, _)| {
                let base = key.split('[').next().unwrap_or_default();
                !RESERVED_KEYS.contains(&base)
            })
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl FromIterator<(String, String)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// Presets behind `GET /tours/top-5-tours`.
pub fn alias_top_tours(params: QueryParams) -> QueryParams {
    params
        .with("limit", "5")
        .with("sort", "-ratingsAverage,price")
        .with("fields", "name,price,ratingsAverage,summary,difficulty")
}

/// Page window over the sorted result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    /// Whether the caller asked for a page, which makes an empty page an error.
    pub explicit: bool,
}

impl Pagination {
    pub fn skip(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            explicit: false,
        }
    }
}

/// Fully specified listing query.
#[derive(Debug, Clone, PartialEq)]
pub struct TourQuery {
    pub filter: Filter,
    pub sort: Vec<SortSpec>,
    pub projection: Projection,
    pub pagination: Pagination,
}

impl Default for TourQuery {
    fn default() -> Self {
        Self {
            filter: visible(),
            sort: Vec::new(),
            projection: Projection::All,
            pagination: Pagination::default(),
        }
    }
}

impl TourQuery {
    /// Turn every non-reserved parameter into a predicate.
    ///
    /// `field[gte]=v` style keys map to comparisons; any other bracketed
    /// suffix becomes a dotted path for the store to reject or resolve.
    pub fn filter(self, params: &QueryParams) -> Self {
        let filter = params.filters().fold(self.filter, |filter, (key, value)| {
            let (path, op) = parse_filter_key(key);
            filter.and(Filter::cmp(path, op, value))
        });
        Self { filter, ..self }
    }

    /// `sort=-price,name`; newest first when absent.
    pub fn sort(self, params: &QueryParams) -> Self {
        let mut sort: Vec<SortSpec> = params
            .non_empty("sort")
            .into_iter()
            .flat_map(|raw| raw.split(','))
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(|field| match field.strip_prefix('-') {
                Some(name) => SortSpec::desc(name),
                None => SortSpec::asc(field),
            })
            .collect();
        if sort.is_empty() {
            sort.push(SortSpec::desc("createdAt"));
        }
        Self { sort, ..self }
    }

    /// `fields=name,price` or `fields=-images`; hides only `__v` when absent.
    pub fn limit_fields(self, params: &QueryParams) -> Self {
        let fields: Vec<String> = params
            .non_empty("fields")
            .into_iter()
            .flat_map(|raw| raw.split(','))
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect();

        let projection = if fields.is_empty() {
            Projection::Exclude(vec![VERSION_FIELD.to_string()])
        } else if fields.iter().all(|f| f.starts_with('-')) {
            Projection::Exclude(fields.iter().map(|f| f[1..].to_string()).collect())
        } else {
            // Mixed lists keep their `-` entries for the store to reject.
            Projection::Include(fields)
        };
        Self { projection, ..self }
    }

    /// `page` (1-based) and `limit`; unparsable or non-positive values fall
    /// back to the defaults.
    pub fn paginate(self, params: &QueryParams) -> Self {
        let positive = |key: &str, default: usize| {
            params
                .get(key)
                .and_then(parse_leading_int)
                .filter(|n| *n > 0)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(default)
        };
        let pagination = Pagination {
            page: positive("page", DEFAULT_PAGE),
            limit: positive("limit", DEFAULT_LIMIT),
            explicit: params.non_empty("page").is_some(),
        };
        Self { pagination, ..self }
    }

    /// Store options for fetching the requested page.
    pub fn find_options(&self) -> FindOptions {
        FindOptions {
            sort: self.sort.clone(),
            projection: self.projection.clone(),
            skip: self.pagination.skip(),
            limit: Some(self.pagination.limit),
        }
    }
}

/// Run filter, sort, field selection and pagination in that order.
pub fn translate(params: &QueryParams) -> TourQuery {
    TourQuery::default()
        .filter(params)
        .sort(params)
        .limit_fields(params)
        .paginate(params)
}

fn parse_filter_key(key: &str) -> (String, CmpOp) {
    let Some((field, rest)) = key.split_once('[') else {
        return (key.to_string(), CmpOp::Eq);
    };
    let segments: Vec<&str> = rest
        .split('[')
        .map(|segment| segment.trim_end_matches(']'))
        .collect();

    let op = match segments.as_slice() {
        ["gte"] => Some(CmpOp::Gte),
        ["gt"] => Some(CmpOp::Gt),
        ["lte"] => Some(CmpOp::Lte),
        ["lt"] => Some(CmpOp::Lt),
        _ => None,
    };
    match op {
        Some(op) => (field.to_string(), op),
        None => {
            let path = std::iter::once(field)
                .chain(segments)
                .collect::<Vec<_>>()
                .join(".");
            (path, CmpOp::Eq)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn clauses(filter: &Filter) -> Vec<Filter> {
        match filter {
            Filter::And(clauses) => clauses.clone(),
            other => vec![other.clone()],
        }
    }

    #[test]
    fn filter_strips_reserved_keys_and_keeps_secret_exclusion() {
        let query = TourQuery::default().filter(&params(&[
            ("difficulty", "easy"),
            ("page", "2"),
            ("sort", "price"),
            ("limit", "3"),
            ("fields", "name"),
            ("page[gte]", "2"),
            ("sort[x]", "1"),
            ("limit[lt]", "3"),
        ]));
        assert_eq!(
            clauses(&query.filter),
            vec![visible(), Filter::eq("difficulty", "easy")]
        );
    }

    #[test]
    fn bracket_operators_become_comparisons() {
        let query = TourQuery::default().filter(&params(&[
            ("price[gte]", "500"),
            ("duration[lt]", "10"),
        ]));
        let clauses = clauses(&query.filter);
        assert!(clauses.contains(&Filter::cmp("price", CmpOp::Gte, json!("500"))));
        assert!(clauses.contains(&Filter::cmp("duration", CmpOp::Lt, json!("10"))));
    }

    #[test]
    fn unknown_operators_pass_through_as_paths() {
        assert_eq!(
            parse_filter_key("price[ne]"),
            ("price.ne".to_string(), CmpOp::Eq)
        );
        assert_eq!(parse_filter_key("ratingsAverage[lte]").1, CmpOp::Lte);
        assert_eq!(parse_filter_key("name"), ("name".to_string(), CmpOp::Eq));
    }

    #[test]
    fn repeated_keys_keep_the_last_value() {
        let p = params(&[("difficulty", "easy"), ("difficulty", "medium")]);
        assert_eq!(p.get("difficulty"), Some("medium"));
    }

    #[test]
    fn sort_parses_directions_and_defaults_to_newest() {
        let query = TourQuery::default().sort(&params(&[("sort", "-price,name")]));
        assert_eq!(query.sort, vec![SortSpec::desc("price"), SortSpec::asc("name")]);

        let query = TourQuery::default().sort(&params(&[("sort", "")]));
        assert_eq!(query.sort, vec![SortSpec::desc("createdAt")]);
    }

    #[test]
    fn field_selection() {
        let query = TourQuery::default().limit_fields(&params(&[("fields", "name,price")]));
        assert_eq!(
            query.projection,
            Projection::Include(vec!["name".into(), "price".into()])
        );

        let query = TourQuery::default().limit_fields(&params(&[("fields", "-images,-summary")]));
        assert_eq!(
            query.projection,
            Projection::Exclude(vec!["images".into(), "summary".into()])
        );

        let query = TourQuery::default().limit_fields(&QueryParams::new());
        assert_eq!(query.projection, Projection::Exclude(vec!["__v".into()]));
    }

    #[test]
    fn pagination_computes_skip_and_tolerates_garbage() {
        let query = TourQuery::default().paginate(&params(&[("page", "3"), ("limit", "10")]));
        assert_eq!(query.pagination.skip(), 20);
        assert!(query.pagination.explicit);

        let query = TourQuery::default().paginate(&params(&[("page", "abc"), ("limit", "-4")]));
        assert_eq!(query.pagination.page, DEFAULT_PAGE);
        assert_eq!(query.pagination.limit, DEFAULT_LIMIT);
        assert!(query.pagination.explicit);

        let query = TourQuery::default().paginate(&QueryParams::new());
        assert_eq!(query.pagination, Pagination::default());
        assert_eq!(query.find_options().skip, 0);
        assert_eq!(query.find_options().limit, Some(DEFAULT_LIMIT));
    }

    #[test]
    fn top_tours_alias_overrides_request_values() {
        let p = alias_top_tours(params(&[("limit", "50"), ("difficulty", "easy")]));
        let query = translate(&p);
        assert_eq!(query.pagination.limit, 5);
        assert_eq!(
            query.sort,
            vec![SortSpec::desc("ratingsAverage"), SortSpec::asc("price")]
        );
        assert_eq!(
            query.projection,
            Projection::Include(
                ["name", "price", "ratingsAverage", "summary", "difficulty"]
                    .map(String::from)
                    .to_vec()
            )
        );
        assert_eq!(clauses(&query.filter).len(), 2);
    }
}
