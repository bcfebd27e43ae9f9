//! Canned aggregation reports over public tours.

use natours_db::{
    schema::day_start, Accumulator, CmpOp, Expr, Filter, Pipeline, SortSpec, Stage,
};
use time::Month;

use super::models::visible;
use crate::utils::parse_leading_int;

/// Months in a year; the monthly plan never returns more rows.
const MONTHS: usize = 12;

/// Threshold for a tour to count towards the difficulty statistics.
const TOP_RATING: f64 = 4.5;

/// Statistics per difficulty for well-rated tours, priciest group first.
pub fn tour_stats() -> Pipeline {
    exclude_secret(
        Pipeline::new()
            .stage(Stage::Match(Filter::cmp(
                "ratingsAverage",
                CmpOp::Gte,
                TOP_RATING,
            )))
            .stage(Stage::Group {
                id: Expr::field("difficulty").to_upper(),
                fields: vec![
                    ("numTours".into(), Accumulator::Sum(Expr::literal(1))),
                    (
                        "numRatings".into(),
                        Accumulator::Sum(Expr::field("ratingsQuantity")),
                    ),
                    (
                        "avgRating".into(),
                        Accumulator::Avg(Expr::field("ratingsAverage")),
                    ),
                    ("avgPrice".into(), Accumulator::Avg(Expr::field("price"))),
                    ("minPrice".into(), Accumulator::Min(Expr::field("price"))),
                    ("maxPrice".into(), Accumulator::Max(Expr::field("price"))),
                ],
            })
            .stage(Stage::Sort(vec![SortSpec::desc("avgPrice")])),
    )
}

/// Tour starts per month of `year`, busiest month first.
///
/// `None` selects nothing and yields an empty plan.
pub fn monthly_plan(year: Option<i32>) -> Pipeline {
    exclude_secret(
        Pipeline::new()
            .stage(Stage::Unwind("startDates".into()))
            .stage(Stage::Match(year_window(year)))
            .stage(Stage::Group {
                id: Expr::field("startDates").month(),
                fields: vec![
                    ("numTourStats".into(), Accumulator::Sum(Expr::literal(1))),
                    ("tours".into(), Accumulator::Push(Expr::field("name"))),
                ],
            })
            .stage(Stage::AddFields(vec![("month".into(), Expr::field("_id"))]))
            .stage(Stage::Unset(vec!["_id".into()]))
            .stage(Stage::Sort(vec![SortSpec::desc("numTourStats")]))
            .stage(Stage::Limit(MONTHS)),
    )
}

/// Year from a path segment; only a leading integer is read.
pub fn parse_year(raw: &str) -> Option<i32> {
    parse_leading_int(raw).and_then(|year| i32::try_from(year).ok())
}

/// Secret tours never reach a report.
pub fn exclude_secret(pipeline: Pipeline) -> Pipeline {
    pipeline.prepend(Stage::Match(visible()))
}

/// Midnight of January 1st through midnight of December 31st, inclusive.
fn year_window(year: Option<i32>) -> Filter {
    let bounds = year.and_then(|year| {
        Some((
            day_start(year, Month::January, 1)?,
            day_start(year, Month::December, 31)?,
        ))
    });
    match bounds {
        Some((first, last)) => Filter::cmp("startDates", CmpOp::Gte, first)
            .and(Filter::cmp("startDates", CmpOp::Lte, last)),
        None => Filter::none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_report_starts_by_dropping_secret_tours() {
        for pipeline in [tour_stats(), monthly_plan(Some(2024)), monthly_plan(None)] {
            assert_eq!(pipeline.stages()[0], Stage::Match(visible()));
        }
    }

    #[test]
    fn year_parsing_is_lenient() {
        assert_eq!(parse_year("2024"), Some(2024));
        assert_eq!(parse_year("2024-extra"), Some(2024));
        assert_eq!(parse_year("next"), None);
    }

    #[test]
    fn year_window_spans_the_calendar_year() {
        assert_eq!(
            year_window(Some(2024)),
            Filter::And(vec![
                Filter::cmp("startDates", CmpOp::Gte, "2024-01-01T00:00:00.000Z"),
                Filter::cmp("startDates", CmpOp::Lte, "2024-12-31T00:00:00.000Z"),
            ])
        );
        assert_eq!(year_window(None), Filter::none());
    }

    #[test]
    fn monthly_plan_is_capped() {
        let stages = monthly_plan(Some(2024));
        assert_eq!(stages.stages().last(), Some(&Stage::Limit(12)));
    }
}
