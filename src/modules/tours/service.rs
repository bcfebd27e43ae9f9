//! Tour operations shared by the HTTP handlers and the CLI.

use std::sync::Arc;

use natours_db::{Collection, Database, Document, Filter, Projection, StoreError};
use natours_http::AppError;

use super::features::{translate, QueryParams};
use super::models::{assign_slug, present, tour_schema, validate_changes, validate_new, visible};
use super::reports::{monthly_plan, parse_year, tour_stats};

const NOT_FOUND: &str = "No tour found with that id";

pub struct TourService {
    tours: Arc<Collection>,
}

impl TourService {
    /// Open the tours collection on `db`.
    pub async fn open(db: &Database) -> Result<Self, StoreError> {
        Ok(Self {
            tours: db.collection(tour_schema()).await?,
        })
    }

    /// Public tours matching the query string, one page at a time.
    ///
    /// An explicitly requested page past the end fails instead of returning
    /// an empty list. The count and the fetch are separate reads.
    pub async fn list(&self, params: &QueryParams) -> Result<Vec<Document>, AppError> {
        let query = translate(params);

        if query.pagination.explicit {
            let total = self.tours.count(&query.filter).await?;
            if query.pagination.skip() >= total {
                return Err(AppError::page_not_found());
            }
        }

        let tours = self.tours.find(&query.filter, &query.find_options()).await?;
        Ok(tours.into_iter().map(present).collect())
    }

    pub async fn get(&self, id: &str) -> Result<Document, AppError> {
        let filter = self.by_id(id)?;
        self.tours
            .find_one(&filter, &Projection::All)
            .await?
            .map(present)
            .ok_or_else(|| AppError::not_found(NOT_FOUND))
    }

    pub async fn create(&self, body: &Document) -> Result<Document, AppError> {
        let mut tour = validate_new(body).map_err(AppError::validation)?;
        assign_slug(&mut tour);
        let created = self.tours.insert_one(tour).await?;
        tracing::debug!(tour_id = ?created.get("_id"), "tour created");
        Ok(present(created))
    }

    pub async fn update(&self, id: &str, patch: &Document) -> Result<Document, AppError> {
        let filter = self.by_id(id)?;
        let changes = validate_changes(patch).map_err(AppError::validation)?;
        self.tours
            .find_one_and_update(&filter, changes)
            .await?
            .map(present)
            .ok_or_else(|| AppError::not_found(NOT_FOUND))
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let filter = self.by_id(id)?;
        match self.tours.find_one_and_delete(&filter).await? {
            Some(_) => Ok(()),
            None => Err(AppError::not_found(NOT_FOUND)),
        }
    }

    pub async fn stats(&self) -> Result<Vec<Document>, AppError> {
        Ok(self.tours.aggregate(&tour_stats()).await?)
    }

    /// Monthly plan for the year in `raw_year`; an unreadable year selects nothing.
    pub async fn monthly_plan(&self, raw_year: &str) -> Result<Vec<Document>, AppError> {
        Ok(self
            .tours
            .aggregate(&monthly_plan(parse_year(raw_year)))
            .await?)
    }

    /// Remove every stored tour, secret ones included.
    pub async fn delete_all(&self) -> Result<usize, AppError> {
        Ok(self.tours.delete_many(&Filter::True).await?)
    }

    fn by_id(&self, id: &str) -> Result<Filter, AppError> {
        Ok(visible().and(self.tours.id_filter(id)?))
    }
}
