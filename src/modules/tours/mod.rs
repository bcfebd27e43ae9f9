pub mod features;
pub mod handlers;
pub mod models;
pub mod reports;
pub mod service;

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use axum::{routing::get, Router};
use natours_db::CollectionSchema;
use natours_kernel::{InitCtx, Module};
use once_cell::sync::OnceCell;
use serde_json::json;

use service::TourService;

/// Tours catalogue: CRUD, listing queries and reports
pub struct ToursModule {
    service: OnceCell<Arc<TourService>>,
}

impl ToursModule {
    pub const fn new() -> Self {
        Self {
            service: OnceCell::new(),
        }
    }

    /// The service opened by `init`, if it has run.
    pub fn service(&self) -> Option<Arc<TourService>> {
        self.service.get().cloned()
    }
}

impl Default for ToursModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for ToursModule {
    fn name(&self) -> &'static str {
        "tours"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let service = TourService::open(ctx.db).await?;
        self.service
            .set(Arc::new(service))
            .map_err(|_| anyhow!("tours module initialized twice"))?;
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "tours module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        let Some(service) = self.service() else {
            tracing::warn!(module = self.name(), "routes requested before init; none mounted");
            return Router::new();
        };

        Router::new()
            .route("/", get(handlers::list_tours).post(handlers::create_tour))
            .route("/top-5-tours", get(handlers::top_tours))
            .route("/tour-stats", get(handlers::tour_stats))
            .route("/monthly-plan/{year}", get(handlers::monthly_plan))
            .route(
                "/{id}",
                get(handlers::get_tour)
                    .patch(handlers::update_tour)
                    .delete(handlers::delete_tour),
            )
            .with_state(service)
    }

    fn collections(&self) -> Vec<CollectionSchema> {
        vec![models::tour_schema()]
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = |description: &str| {
            json!({
                "description": description,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                    }
                }
            })
        };
        let tour_body = |description: &str| {
            json!({
                "description": description,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/TourEnvelope" }
                    }
                }
            })
        };
        let id_param = json!({
            "name": "id",
            "in": "path",
            "required": true,
            "schema": { "type": "string", "format": "uuid" }
        });
        let list = json!({
            "summary": "List tours",
            "description": "Filter with `field=value` or `field[gte|gt|lte|lt]=value`; \
                            `sort`, `fields`, `page` and `limit` steer the result.",
            "tags": ["Tours"],
            "responses": {
                "200": {
                    "description": "One page of tours",
                    "content": {
                        "application/json": {
                            "schema": { "$ref": "#/components/schemas/TourList" }
                        }
                    }
                },
                "400": error("Malformed filter value or unknown field"),
                "404": error("Requested page does not exist")
            }
        });

        Some(json!({
            "paths": {
                "/": {
                    "get": list,
                    "post": {
                        "summary": "Create a tour",
                        "tags": ["Tours"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Tour" }
                                }
                            }
                        },
                        "responses": {
                            "201": tour_body("Created tour"),
                            "400": error("Validation failed or duplicate name")
                        }
                    }
                },
                "/top-5-tours": {
                    "get": {
                        "summary": "Five best rated, cheapest tours",
                        "tags": ["Tours"],
                        "responses": {
                            "200": {
                                "description": "Top tours",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/TourList" }
                                    }
                                }
                            }
                        }
                    }
                },
                "/tour-stats": {
                    "get": {
                        "summary": "Statistics per difficulty for tours rated 4.5 or more",
                        "tags": ["Tours"],
                        "responses": {
                            "200": { "description": "One row per difficulty" }
                        }
                    }
                },
                "/monthly-plan/{year}": {
                    "get": {
                        "summary": "Tour starts per month of a year",
                        "tags": ["Tours"],
                        "parameters": [{
                            "name": "year",
                            "in": "path",
                            "required": true,
                            "schema": { "type": "integer" }
                        }],
                        "responses": {
                            "200": { "description": "Up to twelve rows, busiest month first" }
                        }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Fetch a tour",
                        "tags": ["Tours"],
                        "parameters": [id_param.clone()],
                        "responses": {
                            "200": tour_body("The tour"),
                            "400": error("Malformed id"),
                            "404": error("No tour with that id")
                        }
                    },
                    "patch": {
                        "summary": "Update some fields of a tour",
                        "tags": ["Tours"],
                        "parameters": [id_param.clone()],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Tour" }
                                }
                            }
                        },
                        "responses": {
                            "200": tour_body("Updated tour"),
                            "400": error("Validation failed"),
                            "404": error("No tour with that id")
                        }
                    },
                    "delete": {
                        "summary": "Delete a tour",
                        "tags": ["Tours"],
                        "parameters": [id_param],
                        "responses": {
                            "204": { "description": "Deleted" },
                            "404": error("No tour with that id")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Tour": {
                        "type": "object",
                        "properties": {
                            "_id": { "type": "string", "readOnly": true },
                            "name": { "type": "string", "minLength": 10, "maxLength": 40 },
                            "slug": { "type": "string", "readOnly": true },
                            "duration": { "type": "number" },
                            "durationWeeks": { "type": "number", "readOnly": true },
                            "maxGroupSize": { "type": "number" },
                            "difficulty": { "type": "string", "enum": ["easy", "medium", "difficult"] },
                            "ratingsAverage": { "type": "number", "minimum": 1, "maximum": 5 },
                            "ratingsQuantity": { "type": "number" },
                            "price": { "type": "number" },
                            "priceDiscount": { "type": "number" },
                            "summary": { "type": "string" },
                            "description": { "type": "string" },
                            "imageCover": { "type": "string" },
                            "images": { "type": "array", "items": { "type": "string" } },
                            "startDates": {
                                "type": "array",
                                "items": { "type": "string", "format": "date-time" }
                            },
                            "secretTour": { "type": "boolean" }
                        },
                        "required": [
                            "name", "duration", "maxGroupSize", "difficulty",
                            "price", "summary", "imageCover"
                        ]
                    },
                    "TourEnvelope": {
                        "type": "object",
                        "properties": {
                            "status": { "type": "string" },
                            "message": { "type": "string" },
                            "data": {
                                "type": "object",
                                "properties": {
                                    "tour": { "$ref": "#/components/schemas/Tour" }
                                }
                            }
                        }
                    },
                    "TourList": {
                        "type": "object",
                        "properties": {
                            "status": { "type": "string" },
                            "results": { "type": "integer" },
                            "data": {
                                "type": "object",
                                "properties": {
                                    "tours": {
                                        "type": "array",
                                        "items": { "$ref": "#/components/schemas/Tour" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }))
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "tours module stopped");
        Ok(())
    }
}

/// Create a new instance of the tours module
pub fn create_module() -> Arc<ToursModule> {
    Arc::new(ToursModule::new())
}
