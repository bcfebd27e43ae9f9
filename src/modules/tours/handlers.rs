use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use natours_db::Document;
use natours_http::{ApiResponse, AppError};
use serde_json::{json, Value};

use super::features::{alias_top_tours, QueryParams};
use super::service::TourService;

type Service = State<Arc<TourService>>;
type Pairs = Result<Query<Vec<(String, String)>>, QueryRejection>;
type Body = Result<Json<Document>, JsonRejection>;

fn query_params(pairs: Pairs) -> Result<QueryParams, AppError> {
    let Query(pairs) = pairs.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    Ok(pairs.into_iter().collect())
}

fn body(body: Body) -> Result<Document, AppError> {
    body.map(|Json(doc)| doc)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

fn tour_list(tours: Vec<Document>) -> ApiResponse<Value> {
    let results = tours.len();
    ApiResponse::success(json!({ "tours": tours })).with_results(results)
}

pub async fn list_tours(
    State(service): Service,
    pairs: Pairs,
) -> Result<ApiResponse<Value>, AppError> {
    let params = query_params(pairs)?;
    Ok(tour_list(service.list(&params).await?))
}

pub async fn top_tours(
    State(service): Service,
    pairs: Pairs,
) -> Result<ApiResponse<Value>, AppError> {
    let params = alias_top_tours(query_params(pairs)?);
    Ok(tour_list(service.list(&params).await?))
}

pub async fn get_tour(
    State(service): Service,
    Path(id): Path<String>,
) -> Result<ApiResponse<Value>, AppError> {
    let tour = service.get(&id).await?;
    Ok(ApiResponse::success(json!({ "tour": tour })))
}

pub async fn create_tour(
    State(service): Service,
    payload: Body,
) -> Result<impl IntoResponse, AppError> {
    let tour = service.create(&body(payload)?).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::success(json!({ "tour": tour })).with_message("New tour created successfully"),
    ))
}

pub async fn update_tour(
    State(service): Service,
    Path(id): Path<String>,
    payload: Body,
) -> Result<ApiResponse<Value>, AppError> {
    let tour = service.update(&id, &body(payload)?).await?;
    Ok(ApiResponse::success(json!({ "tour": tour })).with_message("Tour updated successfully"))
}

pub async fn delete_tour(
    State(service): Service,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn tour_stats(State(service): Service) -> Result<ApiResponse<Vec<Document>>, AppError> {
    let stats = service.stats().await?;
    Ok(ApiResponse::success(stats).with_message("Tour stats loaded successfully!"))
}

pub async fn monthly_plan(
    State(service): Service,
    Path(year): Path<String>,
) -> Result<ApiResponse<Vec<Document>>, AppError> {
    let plan = service.monthly_plan(&year).await?;
    Ok(ApiResponse::success(plan).with_message("Tour with busiest months loaded successfully!"))
}
