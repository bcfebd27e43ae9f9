//! Success envelope shared by every JSON endpoint.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// `{ status, results?, data, message? }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success",
            results: None,
            data,
            message: None,
        }
    }

    /// Report how many items `data` holds.
    pub fn with_results(mut self, results: usize) -> Self {
        self.results = Some(results);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_fields_are_omitted() {
        let body = serde_json::to_value(ApiResponse::success(json!({"tour": {}}))).unwrap();
        assert_eq!(body, json!({"status": "success", "data": {"tour": {}}}));
    }

    #[test]
    fn list_envelope_reports_results() {
        let body = serde_json::to_value(
            ApiResponse::success(json!({"tours": [1, 2]}))
                .with_results(2)
                .with_message("ok"),
        )
        .unwrap();
        assert_eq!(body["results"], 2);
        assert_eq!(body["message"], "ok");
    }
}
