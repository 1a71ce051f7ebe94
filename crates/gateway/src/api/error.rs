//! Maps `sa_domain::Error` onto HTTP status codes for every handler in
//! this module (§4.8: auth/billing gatekeeping is upstream of this crate,
//! so there is no dedicated "unauthorized" mapping here).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sa_domain::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Config(_) | Error::PlanningFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Cancelled => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({"error": self.0.to_string()}));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let resp = ApiError(Error::NotFound("run x".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn planning_failed_maps_to_422() {
        let resp = ApiError(Error::PlanningFailed("bad plan".into())).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn store_error_maps_to_500() {
        let resp = ApiError(Error::Store("connection reset".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
