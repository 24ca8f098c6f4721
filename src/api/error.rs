use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

use crate::domain::order::{OrderServiceError, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Order not found")]
    NotFound,

    #[error("{0}")]
    Internal(String),
}

impl From<OrderServiceError> for ApiError {
    fn from(err: OrderServiceError) -> Self {
        match err {
            OrderServiceError::Validation(e) => ApiError::Validation(e),
            OrderServiceError::Store(e) => ApiError::Internal(e.summary()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(ValidationError::EmptyItems).status_code(),
            StatusCode::BAD_REQUEST
        );

        let store = OrderServiceError::Store(StoreError::Timeout {
            operation: "save",
            elapsed: std::time::Duration::from_secs(5),
        });
        assert_eq!(
            ApiError::from(store).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
