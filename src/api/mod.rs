// ============================================================================
// HTTP API
// ============================================================================
//
// JSON routes under /api. Handlers expect `web::Data<OrderService>` in app
// data; request bodies that fail to parse are answered with 400 and the
// same `{"error": ...}` shape as every other failure.
//
// ============================================================================

mod error;
mod handlers;

use actix_web::{error::JsonPayloadError, web, HttpRequest};

pub use error::ApiError;

/// Largest accepted order body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(MAX_BODY_BYTES)
            .error_handler(json_error_handler),
    )
    .service(
        web::scope("/api")
            .route("/orders", web::post().to(handlers::create_order))
            .route("/orders", web::get().to(handlers::list_orders))
            .route("/orders/{id}", web::get().to(handlers::get_order))
            .route("/health", web::get().to(handlers::health)),
    );
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    tracing::debug!(error = %err, "Rejected request body");
    ApiError::BadRequest(err.to_string()).into()
}
