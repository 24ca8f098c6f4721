use actix_web::{web, HttpResponse};
use serde_json::json;

use super::ApiError;
use crate::domain::order::{Order, OrderService};

pub async fn create_order(
    service: web::Data<OrderService>,
    order: web::Json<Order>,
) -> Result<HttpResponse, ApiError> {
    let order_uid = service.create_order(order.into_inner()).await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Order created successfully",
        "order_uid": order_uid,
    })))
}

pub async fn get_order(
    service: web::Data<OrderService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let order_uid = path.into_inner();

    match service.get_order(&order_uid).await? {
        Some(order) => Ok(HttpResponse::Ok().json(order.as_ref())),
        None => Err(ApiError::NotFound),
    }
}

pub async fn list_orders(service: web::Data<OrderService>) -> Result<HttpResponse, ApiError> {
    let orders = service.list_orders().await?;
    let body: Vec<&Order> = orders.iter().map(|o| o.as_ref()).collect();

    Ok(HttpResponse::Ok().json(body))
}

pub async fn health(service: web::Data<OrderService>) -> HttpResponse {
    let report = service.health_check().await;

    if report.status.is_unhealthy() {
        HttpResponse::ServiceUnavailable().json(report)
    } else {
        HttpResponse::Ok().json(report)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
