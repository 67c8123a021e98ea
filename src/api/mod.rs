use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::OrderError;
use crate::health::HealthRegistry;
use crate::metrics::Metrics;
use crate::service::OrderService;

mod response;

pub use response::{ErrorResponse, OrderResponse};

// ============================================================================
// HTTP Server
// ============================================================================
//
//   GET /order/{id}   order lookup through the cache
//   GET /health       component health
//   GET /metrics      Prometheus text format
//
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrderService>,
    pub metrics: Arc<Metrics>,
    pub health: Arc<HealthRegistry>,
}

pub fn configure(state: AppState) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::Data::from(state.service))
            .app_data(web::Data::from(state.metrics))
            .app_data(web::Data::from(state.health))
            .route("/order/{id}", web::get().to(order_handler))
            .route("/health", web::get().to(health_handler))
            .route("/metrics", web::get().to(metrics_handler));
    }
}

/// Bind and build the server; the caller drives it and stops it via its handle
pub fn server(state: AppState, addr: &str) -> std::io::Result<Server> {
    tracing::info!(addr = %addr, "Starting HTTP server");

    let server = HttpServer::new(move || App::new().configure(configure(state.clone())))
        .bind(addr)?
        .disable_signals()
        .run();

    Ok(server)
}

async fn order_handler(
    service: web::Data<OrderService>,
    path: web::Path<String>,
) -> impl Responder {
    let order_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => {
            return HttpResponse::BadRequest().json(ErrorResponse {
                reason: "invalid request format or params".to_string(),
            })
        }
    };

    match service.order(order_id).await {
        Ok(order) => HttpResponse::Ok().json(OrderResponse::from(order)),
        Err(e @ OrderError::NotFound) => HttpResponse::NotFound().json(ErrorResponse {
            reason: e.to_string(),
        }),
        Err(e) => {
            tracing::error!(order_id = %order_id, error = %e, "Order lookup failed");
            HttpResponse::InternalServerError().json(ErrorResponse {
                reason: e.to_string(),
            })
        }
    }
}

async fn health_handler(health: web::Data<HealthRegistry>) -> impl Responder {
    let snapshot = health.snapshot();

    if snapshot.overall.is_unhealthy() {
        HttpResponse::ServiceUnavailable().json(snapshot)
    } else {
        HttpResponse::Ok().json(snapshot)
    }
}

async fn metrics_handler(metrics: web::Data<Metrics>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

// ============================================================================
// Unit Tests
// ============================================================================
