use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::sync::watch;

use crate::domain::order::{MalformedMessage, Order};
use crate::messaging::ConsumerState;
use crate::query::{OrderService, QueryError};

/// Shared state handed to every worker.
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub registry: Registry,
    pub consumer_state: watch::Receiver<ConsumerState>,
}

/// Bind the HTTP server. The caller owns shutdown: signals are disabled here
/// so the consumer can be stopped first.
pub fn start_http_server(state: AppState, port: u16, grace: Duration) -> std::io::Result<Server> {
    tracing::info!("🌐 Starting HTTP server on http://0.0.0.0:{}", port);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure)
    })
    .disable_signals()
    .shutdown_timeout(grace.as_secs())
    .bind(("0.0.0.0", port))?
    .run();

    Ok(server)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_handler))
        .route("/health", web::get().to(health_handler))
        .service(
            web::resource("/orders/{order_uid}")
                .route(web::get().to(get_order))
                .route(web::put().to(put_order))
                .route(web::delete().to(delete_order)),
        );
}

async fn get_order(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let order_uid = path.into_inner();

    match state.orders.get_by_uid(&order_uid).await {
        Ok(order) => HttpResponse::Ok().json(order),
        Err(QueryError::NotFound(_)) => not_found(&order_uid),
        Err(QueryError::Store(e)) => {
            tracing::error!(order_uid = %order_uid, error = %e, "Lookup failed");
            HttpResponse::InternalServerError().json(serde_json::json!({ "error": "store unavailable" }))
        }
    }
}

async fn put_order(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> HttpResponse {
    let order_uid = path.into_inner();

    let order: Order = match Order::from_payload(&body) {
        Ok(order) => order,
        Err(e) => return bad_request(&e),
    };
    if order.order_uid != order_uid {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("body order_uid {} does not match path {}", order.order_uid, order_uid)
        }));
    }

    match state.orders.update(order.clone()).await {
        Ok(()) => HttpResponse::Ok().json(order),
        Err(e) => {
            tracing::error!(order_uid = %order_uid, error = %e, "Admin update failed");
            HttpResponse::InternalServerError().json(serde_json::json!({ "error": "store unavailable" }))
        }
    }
}

async fn delete_order(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let order_uid = path.into_inner();

    match state.orders.delete(&order_uid).await {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => not_found(&order_uid),
        Err(e) => {
            tracing::error!(order_uid = %order_uid, error = %e, "Admin delete failed");
            HttpResponse::InternalServerError().json(serde_json::json!({ "error": "store unavailable" }))
        }
    }
}

async fn metrics_handler(state: web::Data<AppState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(state: web::Data<AppState>) -> impl Responder {
    let consumer = *state.consumer_state.borrow();
    let body = serde_json::json!({
        "status": if consumer.is_serving() { "healthy" } else { "degraded" },
        "service": "order-lookup",
        "consumer": consumer.to_string(),
    });

    if consumer.is_serving() {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

fn not_found(order_uid: &str) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({ "error": format!("order {} not found", order_uid) }))
}

fn bad_request(e: &MalformedMessage) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, OrderCache};
    use crate::metrics::Metrics;
    use crate::testing::{sample_order, FakeStore};
    use actix_web::{http::StatusCode, test};

    struct Fixture {
        state: AppState,
        cache: Arc<MemoryCache>,
        store: Arc<FakeStore>,
        state_tx: watch::Sender<ConsumerState>,
    }

    fn fixture(consumer: ConsumerState) -> Fixture {
        let cache = Arc::new(MemoryCache::new());
        let store = Arc::new(FakeStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let (state_tx, state_rx) = watch::channel(consumer);

        let state = AppState {
            orders: Arc::new(OrderService::new(cache.clone(), store.clone(), metrics.clone())),
            registry: metrics.registry().clone(),
            consumer_state: state_rx,
        };
        Fixture { state, cache, store, state_tx }
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state.clone()))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_get_known_order() {
        let f = fixture(ConsumerState::Subscribed);
        f.cache.upsert(sample_order("abc123")).await;
        let app = app!(f.state);

        let req = test::TestRequest::get().uri("/orders/abc123").to_request();
        let order: Order = test::call_and_read_body_json(&app, req).await;

        assert_eq!(order, sample_order("abc123"));
    }

    #[actix_web::test]
    async fn test_get_unknown_order_is_404() {
        let f = fixture(ConsumerState::Subscribed);
        let app = app!(f.state);

        let req = test::TestRequest::get().uri("/orders/missing-id").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_put_writes_through() {
        let f = fixture(ConsumerState::Subscribed);
        let app = app!(f.state);
        let order = sample_order("admin");

        let req = test::TestRequest::put()
            .uri("/orders/admin")
            .set_json(&order)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(f.store.stored("admin").await, Some(order.clone()));
        assert_eq!(f.cache.get("admin").await, Some(order));
    }

    #[actix_web::test]
    async fn test_put_rejects_mismatched_uid_and_malformed_body() {
        let f = fixture(ConsumerState::Subscribed);
        let app = app!(f.state);

        let req = test::TestRequest::put()
            .uri("/orders/other")
            .set_json(&sample_order("admin"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::put()
            .uri("/orders/admin")
            .set_payload(r#"{"order_uid":"admin"}"#)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        assert_eq!(f.store.save_calls(), 0);
    }

    #[actix_web::test]
    async fn test_delete_order() {
        let f = fixture(ConsumerState::Subscribed);
        f.store.insert(sample_order("gone")).await;
        let app = app!(f.state);

        let req = test::TestRequest::delete().uri("/orders/gone").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::delete().uri("/orders/gone").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_health_reflects_consumer_state() {
        let f = fixture(ConsumerState::Subscribed);
        let app = app!(f.state);
        let req = test::TestRequest::get().uri("/health").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        f.state_tx.send_replace(ConsumerState::Draining);
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["consumer"], "draining");
    }

    #[actix_web::test]
    async fn test_metrics_exposes_lookup_counters() {
        let f = fixture(ConsumerState::Subscribed);
        let app = app!(f.state);

        let req = test::TestRequest::get().uri("/orders/missing-id").to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains("order_lookups_total{source=\"miss\"} 1"));
    }
}
