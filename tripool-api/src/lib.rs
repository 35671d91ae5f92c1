use axum::{
    http::Method,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod payments;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .route(
            "/v1/trips/{trip_id}/payments",
            get(payments::get_status),
        )
        .route(
            "/v1/trips/{trip_id}/payments/setup",
            post(payments::setup_payments),
        )
        .route(
            "/v1/trips/{trip_id}/payments/join",
            post(payments::join_with_payment),
        )
        .route(
            "/v1/trips/{trip_id}/payments/participants/{participant_id}",
            delete(payments::remove_participant),
        )
        .route(
            "/v1/trips/{trip_id}/payments/card",
            post(payments::issue_virtual_card),
        )
        .route(
            "/v1/trips/{trip_id}/payments/capture",
            post(payments::capture_payments),
        )
        .route(
            "/v1/trips/{trip_id}/payments/reconcile",
            post(payments::reconcile_pending),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
