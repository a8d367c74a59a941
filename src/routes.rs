use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/appointments",
            post(handlers::appointments::create_appointment),
        )
        .route(
            "/api/appointments/book",
            post(handlers::appointments::create_appointment),
        )
        .route(
            "/api/appointments/check",
            get(handlers::appointments::check_booked_times),
        )
        .route(
            "/api/appointments/slots",
            get(handlers::appointments::available_slots),
        )
        .route(
            "/api/appointments/update-status",
            post(handlers::appointments::run_status_sweep),
        )
        .route(
            "/api/appointments/client/:client_id",
            get(handlers::appointments::list_for_client),
        )
        .route(
            "/api/appointments/consultancy/:consultancy_id",
            get(handlers::appointments::list_for_consultancy),
        )
        .route(
            "/api/appointments/:id",
            get(handlers::appointments::get_appointment)
                .patch(handlers::appointments::update_appointment)
                .put(handlers::appointments::update_appointment)
                .delete(handlers::appointments::delete_appointment),
        )
        .route(
            "/api/appointments/:id/receipt",
            get(handlers::appointments::get_receipt),
        )
        .route("/api/chatbot", post(handlers::chatbot::chat_turn))
        .route(
            "/api/admin/consultancies",
            get(handlers::admin::list_consultancies).post(handlers::admin::upsert_consultancy),
        )
        .route(
            "/api/admin/consultancies/:id/status",
            post(handlers::admin::set_consultancy_status),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
