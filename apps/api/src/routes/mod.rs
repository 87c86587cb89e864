pub mod health;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::onboarding::{gate, handlers};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Identity provider boundary
        .route(
            "/api/v1/identity/webhook",
            post(handlers::handle_identity_webhook),
        )
        // Onboarding flow
        .route("/onboarding", get(handlers::handle_dispatch))
        .route(
            "/onboarding/:step",
            get(handlers::handle_step_page).post(handlers::handle_step_submit),
        )
        .route(
            "/api/v1/onboarding/status",
            get(handlers::handle_status),
        )
        // Gated application surface
        .route("/dashboard", get(handlers::handle_dashboard))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::gate_middleware,
        ))
        .with_state(state)
}
