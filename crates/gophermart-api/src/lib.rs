pub mod auth;
pub mod balance;
pub mod middleware;
pub mod orders;

use std::fmt::Display;

use axum::{
    Router,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::error;

pub use auth::{AppState, AppStateInner};
pub use middleware::AuthUser;

/// All `/api/user` routes. Request tracing is layered on by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/user/register", post(auth::register))
        .route("/api/user/login", post(auth::login));

    let protected_routes = Router::new()
        .route(
            "/api/user/orders",
            post(orders::upload_order).get(orders::list_orders),
        )
        .route("/api/user/balance", get(balance::get_balance))
        .route("/api/user/balance/withdraw", post(balance::withdraw))
        .route("/api/user/withdrawals", get(balance::list_withdrawals))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// Log an internal failure and collapse it to a 500.
pub(crate) fn internal<E: Display>(context: &str) -> impl FnOnce(E) -> StatusCode + '_ {
    move |e| {
        error!("{}: {}", context, e);
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
