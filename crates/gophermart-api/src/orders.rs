use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, info};

use gophermart_db::CreateOrderOutcome;
use gophermart_types::api::OrderResponse;
use gophermart_types::luhn::{OrderNumber, OrderNumberError};

use crate::auth::AppState;
use crate::internal;
use crate::middleware::AuthUser;

/// Upload an order number as a plain-text body.
pub async fn upload_order(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    body: String,
) -> Result<StatusCode, StatusCode> {
    let number = match OrderNumber::parse(&body) {
        Ok(number) => number,
        Err(OrderNumberError::Empty) => return Err(StatusCode::BAD_REQUEST),
        Err(e) => {
            debug!(body = %body.trim(), "rejected order number: {}", e);
            return Err(StatusCode::UNPROCESSABLE_ENTITY);
        }
    };

    let db = state.db.clone();
    let uid = user_id.to_string();
    let num = number.as_str().to_string();
    let outcome = tokio::task::spawn_blocking(move || db.create_order(&uid, &num))
        .await
        .map_err(internal("spawn_blocking join error"))?
        .map_err(internal("create order failed"))?;

    match outcome {
        CreateOrderOutcome::Created => {
            info!(user = %user_id, order = %number, "order accepted");
            Ok(StatusCode::ACCEPTED)
        }
        CreateOrderOutcome::AlreadyOwned => Ok(StatusCode::OK),
        CreateOrderOutcome::OwnedByOther => Err(StatusCode::CONFLICT),
    }
}

/// The caller's orders, oldest first.
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Response, StatusCode> {
    let db = state.db.clone();
    let uid = user_id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.get_orders_for_user(&uid))
        .await
        .map_err(internal("spawn_blocking join error"))?
        .map_err(internal("list orders failed"))?;

    if rows.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let orders: Vec<OrderResponse> = rows
        .into_iter()
        .map(|row| OrderResponse {
            number: row.number,
            status: row.status,
            accrual: row.accrual,
            uploaded_at: row.uploaded_at,
        })
        .collect();

    Ok(Json(orders).into_response())
}
