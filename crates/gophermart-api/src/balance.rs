use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use tracing::{debug, error};

use gophermart_db::WithdrawError;
use gophermart_types::api::{BalanceResponse, WithdrawRequest, WithdrawalResponse};
use gophermart_types::luhn::OrderNumber;

use crate::auth::AppState;
use crate::internal;
use crate::middleware::AuthUser;

pub async fn get_balance(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<BalanceResponse>, StatusCode> {
    let db = state.db.clone();
    let uid = user_id.to_string();
    let balance = tokio::task::spawn_blocking(move || db.read_balance(&uid))
        .await
        .map_err(internal("spawn_blocking join error"))?
        .map_err(internal("read balance failed"))?;

    Ok(Json(BalanceResponse {
        current: balance.current,
        withdrawn: balance.withdrawn,
    }))
}

/// Spend points against a new order number.
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    body: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<StatusCode, StatusCode> {
    let Json(req) = body.map_err(|_| StatusCode::BAD_REQUEST)?;

    let number = OrderNumber::parse(&req.order).map_err(|e| {
        debug!(order = %req.order, "rejected withdrawal order number: {}", e);
        StatusCode::UNPROCESSABLE_ENTITY
    })?;
    if req.sum <= Decimal::ZERO {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let db = state.db.clone();
    let uid = user_id.to_string();
    let result =
        tokio::task::spawn_blocking(move || db.withdraw(&uid, number.as_str(), req.sum))
            .await
            .map_err(internal("spawn_blocking join error"))?;

    match result {
        Ok(()) => Ok(StatusCode::OK),
        Err(WithdrawError::InsufficientFunds { .. }) => Err(StatusCode::PAYMENT_REQUIRED),
        Err(WithdrawError::DuplicateOrder(_)) => Err(StatusCode::CONFLICT),
        Err(WithdrawError::NonPositiveAmount(_)) => Err(StatusCode::UNPROCESSABLE_ENTITY),
        Err(WithdrawError::Storage(e)) => {
            error!("withdrawal failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Response, StatusCode> {
    let db = state.db.clone();
    let uid = user_id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.get_withdrawals_for_user(&uid))
        .await
        .map_err(internal("spawn_blocking join error"))?
        .map_err(internal("list withdrawals failed"))?;

    if rows.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let withdrawals: Vec<WithdrawalResponse> = rows
        .into_iter()
        .map(|row| WithdrawalResponse {
            order: row.order_number,
            sum: row.amount,
            processed_at: row.processed_at,
        })
        .collect();

    Ok(Json(withdrawals).into_response())
}
