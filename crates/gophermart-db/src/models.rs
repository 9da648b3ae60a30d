//! Database row types. Kept apart from the wire types in gophermart-types so
//! the storage layer stays independent of the HTTP shape.

use chrono::{DateTime, Utc};
use gophermart_types::models::OrderStatus;
use rust_decimal::Decimal;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub token: String,
    pub token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OrderRow {
    pub number: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WithdrawalRow {
    pub order_number: String,
    pub user_id: String,
    pub amount: Decimal,
    pub processed_at: DateTime<Utc>,
}
