use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{AccrualStatus, OrderStatus};

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub auth_token: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// -- Orders --

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub number: String,
    pub status: OrderStatus,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

// -- Balance --

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub current: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub withdrawn: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WithdrawRequest {
    pub order: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sum: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawalResponse {
    pub order: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}

// -- Accrual service --

/// Body of `GET {accrual}/api/orders/{number}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualResponse {
    #[serde(default)]
    pub order: String,
    pub status: AccrualStatus,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub accrual: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn accrual_response_without_amount() {
        let resp: AccrualResponse =
            serde_json::from_str(r#"{"order":"1230","status":"REGISTERED"}"#).unwrap();
        assert_eq!(resp.order, "1230");
        assert_eq!(resp.status, AccrualStatus::Registered);
        assert_eq!(resp.accrual, None);
    }

    #[test]
    fn accrual_response_with_amount() {
        let resp: AccrualResponse =
            serde_json::from_str(r#"{"order":"1230","status":"PROCESSED","accrual":729.98}"#)
                .unwrap();
        assert_eq!(resp.accrual, Some(dec!(729.98)));
    }

    #[test]
    fn order_response_omits_missing_accrual() {
        let resp = OrderResponse {
            number: "1230".into(),
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("accrual").is_none());
        assert_eq!(json["status"], "NEW");
    }

    #[test]
    fn withdraw_request_accepts_numbers() {
        let req: WithdrawRequest =
            serde_json::from_str(r#"{"order":"2377225624","sum":751}"#).unwrap();
        assert_eq!(req.sum, dec!(751));
    }
}
