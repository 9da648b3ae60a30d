//! Types shared by the gophermart crates: order lifecycle, accrual results,
//! order-number validation and the HTTP wire formats.

pub mod api;
pub mod luhn;
pub mod models;
