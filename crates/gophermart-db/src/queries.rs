use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row, types::Type};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use gophermart_types::models::{OrderStatus, ProcessingResult};

use crate::Database;
use crate::models::{OrderRow, UserRow};

/// Result of uploading an order number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOrderOutcome {
    Created,
    /// Already uploaded by the same user.
    AlreadyOwned,
    /// Already uploaded by someone else.
    OwnedByOther,
}

impl Database {
    // -- Users --

    /// Insert a user. Returns false if the username is taken.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        token: &str,
        token_expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password, token, token_expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(username) DO NOTHING",
                (id, username, password_hash, token, format_timestamp(token_expires_at)),
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn refresh_token_expiry(&self, id: &str, token_expires_at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET token_expires_at = ?2 WHERE id = ?1",
                (id, format_timestamp(token_expires_at)),
            )?;
            Ok(())
        })
    }

    // -- Orders --

    /// Register an order number for `user_id`. Order numbers are unique across
    /// all users; a repeat upload never creates a second row.
    pub fn create_order(&self, user_id: &str, number: &str) -> Result<CreateOrderOutcome> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO orders (number, user_id, status) VALUES (?1, ?2, 'NEW')
                 ON CONFLICT(number) DO NOTHING",
                (number, user_id),
            )?;
            if inserted == 1 {
                return Ok(CreateOrderOutcome::Created);
            }

            let owner: String = conn.query_row(
                "SELECT user_id FROM orders WHERE number = ?1",
                [number],
                |row| row.get(0),
            )?;
            if owner == user_id {
                Ok(CreateOrderOutcome::AlreadyOwned)
            } else {
                Ok(CreateOrderOutcome::OwnedByOther)
            }
        })
    }

    pub fn get_orders_for_user(&self, user_id: &str) -> Result<Vec<OrderRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT number, user_id, status, accrual, uploaded_at
                 FROM orders
                 WHERE user_id = ?1
                 ORDER BY uploaded_at, rowid",
            )?;
            let rows = stmt
                .query_map([user_id], order_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_order(&self, number: &str) -> Result<Option<OrderRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT number, user_id, status, accrual, uploaded_at
                 FROM orders WHERE number = ?1",
                [number],
                order_from_row,
            )
            .optional()
        })
    }

    // -- Accrual pipeline --

    /// Numbers of orders still waiting on the accrual service, oldest first.
    pub fn orders_needing_accrual(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT number FROM orders
                 WHERE status IN ('NEW', 'PROCESSING')
                 ORDER BY uploaded_at, rowid",
            )?;
            let numbers = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(numbers)
        })
    }

    /// Persist an accrual result. Terminal orders are never rewritten and the
    /// status never moves backwards. Returns true if a row was updated.
    pub fn apply_accrual_result(&self, result: &ProcessingResult) -> Result<bool> {
        let next = result.status.order_status();
        if let Some(amount) = result.effective_accrual().filter(|a| *a < Decimal::ZERO) {
            anyhow::bail!(
                "refusing negative accrual {} for order {}",
                amount,
                result.order_number
            );
        }
        let accrual = result.effective_accrual().map(|a| a.to_string());

        self.with_conn_mut(|conn| {
            let current: Option<String> = conn
                .query_row(
                    "SELECT status FROM orders WHERE number = ?1",
                    [&result.order_number],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(current) = current else {
                warn!(order = %result.order_number, "accrual result for unknown order");
                return Ok(false);
            };
            let current = OrderStatus::from_str(&current)?;

            if !current.can_advance_to(next) {
                debug!(order = %result.order_number, %current, %next, "skipping non-forward status change");
                return Ok(false);
            }

            let updated = conn.execute(
                "UPDATE orders SET status = ?2, accrual = ?3
                 WHERE number = ?1 AND status = ?4",
                (&result.order_number, next.as_str(), accrual, current.as_str()),
            )?;
            Ok(updated == 1)
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, password, token, token_expires_at FROM users WHERE username = ?1",
    )?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                token: row.get(3)?,
                token_expires_at: timestamp_at(row, 4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<OrderRow> {
    let status: String = row.get(2)?;
    Ok(OrderRow {
        number: row.get(0)?,
        user_id: row.get(1)?,
        status: OrderStatus::from_str(&status)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        accrual: optional_decimal_at(row, 3)?,
        uploaded_at: timestamp_at(row, 4)?,
    })
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Decimal::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
