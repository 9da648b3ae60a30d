//! Balance derivation and withdrawal gating.
//!
//! The balance is never stored. It is recomputed from processed order
//! accruals and withdrawals inside a single transaction, so a reader never
//! sees half of a concurrent accrual or withdrawal. Withdrawals check funds
//! and insert under one `BEGIN IMMEDIATE` transaction on the writer
//! connection; two competing withdrawals cannot both pass the check.

use anyhow::anyhow;
use rusqlite::{Connection, ErrorCode, TransactionBehavior};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use gophermart_types::models::Balance;

use crate::Database;
use crate::models::WithdrawalRow;
use crate::queries::{OptionalExt, decimal_at, timestamp_at};

#[derive(Debug, Error)]
pub enum WithdrawError {
    #[error("a withdrawal for order {0} already exists")]
    DuplicateOrder(String),
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },
    #[error("withdrawal amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for WithdrawError {
    fn from(e: rusqlite::Error) -> Self {
        WithdrawError::Storage(e.into())
    }
}

impl Database {
    pub fn read_balance(&self, user_id: &str) -> anyhow::Result<Balance> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let balance = balance_in(&tx, user_id)?;
            tx.commit()?;
            Ok(balance)
        })
    }

    /// Record a withdrawal if the user can afford it at this instant.
    pub fn withdraw(
        &self,
        user_id: &str,
        order_number: &str,
        amount: Decimal,
    ) -> Result<(), WithdrawError> {
        if amount <= Decimal::ZERO {
            return Err(WithdrawError::NonPositiveAmount(amount));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT user_id FROM withdrawals WHERE order_number = ?1",
                    [order_number],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Err(WithdrawError::DuplicateOrder(order_number.to_string()));
            }

            let balance = balance_in(&tx, user_id)?;
            if amount > balance.current {
                return Err(WithdrawError::InsufficientFunds {
                    available: balance.current,
                    requested: amount,
                });
            }

            match tx.execute(
                "INSERT INTO withdrawals (order_number, user_id, amount) VALUES (?1, ?2, ?3)",
                (order_number, user_id, amount.to_string()),
            ) {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    return Err(WithdrawError::DuplicateOrder(order_number.to_string()));
                }
                Err(e) => return Err(e.into()),
            }

            tx.commit()?;
            info!(user = %user_id, order = %order_number, %amount, "withdrawal recorded");
            Ok(())
        })
    }

    pub fn get_withdrawals_for_user(&self, user_id: &str) -> anyhow::Result<Vec<WithdrawalRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT order_number, user_id, amount, processed_at
                 FROM withdrawals
                 WHERE user_id = ?1
                 ORDER BY processed_at, rowid",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(WithdrawalRow {
                        order_number: row.get(0)?,
                        user_id: row.get(1)?,
                        amount: decimal_at(row, 2)?,
                        processed_at: timestamp_at(row, 3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// `current = sum(processed accruals) - sum(withdrawals)`. Callers wrap this in
/// a transaction so both sums come from the same snapshot.
fn balance_in(conn: &Connection, user_id: &str) -> anyhow::Result<Balance> {
    let accrued = sum_column(
        conn,
        "SELECT accrual FROM orders
         WHERE user_id = ?1 AND status = 'PROCESSED' AND accrual IS NOT NULL",
        user_id,
    )?;
    let withdrawn = sum_column(
        conn,
        "SELECT amount FROM withdrawals WHERE user_id = ?1",
        user_id,
    )?;

    let current = accrued
        .checked_sub(withdrawn)
        .ok_or_else(|| anyhow!("balance underflow for user {}", user_id))?;

    Ok(Balance { current, withdrawn })
}

fn sum_column(conn: &Connection, sql: &str, user_id: &str) -> anyhow::Result<Decimal> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([user_id])?;

    let mut total = Decimal::ZERO;
    while let Some(row) = rows.next()? {
        total = total
            .checked_add(decimal_at(row, 0)?)
            .ok_or_else(|| anyhow!("balance overflow for user {}", user_id))?;
    }
    Ok(total)
}
