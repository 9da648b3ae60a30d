use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Database: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id                TEXT PRIMARY KEY,
                username          TEXT NOT NULL UNIQUE,
                password          TEXT NOT NULL,
                token             TEXT NOT NULL,
                token_expires_at  TEXT NOT NULL,
                created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE orders (
                number       TEXT PRIMARY KEY,
                user_id      TEXT NOT NULL REFERENCES users(id),
                status       TEXT NOT NULL DEFAULT 'NEW',
                accrual      TEXT,
                uploaded_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_orders_user ON orders(user_id, uploaded_at);
            CREATE INDEX idx_orders_status ON orders(status, uploaded_at);

            CREATE TABLE withdrawals (
                order_number  TEXT PRIMARY KEY,
                user_id       TEXT NOT NULL REFERENCES users(id),
                amount        TEXT NOT NULL,
                processed_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_withdrawals_user ON withdrawals(user_id, processed_at);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
