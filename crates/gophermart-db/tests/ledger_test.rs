//! Integration tests: storage behaviour under concurrent access.
//!
//! Each test opens a fresh on-disk database so the writer and the reader
//! pool are real separate SQLite connections.

use std::sync::{Arc, Barrier};
use std::thread;

use gophermart_db::{CreateOrderOutcome, Database, WithdrawError};
use gophermart_types::models::{AccrualStatus, OrderStatus, ProcessingResult};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn open() -> (tempfile::TempDir, Arc<Database>) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("gophermart.db")).unwrap();
    (dir, Arc::new(db))
}

fn user(db: &Database, id: &str) {
    assert!(db
        .create_user(id, &format!("login-{}", id), "hash", "token", chrono::Utc::now())
        .unwrap());
}

fn processed(number: &str, accrual: Option<Decimal>) -> ProcessingResult {
    ProcessingResult {
        order_number: number.to_string(),
        status: AccrualStatus::Processed,
        accrual,
    }
}

#[test]
fn duplicate_username_is_not_created() {
    let (_dir, db) = open();
    user(&db, "u1");
    let created = db
        .create_user("u2", "login-u1", "hash", "token", chrono::Utc::now())
        .unwrap();
    assert!(!created);
    assert_eq!(db.get_user_by_username("login-u1").unwrap().unwrap().id, "u1");
}

#[test]
fn order_upload_outcomes() {
    let (_dir, db) = open();
    user(&db, "u1");
    user(&db, "u2");

    assert_eq!(db.create_order("u1", "1230").unwrap(), CreateOrderOutcome::Created);
    assert_eq!(db.create_order("u1", "1230").unwrap(), CreateOrderOutcome::AlreadyOwned);
    assert_eq!(db.create_order("u2", "1230").unwrap(), CreateOrderOutcome::OwnedByOther);

    let orders = db.get_orders_for_user("u1").unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::New);
    assert!(db.get_orders_for_user("u2").unwrap().is_empty());
}

#[test]
fn pending_orders_are_listed_oldest_first() {
    let (_dir, db) = open();
    user(&db, "u1");
    for number in ["1230", "12344", "79927398713"] {
        db.create_order("u1", number).unwrap();
    }
    db.apply_accrual_result(&processed("12344", Some(dec!(1)))).unwrap();

    assert_eq!(db.orders_needing_accrual().unwrap(), vec!["1230", "79927398713"]);
}

#[test]
fn applying_a_terminal_result_twice_is_idempotent() {
    let (_dir, db) = open();
    user(&db, "u1");
    db.create_order("u1", "1230").unwrap();

    let result = processed("1230", Some(dec!(500.00)));
    assert!(db.apply_accrual_result(&result).unwrap());
    let once = db.get_order("1230").unwrap().unwrap();

    assert!(!db.apply_accrual_result(&result).unwrap());
    let twice = db.get_order("1230").unwrap().unwrap();

    assert_eq!(once.status, twice.status);
    assert_eq!(once.accrual, twice.accrual);
    assert_eq!(db.read_balance("u1").unwrap().current, dec!(500));
}

#[test]
fn terminal_status_never_regresses() {
    let (_dir, db) = open();
    user(&db, "u1");
    db.create_order("u1", "1230").unwrap();

    db.apply_accrual_result(&ProcessingResult {
        order_number: "1230".into(),
        status: AccrualStatus::Invalid,
        accrual: None,
    })
    .unwrap();

    let applied = db
        .apply_accrual_result(&ProcessingResult {
            order_number: "1230".into(),
            status: AccrualStatus::Processing,
            accrual: None,
        })
        .unwrap();
    assert!(!applied);
    assert_eq!(db.get_order("1230").unwrap().unwrap().status, OrderStatus::Invalid);
}

#[test]
fn registered_moves_new_to_processing_without_accrual() {
    let (_dir, db) = open();
    user(&db, "u1");
    db.create_order("u1", "1230").unwrap();

    db.apply_accrual_result(&ProcessingResult {
        order_number: "1230".into(),
        status: AccrualStatus::Registered,
        accrual: Some(dec!(3)),
    })
    .unwrap();

    let order = db.get_order("1230").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.accrual, None);
    assert_eq!(db.orders_needing_accrual().unwrap(), vec!["1230"]);
}

#[test]
fn negative_accrual_is_refused() {
    let (_dir, db) = open();
    user(&db, "u1");
    db.create_order("u1", "1230").unwrap();

    assert!(db.apply_accrual_result(&processed("1230", Some(dec!(-10)))).is_err());

    let order = db.get_order("1230").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.accrual, None);
    let balance = db.read_balance("u1").unwrap();
    assert_eq!(balance.current, dec!(0));
    assert_eq!(db.orders_needing_accrual().unwrap(), vec!["1230"]);

    // A zero reward is still a valid result.
    assert!(db.apply_accrual_result(&processed("1230", Some(dec!(0)))).unwrap());
    assert_eq!(db.get_order("1230").unwrap().unwrap().status, OrderStatus::Processed);
}

#[test]
fn result_for_unknown_order_is_ignored() {
    let (_dir, db) = open();
    assert!(!db.apply_accrual_result(&processed("1230", Some(dec!(1)))).unwrap());
}

#[test]
fn competing_withdrawals_never_overdraw() {
    let (_dir, db) = open();
    user(&db, "u1");
    db.create_order("u1", "1230").unwrap();
    db.apply_accrual_result(&processed("1230", Some(dec!(100)))).unwrap();

    // Each withdrawal fits on its own; together they would overdraw.
    let attempts = 10;
    let barrier = Arc::new(Barrier::new(attempts));
    let handles: Vec<_> = (0..attempts)
        .map(|i| {
            let db = db.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                db.withdraw("u1", &format!("w-{}", i), dec!(30))
            })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(()) => accepted += 1,
            Err(WithdrawError::InsufficientFunds { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(accepted, 3);
    let balance = db.read_balance("u1").unwrap();
    assert_eq!(balance.current, dec!(10));
    assert_eq!(balance.withdrawn, dec!(90));
}

#[test]
fn balance_reads_stay_non_negative_during_withdrawals() {
    let (_dir, db) = open();
    user(&db, "u1");
    db.create_order("u1", "1230").unwrap();
    db.apply_accrual_result(&processed("1230", Some(dec!(50)))).unwrap();

    let writer = {
        let db = db.clone();
        thread::spawn(move || {
            for i in 0..100 {
                let _ = db.withdraw("u1", &format!("w-{}", i), dec!(1));
            }
        })
    };

    for _ in 0..200 {
        let balance = db.read_balance("u1").unwrap();
        assert!(balance.current >= Decimal::ZERO);
        assert_eq!(balance.current + balance.withdrawn, dec!(50));
    }

    writer.join().unwrap();
    assert_eq!(db.read_balance("u1").unwrap().current, dec!(0));
}
