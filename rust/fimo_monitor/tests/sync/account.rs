use std::sync::Arc;

use fimo_monitor::sync::{Transaction, TransactionKind, TransactionalAccount};
use fimo_monitor::Error;

use crate::init_logging;

#[test]
fn zero_amount() -> Result<(), Error> {
    init_logging();
    let account = TransactionalAccount::new(10);
    let other = TransactionalAccount::new(0);
    assert!(matches!(account.deposit(0), Err(Error::InvalidArgument(_))));
    assert!(matches!(account.withdraw(0), Err(Error::InvalidArgument(_))));
    assert!(matches!(
        account.transfer(&other, 0),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(account.balance()?, 10);
    assert_eq!(account.version()?, 0);

    Ok(())
}

#[test]
fn insufficient_funds() -> Result<(), Error> {
    init_logging();
    let account = TransactionalAccount::new(50);
    assert_eq!(
        account.withdraw(80),
        Err(Error::InsufficientFunds {
            requested: 80,
            available: 50
        })
    );
    assert_eq!(account.balance()?, 50);
    assert!(account.transactions()?.is_empty());

    Ok(())
}

#[test]
fn transaction_log() -> Result<(), Error> {
    init_logging();
    let account = TransactionalAccount::new(100);
    assert_eq!(account.deposit(50)?, 150);
    assert_eq!(account.withdraw(30)?, 120);

    assert_eq!(
        account.transactions()?,
        vec![
            Transaction {
                sequence: 1,
                kind: TransactionKind::Deposit,
                amount: 50,
                balance_after: 150,
            },
            Transaction {
                sequence: 2,
                kind: TransactionKind::Withdrawal,
                amount: 30,
                balance_after: 120,
            },
        ]
    );
    assert_eq!(account.version()?, 2);

    Ok(())
}

#[test]
fn concurrent_round_trips() -> Result<(), Error> {
    init_logging();
    const TASKS: usize = 8;
    const ROUNDS: usize = 100;

    let account = Arc::new(TransactionalAccount::new(1000));
    let tasks: Vec<_> = (0..TASKS)
        .map(|_| {
            let account = Arc::clone(&account);
            std::thread::spawn(move || {
                for _ in 0..ROUNDS {
                    account.deposit(10).unwrap();
                    account.withdraw(10).unwrap();
                }
            })
        })
        .collect();

    for t in tasks {
        t.join().unwrap();
    }
    assert_eq!(account.balance()?, 1000);

    let log = account.transactions()?;
    assert_eq!(log.len(), 2 * TASKS * ROUNDS);
    for (i, tx) in log.iter().enumerate() {
        assert_eq!(tx.sequence, i as u64 + 1);
    }

    Ok(())
}

#[test]
fn transfer() -> Result<(), Error> {
    init_logging();
    let a = TransactionalAccount::new(100);
    let b = TransactionalAccount::new(20);
    a.transfer(&b, 60)?;
    assert_eq!(a.balance()?, 40);
    assert_eq!(b.balance()?, 80);

    assert_eq!(
        a.transfer(&b, 41),
        Err(Error::InsufficientFunds {
            requested: 41,
            available: 40
        })
    );
    assert_eq!(a.balance()?, 40);
    assert_eq!(b.balance()?, 80);

    Ok(())
}

#[test]
fn failed_deposit_keeps_withdrawal() -> Result<(), Error> {
    init_logging();
    let a = TransactionalAccount::new(100);
    let b = TransactionalAccount::new(u64::MAX - 10);

    assert!(matches!(a.transfer(&b, 20), Err(Error::InvalidArgument(_))));
    assert_eq!(a.balance()?, 80);
    assert_eq!(a.version()?, 1);
    assert_eq!(b.balance()?, u64::MAX - 10);
    assert_eq!(b.version()?, 0);

    Ok(())
}

#[test]
fn concurrent_transfers() -> Result<(), Error> {
    init_logging();
    let a = Arc::new(TransactionalAccount::new(500));
    let b = Arc::new(TransactionalAccount::new(500));

    let forth = {
        let (a, b) = (Arc::clone(&a), Arc::clone(&b));
        std::thread::spawn(move || {
            for _ in 0..100 {
                // Funds may be in flight in the other direction.
                let _ = a.transfer(&b, 5);
            }
        })
    };
    let back = {
        let (a, b) = (Arc::clone(&a), Arc::clone(&b));
        std::thread::spawn(move || {
            for _ in 0..100 {
                let _ = b.transfer(&a, 5);
            }
        })
    };
    forth.join().unwrap();
    back.join().unwrap();

    assert_eq!(a.balance()? + b.balance()?, 1000);

    Ok(())
}
