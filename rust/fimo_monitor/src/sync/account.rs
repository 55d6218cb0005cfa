use super::monitor::Monitor;
use crate::error::{Error, Result};
use log::trace;
use std::fmt::{Debug, Formatter};

/// Kind of a committed [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Money was added to the account.
    Deposit,
    /// Money was removed from the account.
    Withdrawal,
}

/// An entry of the transaction log of a [`TransactionalAccount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    /// Position of the entry in the log, starting at 1.
    pub sequence: u64,
    /// Kind of the transaction.
    pub kind: TransactionKind,
    /// Transferred amount.
    pub amount: u64,
    /// Balance right after the transaction was committed.
    pub balance_after: u64,
}

/// An account whose operations are individual critical sections.
///
/// Amounts are expressed in the smallest currency unit. The balance never
/// becomes negative, and every committed deposit or withdrawal appends one
/// entry to an append-only transaction log.
pub struct TransactionalAccount {
    monitor: Monitor<AccountState>,
}

#[derive(Debug)]
struct AccountState {
    balance: u64,
    transactions: Vec<Transaction>,
}

impl AccountState {
    fn commit(&mut self, kind: TransactionKind, amount: u64, balance: u64) {
        self.balance = balance;
        let sequence = self.transactions.len() as u64 + 1;
        self.transactions.push(Transaction {
            sequence,
            kind,
            amount,
            balance_after: balance,
        });
    }
}

impl TransactionalAccount {
    /// Creates an account with `initial_balance` and an empty log.
    pub fn new(initial_balance: u64) -> Self {
        let monitor = Monitor::builder()
            .with_name("transactional_account")
            .build(AccountState {
                balance: initial_balance,
                transactions: Vec::new(),
            });

        Self { monitor }
    }

    /// Adds `amount` to the balance and returns the new balance.
    ///
    /// Fails with [`Error::InvalidArgument`] if `amount` is zero or the
    /// balance would overflow.
    pub fn deposit(&self, amount: u64) -> Result<u64> {
        Self::check_amount(amount)?;
        self.monitor.run_exclusive(|state| {
            let balance = state
                .balance
                .checked_add(amount)
                .ok_or_else(|| Error::invalid("balance overflow"))?;
            state.commit(TransactionKind::Deposit, amount, balance);
            trace!("Deposited {}, balance {}", amount, balance);
            Ok(balance)
        })
    }

    /// Removes `amount` from the balance and returns the new balance.
    ///
    /// Fails with [`Error::InsufficientFunds`], leaving the account
    /// untouched, if `amount` exceeds the balance.
    pub fn withdraw(&self, amount: u64) -> Result<u64> {
        Self::check_amount(amount)?;
        self.monitor.run_exclusive(|state| {
            let balance = state
                .balance
                .checked_sub(amount)
                .ok_or(Error::InsufficientFunds {
                    requested: amount,
                    available: state.balance,
                })?;
            state.commit(TransactionKind::Withdrawal, amount, balance);
            trace!("Withdrew {}, balance {}", amount, balance);
            Ok(balance)
        })
    }

    /// Moves `amount` from this account to `target`.
    ///
    /// The withdrawal and the deposit are two separate critical sections;
    /// no lock spans both accounts. Other tasks may observe the money in
    /// neither account in between. If the deposit fails after the withdrawal
    /// was committed, this account stays debited and the deposit's error is
    /// returned. No compensation is attempted.
    pub fn transfer(&self, target: &TransactionalAccount, amount: u64) -> Result<()> {
        self.withdraw(amount)?;
        target.deposit(amount)?;
        Ok(())
    }

    /// Current balance.
    pub fn balance(&self) -> Result<u64> {
        self.monitor.run_exclusive(|state| Ok(state.balance))
    }

    /// Snapshot of the transaction log, oldest first.
    pub fn transactions(&self) -> Result<Vec<Transaction>> {
        self.monitor
            .run_exclusive(|state| Ok(state.transactions.clone()))
    }

    /// Number of committed transactions.
    ///
    /// Increases by one with every committed deposit or withdrawal and can
    /// be used to detect concurrent modifications between two reads.
    pub fn version(&self) -> Result<u64> {
        self.monitor
            .run_exclusive(|state| Ok(state.transactions.len() as u64))
    }

    fn check_amount(amount: u64) -> Result<()> {
        if amount == 0 {
            Err(Error::invalid("amount must be positive"))
        } else {
            Ok(())
        }
    }
}

impl Debug for TransactionalAccount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalAccount")
            .field("monitor", &self.monitor)
            .finish()
    }
}
