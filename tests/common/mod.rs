//! Shared fixtures for the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cache_layer::{CacheError, Database};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    pub owner: String,
    pub balance: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("insufficient funds on account {0}")]
    InsufficientFunds(u64),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Table of accounts with staged transactional writes.
#[derive(Debug, Default, Clone)]
pub struct AccountsDb {
    rows: Arc<Mutex<HashMap<u64, Account>>>,
    selects: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
}

/// Writes staged by a transaction, applied on commit.
#[derive(Debug, Default)]
pub struct AccountsTx {
    staged: HashMap<u64, Account>,
    snapshot: HashMap<u64, Account>,
}

impl AccountsTx {
    pub fn account(&self, id: u64) -> Option<Account> {
        self.staged.get(&id).or_else(|| self.snapshot.get(&id)).cloned()
    }

    pub fn put(&mut self, account: Account) {
        self.staged.insert(account.id, account);
    }

    /// Moves `amount` between two accounts within the transaction.
    pub fn transfer(&mut self, from: u64, to: u64, amount: i64) -> Result<(), DbError> {
        let mut source = self.account(from).ok_or(CacheError::NotFound(from.to_string()))?;
        let mut target = self.account(to).ok_or(CacheError::NotFound(to.to_string()))?;
        source.balance -= amount;
        target.balance += amount;
        self.put(target);
        if source.balance < 0 {
            return Err(DbError::InsufficientFunds(from));
        }
        self.put(source);
        Ok(())
    }
}

impl AccountsDb {
    pub fn seeded(accounts: &[Account]) -> Self {
        let db = Self::default();
        {
            let mut rows = db.rows.lock().unwrap();
            for account in accounts {
                rows.insert(account.id, account.clone());
            }
        }
        db
    }

    pub async fn select(&self, id: u64) -> Result<Option<Account>, DbError> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    pub async fn update_owner(&self, id: u64, owner: &str) -> Result<u64, DbError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(account) => {
                account.owner = owner.to_string();
                Ok(1)
            }
            None => Err(CacheError::NotFound(id.to_string()).into()),
        }
    }

    pub fn row(&self, id: u64) -> Option<Account> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn selects(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Database for AccountsDb {
    type Tx = AccountsTx;
    type Error = DbError;

    async fn begin(&self) -> Result<AccountsTx, DbError> {
        Ok(AccountsTx {
            staged: HashMap::new(),
            snapshot: self.rows.lock().unwrap().clone(),
        })
    }

    async fn commit(&self, tx: AccountsTx) -> Result<(), DbError> {
        self.rows.lock().unwrap().extend(tx.staged);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, _tx: AccountsTx) -> Result<(), DbError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn account(id: u64, owner: &str, balance: i64) -> Account {
    Account {
        id,
        owner: owner.to_string(),
        balance,
    }
}
