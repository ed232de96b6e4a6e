use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::base::Transaction;
use crate::portfolio::UserPortfolio;

/// Storage collaborator contract. The engine performs duplicate
/// checking itself; the store only persists and retrieves.
pub trait TransactionStore {
    /// All of a user's transactions, in any order. Callers sort.
    fn get_user_transactions(&self, user_id: &str) -> Result<Vec<Transaction>>;

    /// Appends a batch and returns the persisted ids.
    fn save_transactions_batch(&self, transactions: &[Transaction]) -> Result<Vec<String>>;

    /// Last cached portfolio snapshot, if any.
    fn get_user_portfolio(&self, user_id: &str) -> Result<Option<UserPortfolio>>;

    fn save_user_portfolio(&self, portfolio: &UserPortfolio) -> Result<()>;
}

/// In-memory store, used by tests and as a reference implementation.
#[derive(Default)]
pub struct MemoryStore {
    transactions: Mutex<Vec<Transaction>>,
    portfolios: Mutex<HashMap<String, UserPortfolio>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransactionStore for MemoryStore {
    fn get_user_transactions(&self, user_id: &str) -> Result<Vec<Transaction>> {
        let transactions = self
            .transactions
            .lock()
            .ok()
            .context("transaction store poisoned")?;
        Ok(transactions
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect())
    }

    fn save_transactions_batch(&self, batch: &[Transaction]) -> Result<Vec<String>> {
        let mut transactions = self
            .transactions
            .lock()
            .ok()
            .context("transaction store poisoned")?;
        transactions.extend_from_slice(batch);
        Ok(batch.iter().map(|tx| tx.id.clone()).collect())
    }

    fn get_user_portfolio(&self, user_id: &str) -> Result<Option<UserPortfolio>> {
        let portfolios = self
            .portfolios
            .lock()
            .ok()
            .context("portfolio store poisoned")?;
        Ok(portfolios.get(user_id).cloned())
    }

    fn save_user_portfolio(&self, portfolio: &UserPortfolio) -> Result<()> {
        let mut portfolios = self
            .portfolios
            .lock()
            .ok()
            .context("portfolio store poisoned")?;
        portfolios.insert(portfolio.user_id.clone(), portfolio.clone());
        Ok(())
    }
}
