//! Wallet debit abstraction.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;

use super::types::{LedgerError, LedgerResult};
use crate::config::pricing::round_usd;

/// One debit request, shaped like the `deduct_from_wallet` RPC arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletDebit {
    #[serde(rename = "p_user_id")]
    pub user_id: String,
    #[serde(rename = "p_amount")]
    pub amount: f64,
    #[serde(rename = "p_description")]
    pub description: String,
    /// Row id of the call, when the store assigned one
    #[serde(rename = "p_call_id")]
    pub call_id: Option<String>,
}

/// Debits a user's prepaid balance. Never retried by the ledger.
#[async_trait]
pub trait Wallet: Send + Sync {
    async fn debit(&self, debit: WalletDebit) -> LedgerResult<()>;
}

/// Balances held in memory. Used when no database is configured and in tests.
///
/// Users without a balance entry are debited from zero, so balances may go
/// negative the same way a postpaid account would.
#[derive(Debug, Default)]
pub struct InMemoryWallet {
    balances: DashMap<String, f64>,
    debits: DashMap<String, Vec<WalletDebit>>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, user_id: impl Into<String>, balance: f64) -> Self {
        self.balances.insert(user_id.into(), balance);
        self
    }

    pub fn balance(&self, user_id: &str) -> f64 {
        self.balances.get(user_id).map(|b| *b).unwrap_or(0.0)
    }

    /// Debits applied to a user, oldest first.
    pub fn debits_for(&self, user_id: &str) -> Vec<WalletDebit> {
        self.debits
            .get(user_id)
            .map(|d| d.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Wallet for InMemoryWallet {
    async fn debit(&self, debit: WalletDebit) -> LedgerResult<()> {
        if !debit.amount.is_finite() || debit.amount < 0.0 {
            return Err(LedgerError::WalletError(format!(
                "invalid debit amount {}",
                debit.amount
            )));
        }

        let mut balance = self.balances.entry(debit.user_id.clone()).or_insert(0.0);
        *balance = round_usd(*balance - debit.amount);
        drop(balance);

        self.debits
            .entry(debit.user_id.clone())
            .or_default()
            .push(debit);
        Ok(())
    }
}
