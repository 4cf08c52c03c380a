//! Currency ledger collaborator.
//!
//! The table service never owns balances; it talks to a [`Ledger`] that belongs to the
//! surrounding bot. [`InMemoryLedger`] backs tests and local runs.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bigtwo_engine::table::PlayerId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which currency a table's stakes are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum AccountScope {
    /// Cross-server balance.
    Global,
    /// Balance local to one guild (server).
    Guild(u64),
}

impl AccountScope {
    /// Only guild currencies keep an audit trail.
    pub fn records_transactions(&self) -> bool {
        matches!(self, AccountScope::Guild(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
    #[error("Ledger call `{op}` timed out after {after_ms} ms")]
    Timeout { op: &'static str, after_ms: u64 },
}

/// Balance operations the table service depends on. Each call is atomic on its own;
/// nothing spans more than one call.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_balance(&self, scope: AccountScope, player: PlayerId)
        -> Result<u64, LedgerError>;

    /// `Ok(false)` means the ledger declined the debit.
    async fn debit(
        &self,
        scope: AccountScope,
        player: PlayerId,
        amount: u64,
    ) -> Result<bool, LedgerError>;

    async fn credit(
        &self,
        scope: AccountScope,
        player: PlayerId,
        amount: u64,
    ) -> Result<(), LedgerError>;

    /// Audit hook called after a batch of balance changes.
    async fn record_transaction(&self, scope: AccountScope) -> Result<(), LedgerError>;
}

#[derive(Debug, Default)]
struct Accounts {
    balances: HashMap<(AccountScope, PlayerId), u64>,
    transactions: HashMap<AccountScope, usize>,
    failing_debits: HashSet<PlayerId>,
    failing_credits: HashSet<PlayerId>,
}

/// Process-local ledger with switchable failures.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: Mutex<Accounts>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances(
        scope: AccountScope,
        balances: impl IntoIterator<Item = (PlayerId, u64)>,
    ) -> Self {
        let ledger = Self::new();
        {
            let mut accounts = ledger.lock();
            for (player, amount) in balances {
                accounts.balances.insert((scope, player), amount);
            }
        }
        ledger
    }

    pub fn set_balance(&self, scope: AccountScope, player: PlayerId, amount: u64) {
        self.lock().balances.insert((scope, player), amount);
    }

    pub fn balance(&self, scope: AccountScope, player: PlayerId) -> u64 {
        self.lock()
            .balances
            .get(&(scope, player))
            .copied()
            .unwrap_or(0)
    }

    /// Number of `record_transaction` calls seen for `scope`.
    pub fn transactions(&self, scope: AccountScope) -> usize {
        self.lock().transactions.get(&scope).copied().unwrap_or(0)
    }

    /// Makes every later debit of `player` fail with [`LedgerError::Unavailable`].
    pub fn fail_debits(&self, player: PlayerId) {
        self.lock().failing_debits.insert(player);
    }

    pub fn fail_credits(&self, player: PlayerId) {
        self.lock().failing_credits.insert(player);
    }

    pub fn heal(&self) {
        let mut accounts = self.lock();
        accounts.failing_debits.clear();
        accounts.failing_credits.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Accounts> {
        self.accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn get_balance(
        &self,
        scope: AccountScope,
        player: PlayerId,
    ) -> Result<u64, LedgerError> {
        Ok(self.balance(scope, player))
    }

    async fn debit(
        &self,
        scope: AccountScope,
        player: PlayerId,
        amount: u64,
    ) -> Result<bool, LedgerError> {
        let mut accounts = self.lock();
        if accounts.failing_debits.contains(&player) {
            return Err(LedgerError::Unavailable(format!(
                "debit of player {player} rejected"
            )));
        }
        let balance = accounts.balances.entry((scope, player)).or_insert(0);
        if *balance < amount {
            return Ok(false);
        }
        *balance -= amount;
        Ok(true)
    }

    async fn credit(
        &self,
        scope: AccountScope,
        player: PlayerId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let mut accounts = self.lock();
        if accounts.failing_credits.contains(&player) {
            return Err(LedgerError::Unavailable(format!(
                "credit of player {player} rejected"
            )));
        }
        *accounts.balances.entry((scope, player)).or_insert(0) += amount;
        Ok(())
    }

    async fn record_transaction(&self, scope: AccountScope) -> Result<(), LedgerError> {
        *self.lock().transactions.entry(scope).or_insert(0) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: AccountScope = AccountScope::Guild(7);

    #[tokio::test]
    async fn debit_declines_when_short() {
        let ledger = InMemoryLedger::with_balances(GUILD, [(1, 40)]);
        assert_eq!(ledger.debit(GUILD, 1, 50).await, Ok(false));
        assert_eq!(ledger.balance(GUILD, 1), 40);
        assert_eq!(ledger.debit(GUILD, 1, 40).await, Ok(true));
        assert_eq!(ledger.balance(GUILD, 1), 0);
    }

    #[tokio::test]
    async fn scopes_are_separate_accounts() {
        let ledger = InMemoryLedger::with_balances(GUILD, [(1, 100)]);
        ledger.credit(AccountScope::Global, 1, 5).await.unwrap();
        assert_eq!(ledger.balance(GUILD, 1), 100);
        assert_eq!(ledger.balance(AccountScope::Global, 1), 5);
        assert_eq!(ledger.balance(AccountScope::Guild(8), 1), 0);
    }

    #[tokio::test]
    async fn injected_failures_until_healed() {
        let ledger = InMemoryLedger::with_balances(GUILD, [(1, 100)]);
        ledger.fail_debits(1);
        ledger.fail_credits(1);
        assert!(ledger.debit(GUILD, 1, 10).await.is_err());
        assert!(ledger.credit(GUILD, 1, 10).await.is_err());
        ledger.heal();
        assert_eq!(ledger.debit(GUILD, 1, 10).await, Ok(true));
    }

    #[test]
    fn only_guild_scope_records_transactions() {
        assert!(GUILD.records_transactions());
        assert!(!AccountScope::Global.records_transactions());
    }
}
