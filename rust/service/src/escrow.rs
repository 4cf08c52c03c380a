//! Stake collection and payout against the [`Ledger`].
//!
//! Collection is all-or-nothing by manual compensation: balances are checked first,
//! then players are debited one at a time and every already-debited player is refunded
//! if a later debit fails. Every ledger call is bounded by a timeout because callers
//! hold the table lock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bigtwo_engine::table::PlayerId;
use serde::{Deserialize, Serialize};

use crate::errors::TableError;
use crate::ledger::{AccountScope, Ledger, LedgerError};

/// Stakes held for one game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pot {
    stake: u64,
    contributors: Vec<PlayerId>,
    stake_paid: bool,
}

impl Pot {
    pub fn stake(&self) -> u64 {
        self.stake
    }

    /// Players whose stake is currently held.
    pub fn contributors(&self) -> &[PlayerId] {
        &self.contributors
    }

    pub fn is_collected(&self) -> bool {
        !self.contributors.is_empty()
    }

    /// Set once the pot has been paid out or handed back.
    pub fn is_paid(&self) -> bool {
        self.stake_paid
    }

    pub fn total(&self) -> u64 {
        self.stake * self.contributors.len() as u64
    }
}

/// Credit made to the winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub winner: PlayerId,
    pub amount: u64,
}

/// Result of handing a pot back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub refunded: Vec<PlayerId>,
    pub failed: Vec<PlayerId>,
}

#[derive(Clone)]
pub struct Escrow {
    ledger: Arc<dyn Ledger>,
    scope: AccountScope,
    timeout: Duration,
}

impl std::fmt::Debug for Escrow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Escrow")
            .field("scope", &self.scope)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Escrow {
    pub fn new(ledger: Arc<dyn Ledger>, scope: AccountScope, timeout: Duration) -> Self {
        Self {
            ledger,
            scope,
            timeout,
        }
    }

    pub fn scope(&self) -> AccountScope {
        self.scope
    }

    /// Charges `stake` to every player, or to nobody.
    ///
    /// # Errors
    ///
    /// - [`TableError::InsufficientFunds`] naming every short player; nobody is charged
    /// - [`TableError::DebitFailed`] when a balance lookup or debit fails; players
    ///   already debited are refunded and any refund that also failed is listed in
    ///   `unrefunded`
    pub async fn collect(&self, players: &[PlayerId], stake: u64) -> Result<Pot, TableError> {
        if stake == 0 {
            return Ok(Pot::default());
        }

        let mut short = Vec::new();
        for &player in players {
            let balance = self
                .call("get_balance", self.ledger.get_balance(self.scope, player))
                .await
                .map_err(|err| {
                    tracing::warn!(player_id = player, error = %err, "balance lookup failed");
                    TableError::DebitFailed {
                        player,
                        reason: err.to_string(),
                        unrefunded: Vec::new(),
                    }
                })?;
            if balance < stake {
                short.push(player);
            }
        }
        if !short.is_empty() {
            tracing::info!(players = ?short, stake, "stake not covered");
            return Err(TableError::InsufficientFunds {
                players: short,
                stake,
            });
        }

        let mut debited = Vec::with_capacity(players.len());
        for &player in players {
            let reason = match self
                .call("debit", self.ledger.debit(self.scope, player, stake))
                .await
            {
                Ok(true) => {
                    debited.push(player);
                    continue;
                }
                Ok(false) => "debit declined".to_string(),
                Err(err) => err.to_string(),
            };

            tracing::warn!(
                player_id = player,
                stake,
                reason = %reason,
                rollback = debited.len(),
                "stake debit failed, refunding"
            );
            let refund = self.credit_each(&debited, stake).await;
            return Err(TableError::DebitFailed {
                player,
                reason,
                unrefunded: refund.failed,
            });
        }

        self.audit().await;
        tracing::info!(players = debited.len(), stake, "stakes collected");
        Ok(Pot {
            stake,
            contributors: debited,
            stake_paid: false,
        })
    }

    /// Credits the whole pot to `winner`, once.
    ///
    /// `stake_paid` is set before the credit is attempted, so a failed or timed-out
    /// credit is never retried by a second call.
    pub async fn payout(
        &self,
        pot: &mut Pot,
        winner: PlayerId,
    ) -> Result<Option<Payout>, LedgerError> {
        if pot.stake_paid || !pot.is_collected() {
            return Ok(None);
        }
        pot.stake_paid = true;
        let amount = pot.total();
        self.call("credit", self.ledger.credit(self.scope, winner, amount))
            .await?;
        self.audit().await;
        tracing::info!(winner, amount, "pot paid out");
        Ok(Some(Payout { winner, amount }))
    }

    /// Hands every stake back if the pot was collected and not yet paid.
    pub async fn refund(&self, pot: &mut Pot) -> Refund {
        if pot.stake_paid || !pot.is_collected() {
            return Refund::default();
        }
        pot.stake_paid = true;
        let refund = self.credit_each(&pot.contributors, pot.stake).await;
        self.audit().await;
        refund
    }

    async fn credit_each(&self, players: &[PlayerId], amount: u64) -> Refund {
        let mut refund = Refund::default();
        for &player in players {
            match self
                .call("credit", self.ledger.credit(self.scope, player, amount))
                .await
            {
                Ok(()) => refund.refunded.push(player),
                Err(err) => {
                    tracing::error!(player_id = player, amount, error = %err, "refund failed");
                    refund.failed.push(player);
                }
            }
        }
        refund
    }

    async fn audit(&self) {
        if !self.scope.records_transactions() {
            return;
        }
        if let Err(err) = self
            .call("record_transaction", self.ledger.record_transaction(self.scope))
            .await
        {
            tracing::warn!(scope = ?self.scope, error = %err, "transaction audit failed");
        }
    }

    async fn call<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout {
                op,
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    const GUILD: AccountScope = AccountScope::Guild(1);

    fn escrow(ledger: &Arc<InMemoryLedger>) -> Escrow {
        Escrow::new(ledger.clone(), GUILD, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn zero_stake_touches_nothing() {
        let ledger = Arc::new(InMemoryLedger::new());
        let pot = escrow(&ledger).collect(&[1, 2], 0).await.unwrap();
        assert!(!pot.is_collected());
        assert_eq!(ledger.transactions(GUILD), 0);
    }

    #[tokio::test]
    async fn short_players_are_all_named() {
        let ledger = Arc::new(InMemoryLedger::with_balances(
            GUILD,
            [(1, 100), (2, 99), (3, 0)],
        ));
        let err = escrow(&ledger).collect(&[1, 2, 3], 100).await.unwrap_err();
        assert_eq!(
            err,
            TableError::InsufficientFunds {
                players: vec![2, 3],
                stake: 100
            }
        );
        assert_eq!(ledger.balance(GUILD, 1), 100);
    }

    #[tokio::test]
    async fn rolled_back_collection_is_not_audited() {
        let ledger = Arc::new(InMemoryLedger::with_balances(GUILD, [(1, 100), (2, 100)]));
        ledger.fail_debits(2);
        let err = escrow(&ledger).collect(&[1, 2], 100).await.unwrap_err();
        assert!(matches!(err, TableError::DebitFailed { player: 2, .. }));
        assert_eq!(ledger.balance(GUILD, 1), 100);
        assert_eq!(ledger.transactions(GUILD), 0);
    }

    #[tokio::test]
    async fn payout_only_once() {
        let ledger = Arc::new(InMemoryLedger::with_balances(GUILD, [(1, 100), (2, 100)]));
        let escrow = escrow(&ledger);
        let mut pot = escrow.collect(&[1, 2], 100).await.unwrap();
        assert_eq!(pot.total(), 200);

        let first = escrow.payout(&mut pot, 1).await.unwrap();
        let second = escrow.payout(&mut pot, 1).await.unwrap();
        assert_eq!(
            first,
            Some(Payout {
                winner: 1,
                amount: 200
            })
        );
        assert_eq!(second, None);
        assert_eq!(ledger.balance(GUILD, 1), 200);
        assert_eq!(ledger.balance(GUILD, 2), 0);
    }

    #[tokio::test]
    async fn refund_after_payout_is_a_no_op() {
        let ledger = Arc::new(InMemoryLedger::with_balances(GUILD, [(1, 10), (2, 10)]));
        let escrow = escrow(&ledger);
        let mut pot = escrow.collect(&[1, 2], 10).await.unwrap();
        escrow.payout(&mut pot, 2).await.unwrap();
        assert_eq!(escrow.refund(&mut pot).await, Refund::default());
        assert_eq!(ledger.balance(GUILD, 2), 20);
    }
}
