mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigtwo_engine::table::{Phase, PlayerId};
use bigtwo_service::{
    AccountScope, Escrow, InMemoryLedger, Ledger, LedgerError, TableError, TableEvent,
    TableManager, TestLogSubscriber,
};
use common::{config, funded_ledger, lead_and_fold, play_out, seated_table, GUILD};
use tracing::Level;

#[tokio::test]
async fn short_balance_charges_nobody() {
    let ledger = Arc::new(InMemoryLedger::with_balances(
        GUILD,
        [(1, 500), (2, 40), (3, 500)],
    ));
    let manager = TableManager::new(config(), ledger.clone());
    let id = seated_table(&manager, 1, &[1, 2, 3], 50).await;

    assert_eq!(
        manager.start(&id, 1).await,
        Err(TableError::InsufficientFunds {
            players: vec![2],
            stake: 50
        })
    );
    assert_eq!(ledger.balance(GUILD, 1), 500);
    assert_eq!(ledger.balance(GUILD, 2), 40);
    assert_eq!(ledger.balance(GUILD, 3), 500);

    let view = manager.state(&id).unwrap();
    assert_eq!(view.phase, Phase::Lobby);
    assert_eq!(view.pot, 0);

    // a cheaper stake lets the same lobby start
    manager.set_stake(&id, 1, 10).await.unwrap();
    assert_eq!(manager.start(&id, 1).await.unwrap().pot, 30);
}

#[tokio::test]
async fn failed_debit_refunds_earlier_players() {
    let ledger = funded_ledger(&[1, 2, 3], 100);
    ledger.fail_debits(3);
    let manager = TableManager::new(config(), ledger.clone());
    let id = seated_table(&manager, 2, &[1, 2, 3], 100).await;

    match manager.start(&id, 1).await {
        Err(TableError::DebitFailed {
            player, unrefunded, ..
        }) => {
            assert_eq!(player, 3);
            assert!(unrefunded.is_empty());
        }
        other => panic!("expected DebitFailed, got {other:?}"),
    }
    for p in 1..=3 {
        assert_eq!(ledger.balance(GUILD, p), 100);
    }
    assert_eq!(manager.state(&id).unwrap().phase, Phase::Lobby);
}

#[tokio::test]
async fn failed_refund_is_reported() {
    let ledger = funded_ledger(&[1, 2], 100);
    ledger.fail_debits(2);
    ledger.fail_credits(1);
    let manager = TableManager::new(config(), ledger.clone());
    let id = seated_table(&manager, 3, &[1, 2], 100).await;

    let err = manager.start(&id, 1).await.unwrap_err();
    assert_eq!(
        err,
        TableError::DebitFailed {
            player: 2,
            reason: "Ledger unavailable: debit of player 2 rejected".into(),
            unrefunded: vec![1],
        }
    );
    assert_eq!(ledger.balance(GUILD, 1), 0);
}

#[tokio::test]
async fn cancel_mid_game_refunds_every_stake() {
    let ledger = funded_ledger(&[1, 2, 3], 100);
    let manager = TableManager::new(config(), ledger.clone());
    let id = seated_table(&manager, 4, &[1, 2, 3], 50).await;
    let mut events = manager.subscribe(&id).unwrap();

    let view = manager.start(&id, 1).await.unwrap();
    lead_and_fold(&manager, &id, view).await;
    assert_eq!(ledger.balance(GUILD, 2), 50);

    let refund = manager.cancel(&id, 1).await.unwrap();
    assert_eq!(refund.refunded, vec![1, 2, 3]);
    assert!(refund.failed.is_empty());
    for p in 1..=3 {
        assert_eq!(ledger.balance(GUILD, p), 100);
    }

    let cancelled = manager.history().recent(1).unwrap().remove(0);
    assert_eq!(cancelled.result.as_deref(), Some("cancelled"));
    assert!(matches!(
        events.drain().last(),
        Some(TableEvent::TableCancelled { .. })
    ));
}

#[tokio::test]
async fn cancel_in_lobby_charges_nothing() {
    let ledger = funded_ledger(&[1, 2], 100);
    let manager = TableManager::new(config(), ledger.clone());
    let id = seated_table(&manager, 5, &[1, 2], 100).await;

    let refund = manager.cancel(&id, 1).await.unwrap();
    assert!(refund.refunded.is_empty());
    assert_eq!(ledger.balance(GUILD, 1), 100);
    assert!(manager.history().is_empty());
}

#[tokio::test]
async fn failed_payout_still_ends_the_game() {
    let ledger = funded_ledger(&[1, 2], 100);
    let manager = TableManager::new(config(), ledger.clone());
    let id = seated_table(&manager, 6, &[1, 2], 100).await;
    let mut events = manager.subscribe(&id).unwrap();

    let view = manager.start(&id, 1).await.unwrap();
    ledger.fail_credits(1);
    ledger.fail_credits(2);
    let finished = play_out(&manager, &id, view).await;

    assert_eq!(finished.phase, Phase::GameOver);
    assert_eq!(finished.payout, None);
    assert!(finished.closed);
    let events = events.drain();
    assert!(events
        .iter()
        .any(|e| matches!(e, TableEvent::PayoutFailed { amount: 200, .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, TableEvent::PayoutCompleted { .. })));
}

#[tokio::test]
async fn guild_scope_audits_and_global_does_not() {
    for (scope, channel) in [(GUILD, 10), (AccountScope::Global, 11)] {
        let ledger = Arc::new(InMemoryLedger::with_balances(scope, [(1, 10), (2, 10)]));
        let manager = TableManager::new(config(), ledger.clone());
        let id = manager.create_table(channel, scope, 1, None).unwrap();
        manager.join(&id, 2).await.unwrap();
        manager.set_stake(&id, 1, 10).await.unwrap();
        let view = manager.start(&id, 1).await.unwrap();
        let finished = play_out(&manager, &id, view).await;

        assert_eq!(ledger.balance(scope, finished.winner().unwrap()), 20);
        let expected = if scope == GUILD { 2 } else { 0 };
        assert_eq!(ledger.transactions(scope), expected, "{scope:?}");
    }
}

/// Ledger whose debits never answer.
struct StuckLedger {
    inner: InMemoryLedger,
}

#[async_trait]
impl Ledger for StuckLedger {
    async fn get_balance(&self, scope: AccountScope, player: PlayerId) -> Result<u64, LedgerError> {
        self.inner.get_balance(scope, player).await
    }

    async fn debit(
        &self,
        _scope: AccountScope,
        _player: PlayerId,
        _amount: u64,
    ) -> Result<bool, LedgerError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(true)
    }

    async fn credit(
        &self,
        scope: AccountScope,
        player: PlayerId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.inner.credit(scope, player, amount).await
    }

    async fn record_transaction(&self, scope: AccountScope) -> Result<(), LedgerError> {
        self.inner.record_transaction(scope).await
    }
}

#[tokio::test(start_paused = true)]
async fn stuck_ledger_times_out_instead_of_blocking_the_table() {
    let ledger = Arc::new(StuckLedger {
        inner: InMemoryLedger::with_balances(GUILD, [(1, 100), (2, 100)]),
    });
    let manager = TableManager::new(config(), ledger);
    let id = seated_table(&manager, 12, &[1, 2], 100).await;

    let err = manager.start(&id, 1).await.unwrap_err();
    assert_eq!(
        err,
        TableError::DebitFailed {
            player: 1,
            reason: "Ledger call `debit` timed out after 200 ms".into(),
            unrefunded: vec![],
        }
    );
    // the lock was released: the table still answers
    manager.set_stake(&id, 1, 0).await.unwrap();
    assert!(manager.start(&id, 1).await.is_ok());
}

#[tokio::test]
async fn escrow_payout_is_idempotent() {
    let ledger = funded_ledger(&[1, 2], 100);
    let escrow = Escrow::new(ledger.clone(), GUILD, Duration::from_millis(100));
    let mut pot = escrow.collect(&[1, 2], 100).await.unwrap();

    escrow.payout(&mut pot, 1).await.unwrap();
    escrow.payout(&mut pot, 1).await.unwrap();
    assert_eq!(ledger.balance(GUILD, 1), 200);
    assert!(pot.is_paid());
}

#[tokio::test]
async fn refund_failures_are_logged_at_error() {
    let logs = TestLogSubscriber::new();
    let _guard = tracing::subscriber::set_default(logs.registry());

    let ledger = funded_ledger(&[1, 2], 100);
    let escrow = Escrow::new(ledger.clone(), GUILD, Duration::from_millis(100));
    let mut pot = escrow.collect(&[1, 2], 100).await.unwrap();
    ledger.fail_credits(2);

    let refund = escrow.refund(&mut pot).await;
    assert_eq!(refund.refunded, vec![1]);
    assert_eq!(refund.failed, vec![2]);

    let errors = logs.matching(Level::ERROR, "refund failed");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field("player_id"), Some("2"));
}
