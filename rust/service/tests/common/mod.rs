#![allow(dead_code)]

use std::sync::Arc;

use bigtwo_engine::cards::THREE_OF_DIAMONDS;
use bigtwo_engine::table::{Phase, PlayerId};
use bigtwo_service::{
    AccountScope, InMemoryLedger, ServiceConfig, TableId, TableManager, TableView,
};

pub const GUILD: AccountScope = AccountScope::Guild(900);

pub fn config() -> ServiceConfig {
    ServiceConfig {
        seed: Some(2024),
        ledger_timeout_ms: 200,
        ..ServiceConfig::default()
    }
}

pub fn funded_ledger(players: &[PlayerId], balance: u64) -> Arc<InMemoryLedger> {
    Arc::new(InMemoryLedger::with_balances(
        GUILD,
        players.iter().map(|&p| (p, balance)),
    ))
}

/// Lobby in `channel` owned by `players[0]` with everyone seated and the stake set.
pub async fn seated_table(
    manager: &TableManager,
    channel: u64,
    players: &[PlayerId],
    stake: u64,
) -> TableId {
    let id = manager
        .create_table(channel, GUILD, players[0], None)
        .expect("create table");
    for &p in &players[1..] {
        manager.join(&id, p).await.expect("join");
    }
    manager
        .set_stake(&id, players[0], stake)
        .await
        .expect("stake");
    id
}

/// The current player leads their lowest card (3♦ while they hold it) and everybody
/// else passes until the trick closes.
pub async fn lead_and_fold(manager: &TableManager, id: &TableId, view: TableView) -> TableView {
    let leader = view.current_player.expect("game running");
    let hand = manager.hand(id, leader).await.expect("hand");
    let card = if view.rules.must_start_with_three_of_diamonds && hand.contains(&THREE_OF_DIAMONDS)
    {
        THREE_OF_DIAMONDS
    } else {
        hand[0]
    };
    let mut view = manager.play(id, leader, &[card]).await.expect("lead");
    while view.phase == Phase::TrickActive {
        let next = view.current_player.expect("someone to act");
        view = manager.pass(id, next).await.expect("pass");
    }
    view
}

pub async fn play_out(manager: &TableManager, id: &TableId, mut view: TableView) -> TableView {
    while view.phase != Phase::GameOver {
        view = lead_and_fold(manager, id, view).await;
    }
    view
}
