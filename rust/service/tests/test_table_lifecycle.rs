mod common;

use bigtwo_engine::cards::{Card, THREE_OF_DIAMONDS};
use bigtwo_engine::errors::GameError;
use bigtwo_engine::rules::Ruleset;
use bigtwo_engine::table::Phase;
use bigtwo_service::{Payout, TableError, TableEvent, TableManager};
use common::{config, funded_ledger, play_out, seated_table, GUILD};

#[tokio::test]
async fn two_player_game_with_stake_pays_winner_once() {
    let ledger = funded_ledger(&[1, 2], 100);
    let manager = TableManager::new(config(), ledger.clone());
    let id = seated_table(&manager, 1, &[1, 2], 100).await;
    let mut events = manager.subscribe(&id).unwrap();

    let view = manager.start(&id, 1).await.unwrap();
    assert_eq!(view.phase, Phase::TrickOpen);
    assert_eq!(view.pot, 200);
    assert_eq!(ledger.balance(GUILD, 1), 0);
    assert_eq!(ledger.balance(GUILD, 2), 0);
    assert!(view.seats.iter().all(|s| s.cards_left == 13));

    // the 3♦ holder leads it, the other player passes and the trick re-opens
    let leader = view.current_player.unwrap();
    let other = if leader == 1 { 2 } else { 1 };
    let view = manager.play(&id, leader, &[THREE_OF_DIAMONDS]).await.unwrap();
    assert_eq!(view.table_cards, Some(vec![THREE_OF_DIAMONDS]));
    assert_eq!(view.current_player, Some(other));
    let view = manager.pass(&id, other).await.unwrap();
    assert_eq!(view.table_cards, None);
    assert_eq!(view.table_owner, None);
    assert_eq!(view.current_player, Some(leader));

    let finished = play_out(&manager, &id, view).await;
    let winner = finished.winner().unwrap();
    let loser = if winner == 1 { 2 } else { 1 };
    assert_eq!(finished.finish_order, vec![winner, loser]);
    assert!(finished.seat(winner).unwrap().finished);
    assert_eq!(finished.seat(winner).unwrap().cards_left, 0);
    assert_eq!(
        finished.payout,
        Some(Payout {
            winner,
            amount: 200
        })
    );
    assert!(finished.closed);
    assert_eq!(ledger.balance(GUILD, winner), 200);
    assert_eq!(ledger.balance(GUILD, loser), 0);

    // torn down after payout
    assert_eq!(manager.state(&id), Err(TableError::TableNotFound(id.clone())));
    assert!(manager.active_tables().is_empty());
    assert_eq!(manager.table_for_channel(1), None);

    let events = events.drain();
    let payouts = events
        .iter()
        .filter(|e| matches!(e, TableEvent::PayoutCompleted { .. }))
        .count();
    assert_eq!(payouts, 1);
    assert!(matches!(events.last(), Some(TableEvent::GameEnded { .. })));

    let record = manager.history().recent(1).unwrap().remove(0);
    assert_eq!(record.finish_order, vec![winner, loser]);
    assert_eq!(record.stake, 100);
    assert_eq!(record.seed, Some(2024));
    assert!(!record.actions.is_empty());
}

#[tokio::test]
async fn free_game_moves_no_money() {
    let ledger = funded_ledger(&[1, 2, 3], 30);
    let manager = TableManager::new(config(), ledger.clone());
    let id = seated_table(&manager, 2, &[1, 2, 3], 0).await;

    let view = manager.start(&id, 1).await.unwrap();
    assert_eq!(view.pot, 0);
    let finished = play_out(&manager, &id, view).await;

    assert_eq!(finished.finish_order.len(), 3);
    assert_eq!(finished.payout, None);
    for p in 1..=3 {
        assert_eq!(ledger.balance(GUILD, p), 30);
    }
    assert_eq!(ledger.transactions(GUILD), 0);
}

#[tokio::test]
async fn four_players_rank_everyone() {
    let ledger = funded_ledger(&[1, 2, 3, 4], 50);
    let manager = TableManager::new(config(), ledger.clone());
    let id = seated_table(&manager, 3, &[1, 2, 3, 4], 50).await;

    let view = manager.start(&id, 1).await.unwrap();
    let finished = play_out(&manager, &id, view).await;

    let mut ranked = finished.finish_order.clone();
    ranked.sort_unstable();
    assert_eq!(ranked, vec![1, 2, 3, 4]);
    let winner = finished.winner().unwrap();
    assert_eq!(ledger.balance(GUILD, winner), 200);
    let total: u64 = (1..=4).map(|p| ledger.balance(GUILD, p)).sum();
    assert_eq!(total, 200);
}

#[tokio::test]
async fn lobby_rules_are_enforced() {
    let manager = TableManager::new(config(), funded_ledger(&[1, 2], 10));
    let id = manager.create_table(4, GUILD, 1, None).unwrap();

    assert_eq!(
        manager.start(&id, 1).await,
        Err(TableError::Game(GameError::TooFewPlayers {
            count: 1,
            minimum: 2
        }))
    );
    manager.join(&id, 2).await.unwrap();
    assert_eq!(
        manager.join(&id, 2).await,
        Err(TableError::Game(GameError::AlreadySeated(2)))
    );
    assert_eq!(
        manager.start(&id, 2).await,
        Err(TableError::Game(GameError::NotTableOwner(2)))
    );
    assert_eq!(
        manager.set_ruleset(&id, 2, Ruleset::free_start()).await,
        Err(TableError::Game(GameError::NotTableOwner(2)))
    );
    let view = manager
        .set_ruleset(&id, 1, Ruleset::free_start())
        .await
        .unwrap();
    assert_eq!(view.rules, Ruleset::free_start());

    let view = manager.start(&id, 1).await.unwrap();
    // free start: the owner leads
    assert_eq!(view.current_player, Some(1));
    assert_eq!(
        manager.join(&id, 3).await,
        Err(TableError::Game(GameError::TableAlreadyStarted))
    );
    assert_eq!(
        manager.set_stake(&id, 1, 10).await,
        Err(TableError::Game(GameError::TableAlreadyStarted))
    );
    assert_eq!(
        manager.start(&id, 1).await,
        Err(TableError::Game(GameError::TableAlreadyStarted))
    );
}

#[tokio::test]
async fn rejected_actions_surface_typed_errors() {
    let manager = TableManager::new(config(), funded_ledger(&[1, 2], 0));
    let id = seated_table(&manager, 5, &[1, 2], 0).await;
    let view = manager.start(&id, 1).await.unwrap();
    let leader = view.current_player.unwrap();
    let other = if leader == 1 { 2 } else { 1 };

    assert_eq!(
        manager.pass(&id, leader).await,
        Err(TableError::Game(GameError::CannotPassOpenTable))
    );
    assert!(matches!(
        manager.play(&id, other, &[THREE_OF_DIAMONDS]).await,
        Err(TableError::Game(GameError::NotYourTurn { .. }))
    ));

    let hand = manager.hand(&id, leader).await.unwrap();
    let not_three: Vec<Card> = hand
        .iter()
        .copied()
        .filter(|c| *c != THREE_OF_DIAMONDS)
        .take(1)
        .collect();
    assert_eq!(
        manager.play(&id, leader, &not_three).await,
        Err(TableError::Game(GameError::MissingRequiredLeadCard))
    );
    // nothing above changed the table
    assert_eq!(manager.state(&id).unwrap(), view);

    manager.play(&id, leader, &[THREE_OF_DIAMONDS]).await.unwrap();
    let leader_high = *manager.hand(&id, leader).await.unwrap().last().unwrap();
    assert_eq!(
        manager.play(&id, other, &[leader_high]).await,
        Err(TableError::Game(GameError::CardsNotInHand(other)))
    );
    assert_eq!(
        manager.hand(&id, 99).await,
        Err(TableError::Game(GameError::NotSeated(99)))
    );
}

#[tokio::test]
async fn unknown_table_is_not_found() {
    let manager = TableManager::new(config(), funded_ledger(&[], 0));
    let missing = "nope".to_string();
    assert_eq!(
        manager.join(&missing, 1).await,
        Err(TableError::TableNotFound(missing.clone()))
    );
    assert_eq!(
        manager.cancel(&missing, 1).await,
        Err(TableError::TableNotFound(missing))
    );
}

#[tokio::test]
async fn finished_games_are_appended_to_record_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records").join("games.jsonl");
    let cfg = bigtwo_service::ServiceConfig {
        record_path: Some(path.clone()),
        ..config()
    };
    let manager = TableManager::from_config(cfg, funded_ledger(&[1, 2], 0)).unwrap();
    let id = seated_table(&manager, 8, &[1, 2], 0).await;
    let view = manager.start(&id, 1).await.unwrap();
    let finished = play_out(&manager, &id, view).await;

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: bigtwo_engine::logger::GameRecord = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record.finish_order, finished.finish_order);
    assert_eq!(record.players, vec![1, 2]);
    assert!(record.ts.is_some());
}
