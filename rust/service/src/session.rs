//! Table registry and the per-table concurrency guard.
//!
//! Each [`TableSession`] owns an async mutex around its game state. Every mutating
//! operation runs entirely inside that lock: validation, mutation, turn advancement and
//! any ledger calls (which are bounded by the escrow timeout). Mutations are applied to
//! a copy of the table and committed only while the registry still holds this exact
//! session, so an action that races a cancel is discarded instead of resurrecting the
//! table.
//!
//! Reads ([`TableManager::state`]) use a snapshot refreshed after every action and never
//! wait on the table lock.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bigtwo_engine::cards::Card;
use bigtwo_engine::deal::deal;
use bigtwo_engine::deck::Deck;
use bigtwo_engine::errors::GameError;
use bigtwo_engine::hand::HandType;
use bigtwo_engine::logger::GameRecord;
use bigtwo_engine::rules::Ruleset;
use bigtwo_engine::table::{Phase, PlayerId, Table};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::errors::{IntoErrorResponse, TableError};
use crate::escrow::{Escrow, Payout, Pot, Refund};
use crate::events::{EventBus, EventSubscription, TableEvent};
use crate::history::{GameHistory, HistoryError};
use crate::ledger::{AccountScope, Ledger};

pub type TableId = String;

/// Chat channel a table lives in; at most one table per channel.
pub type ChannelId = u64;

/// Public view of one seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatView {
    pub player_id: PlayerId,
    pub cards_left: usize,
    pub passed: bool,
    pub finished: bool,
}

/// Everything the presentation layer may show about a table, without private hands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableView {
    pub table_id: TableId,
    pub channel: ChannelId,
    pub owner: PlayerId,
    pub scope: AccountScope,
    pub phase: Phase,
    pub rules: Ruleset,
    pub stake: u64,
    /// Stakes currently held in escrow.
    pub pot: u64,
    pub seats: Vec<SeatView>,
    pub current_player: Option<PlayerId>,
    pub table_cards: Option<Vec<Card>>,
    pub table_hand: Option<HandType>,
    pub table_owner: Option<PlayerId>,
    pub finish_order: Vec<PlayerId>,
    pub payout: Option<Payout>,
    /// Cancelled or finished and removed from the registry.
    pub closed: bool,
}

impl TableView {
    pub fn winner(&self) -> Option<PlayerId> {
        self.finish_order.first().copied()
    }

    pub fn seat(&self, player: PlayerId) -> Option<&SeatView> {
        self.seats.iter().find(|s| s.player_id == player)
    }
}

#[derive(Debug)]
struct TableState {
    table: Table,
    stake: u64,
    pot: Pot,
    game_id: Option<String>,
    seed: Option<u64>,
    payout: Option<Payout>,
    closed: bool,
}

impl TableState {
    fn game_record(&self, result: Option<&str>) -> GameRecord {
        GameRecord {
            game_id: self.game_id.clone().unwrap_or_default(),
            seed: self.seed,
            ruleset: *self.table.rules(),
            players: self.table.player_ids(),
            actions: self.table.history().to_vec(),
            finish_order: self.table.finish_order().to_vec(),
            stake: self.stake,
            ts: None,
            result: result.map(str::to_string),
        }
    }
}

/// One live table.
#[derive(Debug)]
pub struct TableSession {
    id: TableId,
    channel: ChannelId,
    owner: PlayerId,
    escrow: Escrow,
    state: Arc<Mutex<TableState>>,
    view: RwLock<TableView>,
}

impl TableSession {
    fn new(
        id: TableId,
        channel: ChannelId,
        owner: PlayerId,
        rules: Ruleset,
        escrow: Escrow,
    ) -> Self {
        let state = TableState {
            table: Table::new(owner, rules),
            stake: 0,
            pot: Pot::default(),
            game_id: None,
            seed: None,
            payout: None,
            closed: false,
        };
        let view = capture(&id, channel, escrow.scope(), &state);
        Self {
            id,
            channel,
            owner,
            escrow,
            state: Arc::new(Mutex::new(state)),
            view: RwLock::new(view),
        }
    }

    pub fn id(&self) -> &TableId {
        &self.id
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    /// Last published snapshot.
    pub fn view(&self) -> TableView {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn refresh(&self, state: &TableState) -> TableView {
        let view = capture(&self.id, self.channel, self.escrow.scope(), state);
        *self.view.write().unwrap_or_else(PoisonError::into_inner) = view.clone();
        view
    }
}

fn capture(id: &TableId, channel: ChannelId, scope: AccountScope, state: &TableState) -> TableView {
    let table = &state.table;
    TableView {
        table_id: id.clone(),
        channel,
        owner: table.owner(),
        scope,
        phase: table.phase(),
        rules: *table.rules(),
        stake: state.stake,
        pot: if state.pot.is_paid() {
            0
        } else {
            state.pot.total()
        },
        seats: table
            .players()
            .iter()
            .map(|p| SeatView {
                player_id: p.id(),
                cards_left: p.hand().len(),
                passed: p.passed(),
                finished: p.finished(),
            })
            .collect(),
        current_player: table.current_player(),
        table_cards: table.table_cards().map(|h| h.cards.clone()),
        table_hand: table.table_cards().map(|h| h.hand_type),
        table_owner: table.table_owner(),
        finish_order: table.finish_order().to_vec(),
        payout: state.payout,
        closed: state.closed,
    }
}

#[derive(Debug, Default)]
struct Registry {
    by_id: HashMap<TableId, Arc<TableSession>>,
    by_channel: HashMap<ChannelId, TableId>,
}

impl Registry {
    fn holds(&self, session: &Arc<TableSession>) -> bool {
        self.by_id
            .get(&session.id)
            .is_some_and(|live| Arc::ptr_eq(live, session))
    }
}

/// Owns every live table. Tables are inserted on create and removed on cancel or game
/// over; nothing is persisted.
pub struct TableManager {
    registry: RwLock<Registry>,
    ledger: Arc<dyn Ledger>,
    events: EventBus,
    history: Arc<GameHistory>,
    config: ServiceConfig,
}

impl std::fmt::Debug for TableManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableManager")
            .field("tables", &self.active_tables().len())
            .field("config", &self.config)
            .finish()
    }
}

impl TableManager {
    pub fn new(config: ServiceConfig, ledger: Arc<dyn Ledger>) -> Self {
        Self::with_history(config, ledger, Arc::new(GameHistory::new()))
    }

    pub fn with_history(
        config: ServiceConfig,
        ledger: Arc<dyn Ledger>,
        history: Arc<GameHistory>,
    ) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            ledger,
            events: EventBus::new(),
            history,
            config,
        }
    }

    /// Opens the JSONL game log when `record_path` is configured.
    pub fn from_config(config: ServiceConfig, ledger: Arc<dyn Ledger>) -> Result<Self, HistoryError> {
        let history = match &config.record_path {
            Some(path) => GameHistory::with_log_file(path)?,
            None => GameHistory::new(),
        };
        Ok(Self::with_history(config, ledger, Arc::new(history)))
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn history(&self) -> Arc<GameHistory> {
        Arc::clone(&self.history)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Opens a lobby in `channel` with `owner` seated. `rules` defaults to the
    /// configured preset.
    pub fn create_table(
        &self,
        channel: ChannelId,
        scope: AccountScope,
        owner: PlayerId,
        rules: Option<Ruleset>,
    ) -> Result<TableId, TableError> {
        let rules = rules.unwrap_or_else(|| self.config.default_ruleset());
        let id = Uuid::new_v4().to_string();
        {
            let mut registry = self.write_registry()?;
            if registry.by_channel.contains_key(&channel) {
                return Err(TableError::ChannelOccupied(channel));
            }
            let escrow = Escrow::new(Arc::clone(&self.ledger), scope, self.config.ledger_timeout());
            let session = Arc::new(TableSession::new(id.clone(), channel, owner, rules, escrow));
            registry.by_id.insert(id.clone(), session);
            registry.by_channel.insert(channel, id.clone());
        }

        tracing::info!(table_id = %id, channel, owner, scope = ?scope, "table created");
        self.events.broadcast(
            &id,
            TableEvent::TableCreated {
                table_id: id.clone(),
                owner,
            },
        );
        Ok(id)
    }

    pub fn get_table(&self, table_id: &TableId) -> Result<Arc<TableSession>, TableError> {
        self.read_registry()?
            .by_id
            .get(table_id)
            .cloned()
            .ok_or_else(|| TableError::TableNotFound(table_id.clone()))
    }

    pub fn table_for_channel(&self, channel: ChannelId) -> Option<TableId> {
        self.read_registry()
            .ok()
            .and_then(|r| r.by_channel.get(&channel).cloned())
    }

    pub fn active_tables(&self) -> Vec<TableId> {
        match self.read_registry() {
            Ok(registry) => registry.by_id.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Latest snapshot; does not wait for an action in progress.
    pub fn state(&self, table_id: &TableId) -> Result<TableView, TableError> {
        Ok(self.get_table(table_id)?.view())
    }

    /// A player's own cards, lowest first.
    pub async fn hand(&self, table_id: &TableId, player: PlayerId) -> Result<Vec<Card>, TableError> {
        let (_, state) = self.lock_live(table_id).await?;
        let seat = state
            .table
            .player(player)
            .ok_or(GameError::NotSeated(player))?;
        Ok(seat.hand().to_vec())
    }

    pub fn subscribe(&self, table_id: &TableId) -> Result<EventSubscription, TableError> {
        self.get_table(table_id)?;
        Ok(self.events.subscribe(table_id.clone()))
    }

    pub async fn join(&self, table_id: &TableId, player: PlayerId) -> Result<TableView, TableError> {
        let (session, mut state) = self.lock_live(table_id).await?;
        let mut next = state.table.clone();
        next.join(player)?;
        self.commit(&session, &mut state, next)?;

        tracing::debug!(table_id = %table_id, player_id = player, "player joined");
        self.events.broadcast(
            table_id,
            TableEvent::PlayerJoined {
                table_id: table_id.clone(),
                player_id: player,
            },
        );
        Ok(session.refresh(&state))
    }

    pub async fn set_ruleset(
        &self,
        table_id: &TableId,
        requester: PlayerId,
        rules: Ruleset,
    ) -> Result<TableView, TableError> {
        let (session, mut state) = self.lock_live(table_id).await?;
        let mut next = state.table.clone();
        next.set_rules(requester, rules)?;
        self.commit(&session, &mut state, next)?;

        tracing::debug!(table_id = %table_id, rules = ?rules, "ruleset changed");
        self.events.broadcast(
            table_id,
            TableEvent::RulesChanged {
                table_id: table_id.clone(),
                rules,
            },
        );
        Ok(session.refresh(&state))
    }

    pub async fn set_stake(
        &self,
        table_id: &TableId,
        requester: PlayerId,
        stake: u64,
    ) -> Result<TableView, TableError> {
        let (session, mut state) = self.lock_live(table_id).await?;
        if requester != state.table.owner() {
            return Err(GameError::NotTableOwner(requester).into());
        }
        if state.table.is_started() {
            return Err(GameError::TableAlreadyStarted.into());
        }
        if !self.config.allows_stake(stake) {
            return Err(TableError::InvalidStake {
                stake,
                options: self.config.stake_options.clone(),
            });
        }
        if !self.read_registry()?.holds(&session) {
            return Err(TableError::TableNotFound(table_id.clone()));
        }
        state.stake = stake;

        tracing::debug!(table_id = %table_id, stake, "stake changed");
        self.events.broadcast(
            table_id,
            TableEvent::StakeChanged {
                table_id: table_id.clone(),
                stake,
            },
        );
        Ok(session.refresh(&state))
    }

    /// Deals, collects stakes and opens the first trick.
    ///
    /// # Errors
    ///
    /// Lobby errors from the table ([`GameError::NotTableOwner`],
    /// [`GameError::TooFewPlayers`], [`GameError::TableAlreadyStarted`]) and the escrow's
    /// [`TableError::InsufficientFunds`] / [`TableError::DebitFailed`]. On any failure
    /// nobody is left charged, except players listed as `unrefunded`.
    pub async fn start(&self, table_id: &TableId, requester: PlayerId) -> Result<TableView, TableError> {
        let (session, mut state) = self.lock_live(table_id).await?;
        state.table.ensure_can_start(requester)?;

        let mut deck = match self.config.seed {
            Some(seed) => Deck::new_with_seed(seed),
            None => Deck::new(),
        };
        let mut next = state.table.clone();
        let dealt = deal(next.players().len(), next.rules(), &mut deck)?;
        let attempts = dealt.attempts;
        let first = next.start(requester, dealt)?;

        let players = next.player_ids();
        let mut pot = session.escrow.collect(&players, state.stake).await?;

        if let Err(err) = self.commit(&session, &mut state, next) {
            let refund = session.escrow.refund(&mut pot).await;
            tracing::warn!(
                table_id = %table_id,
                refunded = ?refund.refunded,
                failed = ?refund.failed,
                "table closed while collecting stakes"
            );
            return Err(err);
        }
        state.pot = pot;
        state.seed = deck.seed();
        state.game_id = Some(Uuid::new_v4().to_string());

        tracing::info!(
            table_id = %table_id,
            players = players.len(),
            first_player = first,
            stake = state.stake,
            deal_attempts = attempts,
            "game started"
        );
        self.events.broadcast(
            table_id,
            TableEvent::GameStarted {
                table_id: table_id.clone(),
                players,
                first_player: first,
                stake: state.stake,
            },
        );
        Ok(session.refresh(&state))
    }

    pub async fn play(
        &self,
        table_id: &TableId,
        player: PlayerId,
        cards: &[Card],
    ) -> Result<TableView, TableError> {
        let (session, mut state) = self.lock_live(table_id).await?;
        let mut next = state.table.clone();
        let outcome = next.play(player, cards)?;
        self.commit(&session, &mut state, next)?;

        tracing::debug!(
            table_id = %table_id,
            player_id = player,
            hand = %outcome.hand.hand_type,
            cards = outcome.hand.cards.len(),
            "cards played"
        );
        self.events.broadcast(
            table_id,
            TableEvent::CardsPlayed {
                table_id: table_id.clone(),
                player_id: player,
                cards: outcome.hand.cards.clone(),
                hand_type: outcome.hand.hand_type,
                next_player: outcome.next_player,
            },
        );
        if outcome.finished {
            let place = state.table.finish_order().len();
            tracing::info!(table_id = %table_id, player_id = player, place, "player finished");
            self.events.broadcast(
                table_id,
                TableEvent::PlayerFinished {
                    table_id: table_id.clone(),
                    player_id: player,
                    place,
                },
            );
        }
        if outcome.game_over {
            self.finish_game(&session, &mut state).await;
        }
        Ok(session.refresh(&state))
    }

    pub async fn pass(&self, table_id: &TableId, player: PlayerId) -> Result<TableView, TableError> {
        let (session, mut state) = self.lock_live(table_id).await?;
        let mut next = state.table.clone();
        let outcome = next.pass(player)?;
        self.commit(&session, &mut state, next)?;

        tracing::debug!(table_id = %table_id, player_id = player, "passed");
        self.events.broadcast(
            table_id,
            TableEvent::Passed {
                table_id: table_id.clone(),
                player_id: player,
                next_player: outcome.next_player,
            },
        );
        if let Some(winner) = outcome.trick_won_by {
            self.events.broadcast(
                table_id,
                TableEvent::TrickWon {
                    table_id: table_id.clone(),
                    player_id: winner,
                },
            );
        }
        Ok(session.refresh(&state))
    }

    /// Owner-only teardown, allowed at any point. Removes the table from the registry
    /// first, then refunds any stakes still held.
    pub async fn cancel(&self, table_id: &TableId, requester: PlayerId) -> Result<Refund, TableError> {
        let session = self.get_table(table_id)?;
        if requester != session.owner {
            return Err(GameError::NotTableOwner(requester).into());
        }
        if !self.unregister(&session)? {
            return Err(TableError::TableNotFound(table_id.clone()));
        }
        tracing::info!(table_id = %table_id, requester, "table cancelled");

        let mut state = session.state.lock().await;
        state.closed = true;
        let refund = session.escrow.refund(&mut state.pot).await;
        if !refund.failed.is_empty() {
            tracing::error!(
                table_id = %table_id,
                players = ?refund.failed,
                stake = state.stake,
                "stake refunds failed on cancel"
            );
        }
        if state.table.is_started() {
            self.store_record(state.game_record(Some("cancelled")));
        }
        session.refresh(&state);
        drop(state);

        self.events.broadcast(
            table_id,
            TableEvent::TableCancelled {
                table_id: table_id.clone(),
                refunded: refund.refunded.clone(),
                refund_failed: refund.failed.clone(),
            },
        );
        self.events.drop_table(table_id);
        Ok(refund)
    }

    /// Pays the winner, records the game and tears the table down. Runs under the table
    /// lock; a failed payout is reported but does not undo the final play.
    async fn finish_game(&self, session: &Arc<TableSession>, state: &mut TableState) {
        let table_id = &session.id;
        let finish_order = state.table.finish_order().to_vec();

        if let Some(&winner) = finish_order.first() {
            let amount = state.pot.total();
            match session.escrow.payout(&mut state.pot, winner).await {
                Ok(Some(payout)) => {
                    state.payout = Some(payout);
                    self.events.broadcast(
                        table_id,
                        TableEvent::PayoutCompleted {
                            table_id: table_id.clone(),
                            winner,
                            amount: payout.amount,
                        },
                    );
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::error!(
                        table_id = %table_id,
                        winner,
                        amount,
                        error = %err,
                        "payout failed"
                    );
                    self.events.broadcast(
                        table_id,
                        TableEvent::PayoutFailed {
                            table_id: table_id.clone(),
                            winner,
                            amount,
                            reason: err.to_string(),
                        },
                    );
                }
            }
        }

        self.store_record(state.game_record(None));
        state.closed = true;
        if let Err(err) = self.unregister(session) {
            err.into_logged_response();
        }

        tracing::info!(table_id = %table_id, finish_order = ?finish_order, "game over");
        self.events.broadcast(
            table_id,
            TableEvent::GameEnded {
                table_id: table_id.clone(),
                finish_order,
            },
        );
        self.events.drop_table(table_id);
    }

    fn store_record(&self, record: GameRecord) {
        if let Err(err) = self.history.record(record) {
            err.into_logged_response();
        }
    }

    /// Locks a table that is still registered and not closed.
    async fn lock_live(
        &self,
        table_id: &TableId,
    ) -> Result<(Arc<TableSession>, OwnedMutexGuard<TableState>), TableError> {
        let session = self.get_table(table_id)?;
        let state = Arc::clone(&session.state).lock_owned().await;
        if state.closed || !self.read_registry()?.holds(&session) {
            return Err(TableError::TableNotFound(table_id.clone()));
        }
        Ok((session, state))
    }

    /// Installs `table` only if the registry still holds `session`.
    fn commit(
        &self,
        session: &Arc<TableSession>,
        state: &mut TableState,
        table: Table,
    ) -> Result<(), TableError> {
        let registry = self.read_registry()?;
        if state.closed || !registry.holds(session) {
            tracing::debug!(table_id = %session.id, "discarding action on closed table");
            return Err(TableError::TableNotFound(session.id.clone()));
        }
        state.table = table;
        Ok(())
    }

    /// Removes `session` if it is still the registered table for its id.
    fn unregister(&self, session: &Arc<TableSession>) -> Result<bool, TableError> {
        let mut registry = self.write_registry()?;
        if !registry.holds(session) {
            return Ok(false);
        }
        registry.by_id.remove(&session.id);
        if registry.by_channel.get(&session.channel) == Some(&session.id) {
            registry.by_channel.remove(&session.channel);
        }
        Ok(true)
    }

    fn read_registry(&self) -> Result<RwLockReadGuard<'_, Registry>, TableError> {
        self.registry.read().map_err(|_| TableError::StoragePoisoned)
    }

    fn write_registry(&self) -> Result<RwLockWriteGuard<'_, Registry>, TableError> {
        self.registry.write().map_err(|_| TableError::StoragePoisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    const SCOPE: AccountScope = AccountScope::Guild(1);

    fn manager() -> TableManager {
        let config = ServiceConfig {
            seed: Some(3),
            ..ServiceConfig::default()
        };
        TableManager::new(config, Arc::new(InMemoryLedger::new()))
    }

    #[test]
    fn one_table_per_channel() {
        let manager = manager();
        let id = manager.create_table(10, SCOPE, 1, None).unwrap();
        assert_eq!(
            manager.create_table(10, SCOPE, 2, None),
            Err(TableError::ChannelOccupied(10))
        );
        assert_eq!(manager.table_for_channel(10), Some(id.clone()));
        assert_eq!(manager.active_tables(), vec![id]);
    }

    #[test]
    fn new_table_snapshot_is_a_lobby() {
        let manager = manager();
        let id = manager.create_table(10, SCOPE, 1, Some(Ruleset::free_start())).unwrap();
        let view = manager.state(&id).unwrap();
        assert_eq!(view.phase, Phase::Lobby);
        assert_eq!(view.owner, 1);
        assert_eq!(view.rules, Ruleset::free_start());
        assert_eq!(view.seats.len(), 1);
        assert_eq!(view.current_player, None);
        assert!(!view.closed);
    }

    #[tokio::test]
    async fn stake_must_be_offered_and_set_by_owner() {
        let manager = manager();
        let id = manager.create_table(10, SCOPE, 1, None).unwrap();
        assert!(matches!(
            manager.set_stake(&id, 1, 7).await,
            Err(TableError::InvalidStake { stake: 7, .. })
        ));
        assert_eq!(
            manager.set_stake(&id, 2, 10).await,
            Err(TableError::Game(GameError::NotTableOwner(2)))
        );
        assert_eq!(manager.set_stake(&id, 1, 50).await.unwrap().stake, 50);
    }

    #[tokio::test]
    async fn cancelled_table_rejects_late_actions() {
        let manager = manager();
        let id = manager.create_table(10, SCOPE, 1, None).unwrap();
        let session = manager.get_table(&id).unwrap();
        manager.cancel(&id, 1).await.unwrap();

        assert_eq!(
            manager.join(&id, 2).await,
            Err(TableError::TableNotFound(id.clone()))
        );
        assert!(session.view().closed);
        assert_eq!(manager.table_for_channel(10), None);
        // the channel is free again
        manager.create_table(10, SCOPE, 1, None).unwrap();
    }

    #[tokio::test]
    async fn commit_refuses_unregistered_session() {
        let manager = manager();
        let id = manager.create_table(10, SCOPE, 1, None).unwrap();
        let session = manager.get_table(&id).unwrap();
        let mut state = Arc::clone(&session.state).lock_owned().await;
        assert!(manager.unregister(&session).unwrap());

        let mut next = state.table.clone();
        next.join(2).unwrap();
        assert_eq!(
            manager.commit(&session, &mut state, next),
            Err(TableError::TableNotFound(id))
        );
        assert_eq!(state.table.players().len(), 1);
    }

    #[tokio::test]
    async fn only_owner_cancels() {
        let manager = manager();
        let id = manager.create_table(10, SCOPE, 1, None).unwrap();
        assert_eq!(
            manager.cancel(&id, 2).await,
            Err(TableError::Game(GameError::NotTableOwner(2)))
        );
        assert!(manager.get_table(&id).is_ok());
    }
}
