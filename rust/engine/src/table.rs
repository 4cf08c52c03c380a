use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::deal::{starting_seat, Deal};
use crate::errors::GameError;
use crate::hand::{evaluate, Hand};
use crate::logger::{Action, ActionRecord};
use crate::rules::{validate_card_count, validate_first_lead, Ruleset, MAX_PLAYERS, MIN_PLAYERS};

/// Chat-platform user id.
pub type PlayerId = u64;

/// Where a table is in its life, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Lobby,
    /// Nothing on the table; the current player must lead.
    TrickOpen,
    TrickActive,
    GameOver,
}

/// One seat at the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    id: PlayerId,
    hand: Vec<Card>,
    passed: bool,
    finished: bool,
}

impl PlayerState {
    fn new(id: PlayerId) -> Self {
        Self {
            id,
            hand: Vec::new(),
            passed: false,
            finished: false,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }
    pub fn hand(&self) -> &[Card] {
        &self.hand
    }
    pub fn passed(&self) -> bool {
        self.passed
    }
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Removes `cards` only if every one of them is held.
    fn take(&mut self, cards: &[Card]) -> bool {
        if !cards.iter().all(|c| self.hand.contains(c)) {
            return false;
        }
        self.hand.retain(|c| !cards.contains(c));
        true
    }
}

/// Effect of an accepted play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayOutcome {
    pub hand: Hand,
    /// The player emptied their hand with this play.
    pub finished: bool,
    pub game_over: bool,
    pub next_player: Option<PlayerId>,
}

/// Effect of an accepted pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    /// Set when this pass ended the trick.
    pub trick_won_by: Option<PlayerId>,
    pub next_player: Option<PlayerId>,
}

/// Game state of one Big Two table.
///
/// Mutation is single-threaded; callers serialize access (see the service crate's
/// per-table lock).
#[derive(Debug, Clone)]
pub struct Table {
    owner: PlayerId,
    rules: Ruleset,
    players: Vec<PlayerState>,
    started: bool,
    first_trick: bool,
    turn_index: usize,
    table_cards: Option<Hand>,
    table_owner: Option<PlayerId>,
    finish_order: Vec<PlayerId>,
    trick: u32,
    history: Vec<ActionRecord>,
}

impl Table {
    /// A lobby with the owner already seated.
    pub fn new(owner: PlayerId, rules: Ruleset) -> Self {
        Self {
            owner,
            rules,
            players: vec![PlayerState::new(owner)],
            started: false,
            first_trick: true,
            turn_index: 0,
            table_cards: None,
            table_owner: None,
            finish_order: Vec::new(),
            trick: 0,
            history: Vec::new(),
        }
    }

    pub fn owner(&self) -> PlayerId {
        self.owner
    }
    pub fn rules(&self) -> &Ruleset {
        &self.rules
    }
    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }
    pub fn is_started(&self) -> bool {
        self.started
    }
    pub fn is_first_trick(&self) -> bool {
        self.first_trick
    }
    pub fn table_cards(&self) -> Option<&Hand> {
        self.table_cards.as_ref()
    }
    pub fn table_owner(&self) -> Option<PlayerId> {
        self.table_owner
    }
    pub fn finish_order(&self) -> &[PlayerId] {
        &self.finish_order
    }
    pub fn history(&self) -> &[ActionRecord] {
        &self.history
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn is_seated(&self, id: PlayerId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn is_game_over(&self) -> bool {
        self.started && self.unfinished_count() <= 1
    }

    pub fn phase(&self) -> Phase {
        if !self.started {
            Phase::Lobby
        } else if self.is_game_over() {
            Phase::GameOver
        } else if self.table_cards.is_none() {
            Phase::TrickOpen
        } else {
            Phase::TrickActive
        }
    }

    /// Whose turn it is, while a game is running.
    pub fn current_player(&self) -> Option<PlayerId> {
        match self.phase() {
            Phase::TrickOpen | Phase::TrickActive => Some(self.players[self.turn_index].id),
            Phase::Lobby | Phase::GameOver => None,
        }
    }

    pub fn join(&mut self, player: PlayerId) -> Result<(), GameError> {
        if self.started {
            return Err(GameError::TableAlreadyStarted);
        }
        if self.is_seated(player) {
            return Err(GameError::AlreadySeated(player));
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::TooManyPlayers {
                maximum: MAX_PLAYERS,
            });
        }
        self.players.push(PlayerState::new(player));
        Ok(())
    }

    /// Replaces the rules; lobby owner only, before the start.
    pub fn set_rules(&mut self, requester: PlayerId, rules: Ruleset) -> Result<(), GameError> {
        self.ensure_lobby_owner(requester)?;
        self.rules = rules;
        Ok(())
    }

    /// Checks everything `start` would check, without dealing.
    pub fn ensure_can_start(&self, requester: PlayerId) -> Result<(), GameError> {
        self.ensure_lobby_owner(requester)?;
        if self.players.len() < MIN_PLAYERS {
            return Err(GameError::TooFewPlayers {
                count: self.players.len(),
                minimum: MIN_PLAYERS,
            });
        }
        Ok(())
    }

    /// Hands out `dealt` and picks the first player.
    pub fn start(&mut self, requester: PlayerId, dealt: Deal) -> Result<PlayerId, GameError> {
        self.ensure_can_start(requester)?;
        if dealt.hands.len() != self.players.len() {
            return Err(GameError::InvalidDeal(format!(
                "{} hands for {} players",
                dealt.hands.len(),
                self.players.len()
            )));
        }

        let owner_seat = self.index_of(self.owner).unwrap_or(0);
        let first = starting_seat(&dealt, &self.rules, owner_seat);
        for (player, hand) in self.players.iter_mut().zip(dealt.hands) {
            player.hand = hand;
            player.passed = false;
            player.finished = false;
        }
        self.started = true;
        self.first_trick = true;
        self.finish_order.clear();
        self.history.clear();
        self.trick = 0;
        self.reset_trick();
        self.turn_index = first;
        Ok(self.players[first].id)
    }

    pub fn play(&mut self, player: PlayerId, cards: &[Card]) -> Result<PlayOutcome, GameError> {
        let seat = self.ensure_turn(player)?;
        validate_card_count(cards)?;
        if let Some(prev) = &self.table_cards {
            if prev.len() != cards.len() {
                return Err(GameError::CardinalityMismatch {
                    expected: prev.len(),
                    actual: cards.len(),
                });
            }
        }
        if has_duplicates(cards) {
            return Err(GameError::CardsNotInHand(player));
        }
        let hand = evaluate(cards, &self.rules)?;
        validate_first_lead(
            &self.rules,
            self.first_trick && self.table_cards.is_none(),
            &hand.cards,
        )?;
        if let Some(prev) = &self.table_cards {
            if !hand.beats(prev) {
                return Err(GameError::DoesNotBeat);
            }
        }
        if !self.players[seat].take(&hand.cards) {
            return Err(GameError::CardsNotInHand(player));
        }

        let state = &mut self.players[seat];
        state.passed = false;
        let finished = state.hand.is_empty();
        if finished {
            state.finished = true;
            self.finish_order.push(player);
        }
        self.history.push(ActionRecord {
            player_id: player,
            trick: self.trick,
            action: Action::Play {
                cards: hand.cards.clone(),
            },
        });
        self.table_cards = Some(hand.clone());
        self.table_owner = Some(player);
        self.first_trick = false;

        self.next_turn();
        let game_over = self.settle_if_over();
        Ok(PlayOutcome {
            hand,
            finished,
            game_over,
            next_player: self.current_player(),
        })
    }

    pub fn pass(&mut self, player: PlayerId) -> Result<PassOutcome, GameError> {
        let seat = self.ensure_turn(player)?;
        if self.table_cards.is_none() {
            return Err(GameError::CannotPassOpenTable);
        }
        self.players[seat].passed = true;
        self.history.push(ActionRecord {
            player_id: player,
            trick: self.trick,
            action: Action::Pass,
        });

        let winner = self.table_owner;
        let contenders = self.trick_contenders();
        let trick_over = contenders > 0 && self.trick_passes() >= contenders;
        if trick_over {
            let owner_seat = winner.and_then(|id| self.index_of(id));
            self.reset_trick();
            self.trick += 1;
            if let Some(idx) = owner_seat {
                self.turn_index = idx;
            }
            self.ensure_turn_alive();
        } else {
            self.next_turn();
        }
        self.settle_if_over();
        Ok(PassOutcome {
            trick_won_by: if trick_over { winner } else { None },
            next_player: self.current_player(),
        })
    }

    fn ensure_lobby_owner(&self, requester: PlayerId) -> Result<(), GameError> {
        if requester != self.owner {
            return Err(GameError::NotTableOwner(requester));
        }
        if self.started {
            return Err(GameError::TableAlreadyStarted);
        }
        Ok(())
    }

    fn ensure_turn(&self, player: PlayerId) -> Result<usize, GameError> {
        if !self.started {
            return Err(GameError::NotStarted);
        }
        if self.is_game_over() {
            return Err(GameError::GameOver);
        }
        let seat = self.index_of(player).ok_or(GameError::NotSeated(player))?;
        if seat != self.turn_index {
            return Err(GameError::NotYourTurn {
                expected: self.players[self.turn_index].id,
                actual: player,
            });
        }
        Ok(seat)
    }

    fn index_of(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    fn unfinished_count(&self) -> usize {
        self.players.iter().filter(|p| !p.finished).count()
    }

    /// Unfinished players other than the trick owner.
    fn trick_contenders(&self) -> usize {
        self.players
            .iter()
            .filter(|p| !p.finished && Some(p.id) != self.table_owner)
            .count()
    }

    fn trick_passes(&self) -> usize {
        self.players
            .iter()
            .filter(|p| !p.finished && Some(p.id) != self.table_owner && p.passed)
            .count()
    }

    fn reset_trick(&mut self) {
        self.table_cards = None;
        self.table_owner = None;
        for p in &mut self.players {
            p.passed = false;
        }
    }

    /// Moves the turn to the next unfinished seat, wrapping.
    fn next_turn(&mut self) {
        let n = self.players.len();
        for _ in 0..n {
            self.turn_index = (self.turn_index + 1) % n;
            if !self.players[self.turn_index].finished {
                return;
            }
        }
    }

    /// Leaves the turn where it is unless that seat has finished.
    fn ensure_turn_alive(&mut self) {
        let n = self.players.len();
        for _ in 0..n {
            if !self.players[self.turn_index].finished {
                return;
            }
            self.turn_index = (self.turn_index + 1) % n;
        }
    }

    /// Ranks the last player once a single one is left; true when the game is over.
    fn settle_if_over(&mut self) -> bool {
        if !self.is_game_over() {
            return false;
        }
        if self.finish_order.len() < self.players.len() {
            if let Some(last) = self
                .players
                .iter()
                .find(|p| !p.finished && !self.finish_order.contains(&p.id))
            {
                self.finish_order.push(last.id);
            }
        }
        true
    }
}

/// A player holds each card once, so a play naming one twice can't be held.
fn has_duplicates(cards: &[Card]) -> bool {
    cards
        .iter()
        .enumerate()
        .any(|(i, c)| cards[i + 1..].contains(c))
}
