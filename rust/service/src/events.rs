use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use bigtwo_engine::cards::Card;
use bigtwo_engine::hand::HandType;
use bigtwo_engine::rules::Ruleset;
use bigtwo_engine::table::PlayerId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::session::TableId;

// Bounded so a stalled subscriber cannot grow memory; it is dropped instead.
const EVENT_CHANNEL_BUFFER: usize = 256;

pub type EventSender = mpsc::Sender<TableEvent>;
pub type EventReceiver = mpsc::Receiver<TableEvent>;

/// Receiver half of a table subscription; unsubscribes on drop.
pub struct EventSubscription {
    bus: EventBus,
    table_id: TableId,
    subscriber_id: usize,
    pub receiver: EventReceiver,
}

impl EventSubscription {
    pub fn receiver(&mut self) -> &mut EventReceiver {
        &mut self.receiver
    }

    /// Events already queued, without waiting.
    pub fn drain(&mut self) -> Vec<TableEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.table_id, self.subscriber_id);
    }
}

/// Fan-out of [`TableEvent`]s to per-table subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Debug, Default)]
struct EventBusInner {
    subscribers: RwLock<HashMap<TableId, Vec<(usize, EventSender)>>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, table_id: TableId) -> EventSubscription {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table_id.clone())
            .or_default()
            .push((id, tx));

        tracing::debug!(table_id = %table_id, subscriber_id = id, "subscribed to table events");

        EventSubscription {
            bus: self.clone(),
            table_id,
            subscriber_id: id,
            receiver: rx,
        }
    }

    pub fn broadcast(&self, table_id: &TableId, event: TableEvent) {
        tracing::debug!(table_id = %table_id, event = event.kind(), "broadcasting table event");

        let subscribers = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table_id)
            .cloned();
        let Some(list) = subscribers else {
            return;
        };

        let mut failed = Vec::new();
        for (id, sender) in list {
            if let Err(err) = sender.try_send(event.clone()) {
                tracing::warn!(
                    table_id = %table_id,
                    subscriber_id = id,
                    error = %err,
                    "dropping table event subscriber"
                );
                failed.push(id);
            }
        }
        if !failed.is_empty() {
            self.remove_subscribers(table_id, &failed);
        }
    }

    pub fn unsubscribe(&self, table_id: &TableId, subscriber_id: usize) {
        self.remove_subscribers(table_id, &[subscriber_id]);
    }

    /// Forgets every subscriber of a torn-down table.
    pub fn drop_table(&self, table_id: &TableId) {
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(table_id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    fn remove_subscribers(&self, table_id: &TableId, ids: &[usize]) {
        let mut guard = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = guard.get_mut(table_id) {
            list.retain(|(id, _)| !ids.contains(id));
            if list.is_empty() {
                guard.remove(table_id);
            }
        }
    }
}

/// Observable state changes of a table, one per serialized action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TableEvent {
    TableCreated {
        table_id: TableId,
        owner: PlayerId,
    },
    PlayerJoined {
        table_id: TableId,
        player_id: PlayerId,
    },
    RulesChanged {
        table_id: TableId,
        rules: Ruleset,
    },
    StakeChanged {
        table_id: TableId,
        stake: u64,
    },
    GameStarted {
        table_id: TableId,
        players: Vec<PlayerId>,
        first_player: PlayerId,
        stake: u64,
    },
    CardsPlayed {
        table_id: TableId,
        player_id: PlayerId,
        cards: Vec<Card>,
        hand_type: HandType,
        next_player: Option<PlayerId>,
    },
    Passed {
        table_id: TableId,
        player_id: PlayerId,
        next_player: Option<PlayerId>,
    },
    TrickWon {
        table_id: TableId,
        player_id: PlayerId,
    },
    PlayerFinished {
        table_id: TableId,
        player_id: PlayerId,
        place: usize,
    },
    PayoutCompleted {
        table_id: TableId,
        winner: PlayerId,
        amount: u64,
    },
    PayoutFailed {
        table_id: TableId,
        winner: PlayerId,
        amount: u64,
        reason: String,
    },
    GameEnded {
        table_id: TableId,
        finish_order: Vec<PlayerId>,
    },
    TableCancelled {
        table_id: TableId,
        refunded: Vec<PlayerId>,
        refund_failed: Vec<PlayerId>,
    },
}

impl TableEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TableEvent::TableCreated { .. } => "table_created",
            TableEvent::PlayerJoined { .. } => "player_joined",
            TableEvent::RulesChanged { .. } => "rules_changed",
            TableEvent::StakeChanged { .. } => "stake_changed",
            TableEvent::GameStarted { .. } => "game_started",
            TableEvent::CardsPlayed { .. } => "cards_played",
            TableEvent::Passed { .. } => "passed",
            TableEvent::TrickWon { .. } => "trick_won",
            TableEvent::PlayerFinished { .. } => "player_finished",
            TableEvent::PayoutCompleted { .. } => "payout_completed",
            TableEvent::PayoutFailed { .. } => "payout_failed",
            TableEvent::GameEnded { .. } => "game_ended",
            TableEvent::TableCancelled { .. } => "table_cancelled",
        }
    }
}
