use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::cards::{full_deck, Card};

#[derive(Debug)]
pub struct Deck {
    cards: Vec<Card>,
    position: usize,
    seed: Option<u64>,
    rng: ChaCha20Rng,
}

impl Deck {
    /// A deck whose shuffles are reproducible from `seed`.
    pub fn new_with_seed(seed: u64) -> Self {
        Self {
            cards: full_deck(),
            position: 0,
            seed: Some(seed),
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// A deck seeded from the thread RNG.
    pub fn new() -> Self {
        let mut deck = Self::new_with_seed(rand::random());
        deck.seed = None;
        deck
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn shuffle(&mut self) {
        self.cards = full_deck();
        self.cards.shuffle(&mut self.rng);
        self.position = 0;
    }

    pub fn deal_card(&mut self) -> Option<Card> {
        let c = self.cards.get(self.position).copied()?;
        self.position += 1;
        Some(c)
    }

    pub fn deal_n(&mut self, n: usize) -> Vec<Card> {
        (0..n).filter_map(|_| self.deal_card()).collect()
    }

    /// Cards not yet dealt, leaving the deck exhausted.
    pub fn take_remaining(&mut self) -> Vec<Card> {
        let rest = self.cards[self.position..].to_vec();
        self.position = self.cards.len();
        rest
    }

    pub fn remaining(&self) -> usize {
        self.cards.len().saturating_sub(self.position)
    }

    pub(crate) fn rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.rng
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}
