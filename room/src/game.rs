//! Game abstraction hosted by a room actor.
//!
//! A room owns at most one running game. The game never holds a reference
//! back to its room; room-bound effects (action echoes) are pushed through
//! the [`RoomEvents`] capability passed into each call, and the actor drains
//! them after the call returns.

use rand::seq::SliceRandom;
use serde::Deserialize;

use wordcard_protocol::wire::{GameAction, GameState};
use wordcard_protocol::ErrorCode;

use crate::wordcard::{Grammar, WordCardGame};

/// Word table shipped with the service; `WORD_TABLE_PATH` overrides it.
pub const DEFAULT_WORD_TABLE: &str = include_str!("../data/word_cards.json");

/// A card as dealt and played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameCard {
    pub word: String,
    pub pos: String,
}

/// A seated player inside a game.
#[derive(Debug, Clone)]
pub struct GamePlayer {
    pub id: u64,
    pub name: String,
    pub hand: Vec<GameCard>,
    pub score: i32,
}

impl GamePlayer {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            hand: Vec::new(),
            score: 0,
        }
    }
}

/// Room-bound effects emitted by a game while it handles a call.
pub trait RoomEvents {
    /// Echo an action to every member of the room.
    fn broadcast_action(&mut self, action: GameAction);
}

/// Buffering [`RoomEvents`] collector; the actor drains it after each call.
#[derive(Default)]
pub struct EventSink {
    pub actions: Vec<GameAction>,
}

impl RoomEvents for EventSink {
    fn broadcast_action(&mut self, action: GameAction) {
        self.actions.push(action);
    }
}

/// Behaviour a room expects from any game variant.
pub trait Game: Send + Sync {
    /// Deal and pick the opening turn. Called once, right after creation.
    fn start(&mut self);

    /// Apply one player action. `Ok` means state changed and should be
    /// re-broadcast.
    fn handle_action(
        &mut self,
        player_id: u64,
        action: &GameAction,
        events: &mut dyn RoomEvents,
    ) -> ErrorCode;

    /// Public snapshot for broadcast.
    fn state(&self) -> GameState;

    fn is_game_over(&self) -> bool;

    /// Drop a player mid-game, repairing the turn index. Returns false when
    /// the player was not part of the game.
    fn remove_player(&mut self, player_id: u64) -> bool;

    /// End-of-game hook, run once before the room broadcasts the final
    /// standings.
    fn end(&mut self);
}

/// Supported game variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameType {
    WordCard,
}

/// Immutable rule inputs shared by every room: the word table and the POS
/// grammar.
pub struct GameRules {
    pub deck_template: Vec<GameCard>,
    pub deck_copies: usize,
    pub grammar: Grammar,
}

/// Raw entry of the word table file.
#[derive(Debug, Deserialize)]
struct WordEntry {
    word: String,
    pos: String,
}

impl GameRules {
    /// Parse a word table (JSON array of `{word, pos}`).
    pub fn from_word_table(json: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<WordEntry> = serde_json::from_str(json)?;
        Ok(Self {
            deck_template: entries
                .into_iter()
                .map(|e| GameCard {
                    word: e.word,
                    pos: e.pos,
                })
                .collect(),
            deck_copies: 4,
            grammar: Grammar::standard(),
        })
    }

    /// Expand the template into a shuffled deck.
    pub fn build_deck(&self) -> Vec<GameCard> {
        let mut deck = Vec::with_capacity(self.deck_template.len() * self.deck_copies);
        for card in &self.deck_template {
            for _ in 0..self.deck_copies {
                deck.push(card.clone());
            }
        }
        deck.shuffle(&mut rand::thread_rng());
        deck
    }
}

/// Instantiate a game of the given type for the given seats.
pub fn create_game(game_type: GameType, rules: &GameRules, players: Vec<GamePlayer>) -> Box<dyn Game> {
    match game_type {
        GameType::WordCard => Box::new(WordCardGame::new(
            players,
            rules.build_deck(),
            rules.grammar.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_table_parses_and_expands() {
        let rules = GameRules::from_word_table(
            r#"[{"word":"yesterday","pos":"Adv-TIME-DATE"},{"word":"ran","pos":"V-EVENT"}]"#,
        )
        .unwrap();
        assert_eq!(rules.deck_template.len(), 2);

        let deck = rules.build_deck();
        assert_eq!(deck.len(), 8);
        assert_eq!(deck.iter().filter(|c| c.word == "ran").count(), 4);
    }
}
