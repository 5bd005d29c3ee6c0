//! Word-card game rules.
//!
//! Players take turns inserting cards into a shared table so that the
//! part-of-speech sequence stays grammatical. When every other player skips
//! in a row, the last player to place scores the table length; first to 20
//! points wins. Running out of hand cards or dropping to one player also
//! ends the game.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use wordcard_protocol::wire::{
    ActionType, CardTable, GameAction, GamePlayer as WireGamePlayer, GameState, WordCard,
};
use wordcard_protocol::ErrorCode;

use crate::game::{Game, GameCard, GamePlayer, RoomEvents};

/// Points needed to win.
pub const WINNING_SCORE: i32 = 20;
/// Cards dealt to each player at start and after every scoring reset.
pub const HAND_SIZE: usize = 8;

/// Directed adjacency relation over POS tags: which tag may follow which.
#[derive(Debug, Clone)]
pub struct Grammar {
    allowed_next: HashMap<&'static str, &'static [&'static str]>,
}

impl Grammar {
    /// The standard sentence grammar shipped with the game.
    pub fn standard() -> Self {
        let mut allowed_next: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        allowed_next.insert(
            "Adv-TIME-DATE",
            &[
                "Adv-TIME-PART",
                "Adv-LOC",
                "Adj",
                "NP-HUMAN-PRONOUN",
                "NP-HUMAN-KINSHIP",
                "NP-HUMAN-NAME",
                "Adv-MANNER",
                "V-EVENT",
            ][..],
        );
        allowed_next.insert(
            "Adv-TIME-PART",
            &[
                "Adv-LOC",
                "Adj",
                "NP-HUMAN-PRONOUN",
                "NP-HUMAN-KINSHIP",
                "NP-HUMAN-NAME",
                "Adv-MANNER",
                "V-EVENT",
            ][..],
        );
        allowed_next.insert("Adv-LOC", &["Adv-MANNER", "V-EVENT"][..]);
        allowed_next.insert(
            "Adj",
            &["Adj", "NP-HUMAN-PRONOUN", "NP-HUMAN-KINSHIP", "NP-HUMAN-NAME"][..],
        );
        allowed_next.insert(
            "NP-HUMAN-PRONOUN",
            &["NP-HUMAN-KINSHIP", "Adv-MANNER", "V-EVENT", "Adv-LOC"][..],
        );
        allowed_next.insert("NP-HUMAN-KINSHIP", &["Adv-MANNER", "V-EVENT", "Adv-LOC"][..]);
        allowed_next.insert("NP-HUMAN-NAME", &["Adv-MANNER", "V-EVENT", "Adv-LOC"][..]);
        allowed_next.insert("V-EVENT", &[][..]);
        allowed_next.insert("Adv-MANNER", &["V-EVENT"][..]);
        Self { allowed_next }
    }

    fn allows(&self, from: &str, to: &str) -> bool {
        self.allowed_next
            .get(from)
            .map(|next| next.contains(&to))
            .unwrap_or(false)
    }

    /// Whether a card with tag `pos` may be inserted at `index` of `seq`.
    /// Both neighbour constraints must hold for interior insertions.
    pub fn can_insert(&self, seq: &[String], pos: &str, index: usize) -> bool {
        if seq.is_empty() {
            return true;
        }
        if index == 0 {
            return self.allows(pos, &seq[0]);
        }
        if index >= seq.len() {
            return self.allows(&seq[seq.len() - 1], pos);
        }
        self.allows(&seq[index - 1], pos) && self.allows(pos, &seq[index])
    }
}

pub struct WordCardGame {
    players: Vec<GamePlayer>,
    deck: Vec<GameCard>,
    table: Vec<GameCard>,
    pos_seq: Vec<String>,
    current_turn: usize,
    /// Who placed most recently; credited when a skip round completes.
    last_scorer: u64,
    /// Consecutive skips since the last successful placement.
    skip_count: usize,
    grammar: Grammar,
}

impl WordCardGame {
    pub fn new(players: Vec<GamePlayer>, deck: Vec<GameCard>, grammar: Grammar) -> Self {
        Self {
            players,
            deck,
            table: Vec::new(),
            pos_seq: Vec::new(),
            current_turn: 0,
            last_scorer: 0,
            skip_count: 0,
            grammar,
        }
    }

    fn player_index(&self, player_id: u64) -> Option<usize> {
        self.players.iter().position(|p| p.id == player_id)
    }

    fn next_turn(&mut self) {
        if self.players.is_empty() {
            self.current_turn = 0;
        } else {
            self.current_turn = (self.current_turn + 1) % self.players.len();
        }
    }

    fn deal(&mut self) {
        for player in &mut self.players {
            player.hand.clear();
        }
        for _ in 0..HAND_SIZE {
            for player in &mut self.players {
                if self.deck.is_empty() {
                    return;
                }
                player.hand.push(self.deck.remove(0));
            }
        }
    }

    fn handle_place(&mut self, player_idx: usize, action: &GameAction) -> ErrorCode {
        let Some(place) = action.place_card() else {
            return ErrorCode::InvalidParam;
        };
        if player_idx != self.current_turn {
            return ErrorCode::NotYourTurn;
        }

        let card_idx = place.card_id;
        if card_idx < 0 || card_idx as usize >= self.players[player_idx].hand.len() {
            return ErrorCode::InvalidCard;
        }
        let card_idx = card_idx as usize;

        // Out-of-range targets append; negative targets prepend.
        let target = place.target_index.max(0) as usize;
        let target = target.min(self.table.len());

        let card = self.players[player_idx].hand[card_idx].clone();
        if !self.grammar.can_insert(&self.pos_seq, &card.pos, target) {
            return ErrorCode::InvalidOrder;
        }

        self.players[player_idx].hand.remove(card_idx);
        self.table.insert(target, card.clone());
        self.pos_seq.insert(target, card.pos);

        self.skip_count = 0;
        self.last_scorer = self.players[player_idx].id;
        self.next_turn();
        ErrorCode::Ok
    }

    fn handle_skip(&mut self, player_idx: usize) -> ErrorCode {
        if player_idx != self.current_turn {
            return ErrorCode::NotYourTurn;
        }
        // An empty table means any card is playable; skipping is not allowed.
        if self.table.is_empty() {
            return ErrorCode::InvalidOrder;
        }

        self.skip_count += 1;
        self.next_turn();

        if self.skip_count + 1 >= self.players.len() {
            tracing::debug!(
                skip_count = self.skip_count,
                last_scorer = self.last_scorer,
                "skip round complete, scoring"
            );
            self.score_and_reset();
        }
        ErrorCode::Ok
    }

    fn handle_surrender(
        &mut self,
        player_idx: usize,
        events: &mut dyn RoomEvents,
    ) -> ErrorCode {
        if player_idx != self.current_turn {
            return ErrorCode::NotYourTurn;
        }
        let player_id = self.players[player_idx].id;
        events.broadcast_action(GameAction {
            player_id,
            action_type: ActionType::Surrender as i32,
            timestamp: now_ms(),
            detail: None,
        });
        self.remove_player(player_id);
        ErrorCode::Ok
    }

    /// Credit the last scorer with the table length, then reset the round
    /// unless that credit won the game.
    fn score_and_reset(&mut self) {
        let gained = self.table.len() as i32;
        let mut won = false;
        if let Some(player) = self.players.iter_mut().find(|p| p.id == self.last_scorer) {
            player.score += gained;
            tracing::info!(
                player_id = player.id,
                gained,
                total = player.score,
                "round scored"
            );
            won = player.score >= WINNING_SCORE;
        }

        if won {
            // Leave the table in place; the game-over sweep picks it up.
            return;
        }

        self.table.clear();
        self.pos_seq.clear();
        self.skip_count = 0;
        if !self.players.is_empty() {
            self.current_turn = rand::thread_rng().gen_range(0..self.players.len());
        }
        self.deal();
    }
}

impl Game for WordCardGame {
    fn start(&mut self) {
        self.deal();
        if !self.players.is_empty() {
            self.current_turn = rand::thread_rng().gen_range(0..self.players.len());
        }
        self.skip_count = 0;
    }

    fn handle_action(
        &mut self,
        player_id: u64,
        action: &GameAction,
        events: &mut dyn RoomEvents,
    ) -> ErrorCode {
        let Some(player_idx) = self.player_index(player_id) else {
            return ErrorCode::InvalidUser;
        };

        match ActionType::try_from(action.action_type) {
            Ok(ActionType::PlaceCard) => self.handle_place(player_idx, action),
            Ok(ActionType::SkipTurn) => self.handle_skip(player_idx),
            Ok(ActionType::Surrender) => self.handle_surrender(player_idx, events),
            _ => ErrorCode::InvalidAction,
        }
    }

    fn state(&self) -> GameState {
        GameState {
            current_turn: self.current_turn as i32,
            players: self
                .players
                .iter()
                .map(|p| WireGamePlayer {
                    id: p.id,
                    name: p.name.clone(),
                    current_score: p.score,
                    cards: p
                        .hand
                        .iter()
                        .map(|c| WordCard {
                            word: c.word.clone(),
                            word_class: c.pos.clone(),
                        })
                        .collect(),
                })
                .collect(),
            card_table: Some(CardTable {
                cards: self
                    .table
                    .iter()
                    .map(|c| WordCard {
                        word: c.word.clone(),
                        word_class: c.pos.clone(),
                    })
                    .collect(),
                sentence: self.table.iter().map(|c| c.word.as_str()).collect(),
            }),
        }
    }

    fn is_game_over(&self) -> bool {
        if self.players.iter().any(|p| p.score >= WINNING_SCORE) {
            return true;
        }
        if self.players.iter().any(|p| p.hand.is_empty()) {
            return true;
        }
        // A running game cannot continue below two players.
        self.players.len() <= 1
    }

    fn remove_player(&mut self, player_id: u64) -> bool {
        let Some(idx) = self.player_index(player_id) else {
            return false;
        };
        self.players.remove(idx);

        if self.players.is_empty() {
            self.current_turn = 0;
        } else {
            if idx < self.current_turn {
                self.current_turn -= 1;
            }
            self.current_turn %= self.players.len();
        }
        tracing::info!(
            player_id,
            remaining = self.players.len(),
            current_turn = self.current_turn,
            "player removed from game"
        );
        true
    }

    fn end(&mut self) {
        // Reward settlement hooks in here once the economy needs them.
        tracing::info!("word-card game ended");
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wordcard_protocol::wire::{game_action, PlaceCardAction};

    fn card(word: &str, pos: &str) -> GameCard {
        GameCard {
            word: word.into(),
            pos: pos.into(),
        }
    }

    fn place(player_id: u64, card_id: i32, target_index: i32) -> GameAction {
        GameAction {
            player_id,
            action_type: ActionType::PlaceCard as i32,
            timestamp: 0,
            detail: Some(game_action::Detail::PlaceCard(PlaceCardAction {
                card_id,
                target_index,
            })),
        }
    }

    fn skip(player_id: u64) -> GameAction {
        GameAction {
            player_id,
            action_type: ActionType::SkipTurn as i32,
            timestamp: 0,
            detail: None,
        }
    }

    fn surrender(player_id: u64) -> GameAction {
        GameAction {
            player_id,
            action_type: ActionType::Surrender as i32,
            timestamp: 0,
            detail: None,
        }
    }

    /// Game with n players holding the given hands, no shuffle involved.
    fn game(hands: Vec<Vec<GameCard>>, deck: Vec<GameCard>) -> WordCardGame {
        let players = hands
            .into_iter()
            .enumerate()
            .map(|(i, hand)| {
                let mut p = GamePlayer::new(i as u64 + 1, format!("p{}", i + 1));
                p.hand = hand;
                p
            })
            .collect();
        let mut g = WordCardGame::new(players, deck, Grammar::standard());
        g.current_turn = 0;
        g
    }

    #[test]
    fn grammar_empty_sequence_accepts_anything() {
        let grammar = Grammar::standard();
        assert!(grammar.can_insert(&[], "V-EVENT", 0));
        assert!(grammar.can_insert(&[], "Adj", 5));
    }

    #[test]
    fn grammar_checks_prefix_suffix_and_interior() {
        let grammar = Grammar::standard();
        let seq = vec!["NP-HUMAN-PRONOUN".to_string(), "V-EVENT".to_string()];

        // Head insertion: new tag must permit the old head as successor.
        assert!(grammar.can_insert(&seq, "Adv-TIME-DATE", 0));
        assert!(!grammar.can_insert(&seq, "V-EVENT", 0));

        // Tail insertion: old tail must permit the new tag.
        assert!(!grammar.can_insert(&seq, "Adj", 2));

        // Interior insertion needs both neighbours to agree.
        assert!(grammar.can_insert(&seq, "Adv-MANNER", 1));
        assert!(!grammar.can_insert(&seq, "Adj", 1));
    }

    #[test]
    fn placement_inserts_and_advances_turn() {
        let mut g = game(
            vec![
                vec![card("I", "NP-HUMAN-PRONOUN"), card("ran", "V-EVENT")],
                vec![card("slowly", "Adv-MANNER")],
            ],
            vec![],
        );
        let mut sink = crate::game::EventSink::default();

        let ret = g.handle_action(1, &place(1, 0, 0), &mut sink);
        assert_eq!(ret, ErrorCode::Ok);
        assert_eq!(g.table.len(), 1);
        assert_eq!(g.pos_seq, vec!["NP-HUMAN-PRONOUN".to_string()]);
        assert_eq!(g.players[0].hand.len(), 1);
        assert_eq!(g.current_turn, 1);
        assert_eq!(g.last_scorer, 1);
        assert_eq!(g.skip_count, 0);
    }

    #[test]
    fn placement_off_turn_rejected_without_state_change() {
        let mut g = game(
            vec![
                vec![card("I", "NP-HUMAN-PRONOUN")],
                vec![card("ran", "V-EVENT")],
            ],
            vec![],
        );
        let mut sink = crate::game::EventSink::default();

        let ret = g.handle_action(2, &place(2, 0, 0), &mut sink);
        assert_eq!(ret, ErrorCode::NotYourTurn);
        assert!(g.table.is_empty());
        assert_eq!(g.current_turn, 0);
        assert_eq!(g.players[1].hand.len(), 1);
    }

    #[test]
    fn placement_with_bad_card_index_rejected() {
        let mut g = game(vec![vec![card("I", "NP-HUMAN-PRONOUN")], vec![]], vec![]);
        let mut sink = crate::game::EventSink::default();

        assert_eq!(
            g.handle_action(1, &place(1, 3, 0), &mut sink),
            ErrorCode::InvalidCard
        );
        assert_eq!(
            g.handle_action(1, &place(1, -1, 0), &mut sink),
            ErrorCode::InvalidCard
        );
    }

    #[test]
    fn placement_violating_grammar_rejected() {
        let mut g = game(
            vec![vec![card("ran", "V-EVENT"), card("jumped", "V-EVENT")]],
            vec![],
        );
        g.table = vec![card("ran", "V-EVENT")];
        g.pos_seq = vec!["V-EVENT".to_string()];
        let mut sink = crate::game::EventSink::default();

        // V-EVENT permits no successor.
        assert_eq!(
            g.handle_action(1, &place(1, 0, 1), &mut sink),
            ErrorCode::InvalidOrder
        );
        assert_eq!(g.table.len(), 1);
    }

    #[test]
    fn placement_target_beyond_table_appends() {
        let mut g = game(
            vec![vec![card("slowly", "Adv-MANNER"), card("ran", "V-EVENT")]],
            vec![],
        );
        g.table = vec![card("I", "NP-HUMAN-PRONOUN")];
        g.pos_seq = vec!["NP-HUMAN-PRONOUN".to_string()];
        let mut sink = crate::game::EventSink::default();

        let ret = g.handle_action(1, &place(1, 0, 99), &mut sink);
        assert_eq!(ret, ErrorCode::Ok);
        assert_eq!(g.table.len(), 2);
        assert_eq!(g.table[1].word, "slowly");
    }

    #[test]
    fn skip_on_empty_table_rejected() {
        let mut g = game(vec![vec![card("I", "NP-HUMAN-PRONOUN")], vec![]], vec![]);
        let mut sink = crate::game::EventSink::default();

        assert_eq!(g.handle_action(1, &skip(1), &mut sink), ErrorCode::InvalidOrder);
        assert_eq!(g.skip_count, 0);
    }

    #[test]
    fn all_skip_round_scores_last_placer_and_resets() {
        // Three players; player 3 placed last; the table holds 3 cards.
        let deck: Vec<GameCard> = (0..30).map(|i| card(&format!("w{i}"), "Adj")).collect();
        let mut g = game(vec![vec![], vec![], vec![]], deck);
        g.table = vec![
            card("I", "NP-HUMAN-PRONOUN"),
            card("slowly", "Adv-MANNER"),
            card("ran", "V-EVENT"),
        ];
        g.pos_seq = vec![
            "NP-HUMAN-PRONOUN".to_string(),
            "Adv-MANNER".to_string(),
            "V-EVENT".to_string(),
        ];
        g.last_scorer = 3;
        g.current_turn = 0;
        // Everyone needs a non-empty hand so the game-over sweep stays quiet.
        for p in &mut g.players {
            p.hand = vec![card("x", "Adj")];
        }
        let mut sink = crate::game::EventSink::default();

        assert_eq!(g.handle_action(1, &skip(1), &mut sink), ErrorCode::Ok);
        assert_eq!(g.skip_count, 1);
        assert!(!g.table.is_empty());

        // Second skip completes the round: everyone but the scorer skipped.
        assert_eq!(g.handle_action(2, &skip(2), &mut sink), ErrorCode::Ok);
        assert_eq!(g.players[2].score, 3);
        assert!(g.table.is_empty());
        assert!(g.pos_seq.is_empty());
        assert_eq!(g.skip_count, 0);
        // Hands were redealt from the deck.
        assert_eq!(g.players[0].hand.len(), HAND_SIZE);
        assert!(!g.is_game_over());
    }

    #[test]
    fn victory_through_scoring_ends_game_without_redeal() {
        let mut g = game(vec![vec![], vec![]], vec![]);
        g.table = vec![card("I", "NP-HUMAN-PRONOUN"), card("ran", "V-EVENT")];
        g.pos_seq = vec!["NP-HUMAN-PRONOUN".to_string(), "V-EVENT".to_string()];
        g.last_scorer = 1;
        g.players[0].score = 18;
        for p in &mut g.players {
            p.hand = vec![card("x", "Adj")];
        }
        g.current_turn = 1;
        let mut sink = crate::game::EventSink::default();

        assert_eq!(g.handle_action(2, &skip(2), &mut sink), ErrorCode::Ok);
        assert_eq!(g.players[0].score, 20);
        // Table stays; the game is over.
        assert_eq!(g.table.len(), 2);
        assert!(g.is_game_over());
    }

    #[test]
    fn empty_hand_ends_game() {
        let mut g = game(
            vec![vec![card("I", "NP-HUMAN-PRONOUN")], vec![card("x", "Adj")]],
            vec![],
        );
        let mut sink = crate::game::EventSink::default();

        assert_eq!(g.handle_action(1, &place(1, 0, 0), &mut sink), ErrorCode::Ok);
        assert!(g.players[0].hand.is_empty());
        assert!(g.is_game_over());
    }

    #[test]
    fn surrender_broadcasts_and_removes_player() {
        let mut g = game(
            vec![
                vec![card("a", "Adj")],
                vec![card("b", "Adj")],
                vec![card("c", "Adj")],
            ],
            vec![],
        );
        let mut sink = crate::game::EventSink::default();

        // Off turn first.
        assert_eq!(
            g.handle_action(2, &surrender(2), &mut sink),
            ErrorCode::NotYourTurn
        );

        assert_eq!(g.handle_action(1, &surrender(1), &mut sink), ErrorCode::Ok);
        assert_eq!(sink.actions.len(), 1);
        assert_eq!(sink.actions[0].player_id, 1);
        assert_eq!(g.players.len(), 2);
        // The next player inherited the vacated slot.
        assert_eq!(g.current_turn, 0);
        assert_eq!(g.players[0].id, 2);
    }

    #[test]
    fn removing_earlier_player_shifts_turn_index() {
        let mut g = game(
            vec![
                vec![card("a", "Adj")],
                vec![card("b", "Adj")],
                vec![card("c", "Adj")],
            ],
            vec![],
        );
        g.current_turn = 2;
        assert!(g.remove_player(1));
        assert_eq!(g.current_turn, 1);
        assert_eq!(g.players[g.current_turn].id, 3);
    }

    #[test]
    fn single_player_ends_running_game() {
        let mut g = game(vec![vec![card("a", "Adj")], vec![card("b", "Adj")]], vec![]);
        assert!(!g.is_game_over());
        g.remove_player(2);
        assert!(g.is_game_over());
    }

    #[test]
    fn unknown_player_rejected() {
        let mut g = game(vec![vec![card("a", "Adj")]], vec![]);
        let mut sink = crate::game::EventSink::default();
        assert_eq!(
            g.handle_action(42, &skip(42), &mut sink),
            ErrorCode::InvalidUser
        );
    }

    #[test]
    fn state_snapshot_carries_sentence() {
        let mut g = game(vec![vec![card("a", "Adj")]], vec![]);
        g.table = vec![card("I", "NP-HUMAN-PRONOUN"), card("ran", "V-EVENT")];
        g.pos_seq = vec!["NP-HUMAN-PRONOUN".to_string(), "V-EVENT".to_string()];

        let state = g.state();
        let table = state.card_table.unwrap();
        assert_eq!(table.sentence, "Iran");
        assert_eq!(table.cards.len(), 2);
        assert_eq!(state.players[0].cards.len(), 1);
    }

    #[test]
    fn start_deals_and_picks_a_turn_in_range() {
        let deck: Vec<GameCard> = (0..40).map(|i| card(&format!("w{i}"), "Adj")).collect();
        let mut g = game(vec![vec![], vec![], vec![]], deck);
        g.start();
        for p in &g.players {
            assert_eq!(p.hand.len(), HAND_SIZE);
        }
        assert!(g.current_turn < g.players.len());
        assert_eq!(g.deck.len(), 40 - 3 * HAND_SIZE);
    }
}
