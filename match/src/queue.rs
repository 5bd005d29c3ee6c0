//! Matchmaking queue state.
//!
//! Pure data: one entry per user, timestamps for timeout eviction, grouping
//! for the pair pass. Concurrency is the caller's problem: the service
//! wraps the queue in a single mutex and computes everything inside one
//! locked region.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use wordcard_protocol::rpc::PlayerInitData;

/// Players per formed match.
pub const MATCH_GROUP_SIZE: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEntry {
    pub player: PlayerInitData,
    /// Unix seconds.
    pub enqueued_at: i64,
    pub last_activity: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MatchQueue {
    entries: HashMap<u64, MatchEntry>,
}

impl MatchQueue {
    /// Add a player. Returns false when the player was already queued; the
    /// caller treats that as success (idempotent enqueue).
    pub fn enqueue(&mut self, player: PlayerInitData, now: i64) -> bool {
        if self.entries.contains_key(&player.player_id) {
            return false;
        }
        self.entries.insert(
            player.player_id,
            MatchEntry {
                player,
                enqueued_at: now,
                last_activity: now,
            },
        );
        true
    }

    /// Remove a player. Double-cancel is a no-op.
    pub fn cancel(&mut self, player_id: u64) -> bool {
        self.entries.remove(&player_id).is_some()
    }

    pub fn contains(&self, player_id: u64) -> bool {
        self.entries.contains_key(&player_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return entries whose last activity is older than the
    /// timeout.
    pub fn evict_timed_out(&mut self, now: i64, timeout_secs: i64) -> Vec<MatchEntry> {
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, e)| now - e.last_activity > timeout_secs)
            .map(|(&uid, _)| uid)
            .collect();
        expired
            .into_iter()
            .filter_map(|uid| self.entries.remove(&uid))
            .collect()
    }

    /// Remove and return full groups of `size` waiting players, oldest
    /// first. A leftover below group size stays queued.
    pub fn take_groups(&mut self, size: usize) -> Vec<Vec<MatchEntry>> {
        let mut waiting: Vec<u64> = self.entries.keys().copied().collect();
        waiting.sort_by_key(|uid| (self.entries[uid].enqueued_at, *uid));

        let mut groups = Vec::new();
        for chunk in waiting.chunks(size) {
            if chunk.len() < size {
                break;
            }
            let group: Vec<MatchEntry> = chunk
                .iter()
                .filter_map(|uid| self.entries.remove(uid))
                .collect();
            groups.push(group);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: u64) -> PlayerInitData {
        PlayerInitData {
            player_id: id,
            player_name: format!("p{id}"),
        }
    }

    #[test]
    fn enqueue_is_idempotent() {
        let mut q = MatchQueue::default();
        assert!(q.enqueue(player(1), 100));
        assert!(!q.enqueue(player(1), 200));
        assert_eq!(q.len(), 1);
        // The original entry's timestamps survive the duplicate.
        assert!(q.evict_timed_out(200, 1000).is_empty());
    }

    #[test]
    fn double_cancel_is_noop() {
        let mut q = MatchQueue::default();
        q.enqueue(player(1), 100);
        assert!(q.cancel(1));
        assert!(!q.cancel(1));
        assert!(q.is_empty());
    }

    #[test]
    fn timeout_eviction_removes_only_stale_entries() {
        let mut q = MatchQueue::default();
        q.enqueue(player(1), 100);
        q.enqueue(player(2), 150);

        let evicted = q.evict_timed_out(181, 30);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].player.player_id, 1);
        assert!(q.contains(2));
    }

    #[test]
    fn pairing_is_fifo_and_leaves_the_odd_player() {
        let mut q = MatchQueue::default();
        q.enqueue(player(3), 300);
        q.enqueue(player(1), 100);
        q.enqueue(player(2), 200);

        let groups = q.take_groups(MATCH_GROUP_SIZE);
        assert_eq!(groups.len(), 1);
        let ids: Vec<u64> = groups[0].iter().map(|e| e.player.player_id).collect();
        assert_eq!(ids, vec![1, 2]);

        // The newest player keeps waiting.
        assert_eq!(q.len(), 1);
        assert!(q.contains(3));
    }

    #[test]
    fn four_players_form_two_groups() {
        let mut q = MatchQueue::default();
        for id in 1..=4 {
            q.enqueue(player(id), id as i64);
        }
        let groups = q.take_groups(MATCH_GROUP_SIZE);
        assert_eq!(groups.len(), 2);
        assert!(q.is_empty());
    }

    #[test]
    fn snapshot_roundtrip() {
        let mut q = MatchQueue::default();
        q.enqueue(player(1), 100);
        q.enqueue(player(2), 200);

        let raw = serde_json::to_string(&q).unwrap();
        let restored: MatchQueue = serde_json::from_str(&raw).unwrap();
        assert_eq!(restored.len(), 2);
        assert!(restored.contains(1));
        assert!(restored.contains(2));
    }
}
