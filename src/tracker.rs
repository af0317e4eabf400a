//! The most recently observed game snapshot, shared by every agent.
//!
//! Updates are whole-value swaps: a snapshot is never merged into the
//! previous one, and there is no ordering check because the protocol carries
//! no sequence numbers. A snapshot reordered by the transport silently
//! overwrites a newer one.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::watch;

use crate::messages::GameSnapshot;

/// Read-shared, replace-only game state cell.
///
/// Cloning a tracker yields another handle to the same cell.
#[derive(Clone, Debug)]
pub struct GameStateTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug)]
struct TrackerInner {
    snapshot: watch::Sender<Option<Arc<GameSnapshot>>>,
    /// Hand results seen, per agent name.
    hand_results: watch::Sender<BTreeMap<String, u64>>,
    updates: AtomicU64,
}

impl Default for GameStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl GameStateTracker {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(None);
        let (hand_results, _) = watch::channel(BTreeMap::new());
        Self {
            inner: Arc::new(TrackerInner {
                snapshot,
                hand_results,
                updates: AtomicU64::new(0),
            }),
        }
    }

    /// Replace the current snapshot unconditionally.
    pub fn update(&self, snapshot: GameSnapshot) {
        self.inner.snapshot.send_replace(Some(Arc::new(snapshot)));
        self.inner.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// The latest snapshot, or `None` before the first one arrives.
    pub fn current(&self) -> Option<Arc<GameSnapshot>> {
        self.inner.snapshot.borrow().clone()
    }

    /// Number of snapshots applied so far.
    pub fn update_count(&self) -> u64 {
        self.inner.updates.load(Ordering::Relaxed)
    }

    /// Wait until the current snapshot satisfies `predicate`.
    ///
    /// Checks the snapshot already present before waiting. Callers bound the
    /// wait themselves.
    pub async fn wait_for_snapshot<F>(&self, mut predicate: F) -> Arc<GameSnapshot>
    where
        F: FnMut(&GameSnapshot) -> bool,
    {
        let mut rx = self.inner.snapshot.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(snapshot) = current.filter(|snapshot| predicate(snapshot)) {
                return snapshot;
            }
            // The sender lives in `self`, so this never errors while we wait.
            let _ = rx.changed().await;
        }
    }

    /// Count one hand-result notification seen by `agent`.
    pub fn record_hand_result(&self, agent: &str) {
        self.inner.hand_results.send_modify(|counts| {
            *counts.entry(agent.to_string()).or_default() += 1;
        });
    }

    /// Hands concluded, as seen by the best-informed agent.
    ///
    /// Every seated connection receives the same broadcast, so summing across
    /// agents would count one hand several times.
    pub fn hands_observed(&self) -> u64 {
        max_count(&self.inner.hand_results.borrow())
    }

    /// Wait until at least `count` hands have been observed.
    pub async fn wait_for_hands(&self, count: u64) -> u64 {
        let mut rx = self.inner.hand_results.subscribe();
        loop {
            let seen = max_count(&rx.borrow_and_update());
            if seen >= count {
                return seen;
            }
            let _ = rx.changed().await;
        }
    }
}

fn max_count(counts: &BTreeMap<String, u64>) -> u64 {
    counts.values().copied().max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::PlayerInfo;
    use std::time::Duration;
    use tokio::time::timeout;

    fn snapshot_with_seats(seats: &[u8], pot: f64) -> GameSnapshot {
        GameSnapshot {
            players: seats
                .iter()
                .map(|seat| {
                    (
                        *seat,
                        PlayerInfo {
                            name: format!("player{seat}"),
                            chips: 1000.0,
                            ..PlayerInfo::default()
                        },
                    )
                })
                .collect(),
            pot,
            ..GameSnapshot::default()
        }
    }

    #[test]
    fn test_empty_before_first_update() {
        let tracker = GameStateTracker::new();
        assert!(tracker.current().is_none());
        assert_eq!(tracker.update_count(), 0);
    }

    #[test]
    fn test_update_replaces_rather_than_merges() {
        let tracker = GameStateTracker::new();
        tracker.update(snapshot_with_seats(&[1, 2, 3], 60.0));
        tracker.update(snapshot_with_seats(&[2], 0.0));

        let current = tracker.current().unwrap();
        assert_eq!(*current, snapshot_with_seats(&[2], 0.0));
        assert!(!current.players.contains_key(&1));
        assert_eq!(tracker.update_count(), 2);
    }

    #[test]
    fn test_clones_share_the_cell() {
        let tracker = GameStateTracker::new();
        let other = tracker.clone();
        other.update(snapshot_with_seats(&[4], 10.0));
        assert_eq!(tracker.current().unwrap().pot, 10.0);
    }

    #[test]
    fn test_hands_observed_takes_max_across_agents() {
        let tracker = GameStateTracker::new();
        tracker.record_hand_result("Alice");
        tracker.record_hand_result("Bob");
        tracker.record_hand_result("Alice");
        assert_eq!(tracker.hands_observed(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_snapshot_sees_later_update() {
        let tracker = GameStateTracker::new();
        let writer = tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.update(snapshot_with_seats(&[1], 0.0));
            writer.update(snapshot_with_seats(&[1, 2], 0.0));
        });

        let snapshot = timeout(
            Duration::from_secs(2),
            tracker.wait_for_snapshot(|s| s.has_seats(&[1, 2])),
        )
        .await
        .unwrap();
        assert_eq!(snapshot.players.len(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_snapshot_returns_existing_match() {
        let tracker = GameStateTracker::new();
        tracker.update(snapshot_with_seats(&[5], 0.0));
        let snapshot = timeout(
            Duration::from_millis(100),
            tracker.wait_for_snapshot(|s| s.has_seats(&[5])),
        )
        .await
        .unwrap();
        assert!(snapshot.has_seats(&[5]));
    }

    #[tokio::test]
    async fn test_wait_for_hands_times_out_when_short() {
        let tracker = GameStateTracker::new();
        tracker.record_hand_result("Alice");
        let result = timeout(Duration::from_millis(50), tracker.wait_for_hands(2)).await;
        assert!(result.is_err());
        assert_eq!(
            timeout(Duration::from_millis(50), tracker.wait_for_hands(1))
                .await
                .unwrap(),
            1
        );
    }
}
