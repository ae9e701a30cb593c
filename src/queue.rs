//! The join/leave queue that fills up before a series starts.

use chrono::{DateTime, Utc};

use crate::error::MatchError;
use crate::store::PlayerId;

pub const MAX_QUEUE_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub player_id: PlayerId,
    pub joined_at: DateTime<Utc>,
}

/// Ordered queue of at most [`MAX_QUEUE_SIZE`] distinct players.
#[derive(Debug, Clone, Default)]
pub struct Queue {
    entries: Vec<QueueEntry>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_QUEUE_SIZE
    }

    pub fn contains(&self, player: &str) -> bool {
        self.entries.iter().any(|e| e.player_id == player)
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Player ids in join order.
    pub fn players(&self) -> Vec<PlayerId> {
        self.entries.iter().map(|e| e.player_id.clone()).collect()
    }

    /// Add a player; returns the new queue length.
    pub fn join(&mut self, player: &str, now: DateTime<Utc>) -> Result<usize, MatchError> {
        if self.contains(player) {
            return Err(MatchError::AlreadyQueued);
        }
        if self.is_full() {
            return Err(MatchError::QueueFull);
        }
        self.entries.push(QueueEntry {
            player_id: player.to_string(),
            joined_at: now,
        });
        Ok(self.entries.len())
    }

    /// Remove a player; returns how long they waited.
    pub fn leave(&mut self, player: &str, now: DateTime<Utc>) -> Result<chrono::Duration, MatchError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.player_id == player)
            .ok_or(MatchError::NotQueued)?;
        let entry = self.entries.remove(idx);
        Ok(now - entry.joined_at)
    }

    /// Empty the queue and hand back who was in it.
    pub fn reset(&mut self) -> Vec<PlayerId> {
        self.entries.drain(..).map(|e| e.player_id).collect()
    }
}

/// `"1h 05m"` / `"12m"` style wait time.
pub fn format_wait(wait: chrono::Duration) -> String {
    let minutes = wait.num_minutes().max(0);
    let (h, m) = (minutes / 60, minutes % 60);
    if h > 0 {
        format!("{}h {:02}m", h, m)
    } else {
        format!("{}m", m)
    }
}
