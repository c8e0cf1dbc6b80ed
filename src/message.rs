//! The volatile in-memory message buffer.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::participant::ParticipantId;

/// One decrypted application message as retained by [`MessageBuffer`].
#[derive(Clone, Debug)]
pub struct Message {
    /// The participant that sent this message.
    pub sender_id: ParticipantId,
    /// The per-sender sequence number it was sealed under.
    pub sequence: u64,
    /// The epoch it was sealed under.
    pub epoch: u32,
    /// Content-type tag (see [`crate::core::constants::content_type`]).
    pub content_type: u8,
    /// The decrypted, unpadded payload.
    pub payload: Vec<u8>,
    /// When this endpoint received and decrypted it.
    pub received_at: Instant,
}

impl Message {
    fn approx_size(&self) -> usize {
        self.payload.len() + 64
    }
}

/// A bounded, volatile buffer of recently received messages.
///
/// Bounded by both count and total bytes; oldest entries are evicted first.
/// Never persisted; entries older than the configured expiry are purged by
/// [`MessageBuffer::purge_expired`], which the session calls on a timer.
pub struct MessageBuffer {
    messages: VecDeque<Message>,
    total_bytes: usize,
    max_count: usize,
    max_bytes: usize,
    expiry: Duration,
}

impl MessageBuffer {
    /// Create a buffer with the given bounds.
    pub fn new(max_count: usize, max_bytes: usize, expiry: Duration) -> Self {
        Self {
            messages: VecDeque::new(),
            total_bytes: 0,
            max_count,
            max_bytes,
            expiry,
        }
    }

    /// Insert a message, evicting the oldest entries until both bounds are
    /// satisfied.
    pub fn insert(&mut self, message: Message) {
        self.total_bytes += message.approx_size();
        self.messages.push_back(message);
        self.enforce_bounds();
    }

    fn enforce_bounds(&mut self) {
        while self.messages.len() > self.max_count || self.total_bytes > self.max_bytes {
            let Some(evicted) = self.messages.pop_front() else {
                break;
            };
            self.total_bytes = self.total_bytes.saturating_sub(evicted.approx_size());
        }
    }

    /// Drop every message older than the configured expiry, relative to
    /// `now`.
    pub fn purge_expired(&mut self, now: Instant) {
        while let Some(front) = self.messages.front() {
            if now.duration_since(front.received_at) > self.expiry {
                let evicted = self.messages.pop_front().unwrap();
                self.total_bytes = self.total_bytes.saturating_sub(evicted.approx_size());
            } else {
                break;
            }
        }
    }

    /// Evict the older half of the buffer, used under host memory pressure.
    pub fn evict_older_half(&mut self) {
        let target = self.messages.len() / 2;
        for _ in 0..target {
            if let Some(evicted) = self.messages.pop_front() {
                self.total_bytes = self.total_bytes.saturating_sub(evicted.approx_size());
            }
        }
    }

    /// Current number of buffered messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Current total approximate byte usage.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Iterate over buffered messages, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(payload_len: usize) -> Message {
        Message {
            sender_id: ParticipantId::generate(),
            sequence: 1,
            epoch: 1,
            content_type: crate::core::constants::content_type::TEXT,
            payload: vec![0u8; payload_len],
            received_at: Instant::now(),
        }
    }

    #[test]
    fn evicts_oldest_when_count_exceeded() {
        let mut buf = MessageBuffer::new(2, usize::MAX, Duration::from_secs(60));
        buf.insert(msg(1));
        buf.insert(msg(1));
        buf.insert(msg(1));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn evicts_oldest_when_bytes_exceeded() {
        let mut buf = MessageBuffer::new(100, 200, Duration::from_secs(60));
        buf.insert(msg(100));
        buf.insert(msg(100));
        assert!(buf.total_bytes() <= 200 + 64);
        assert!(buf.len() <= 2);
    }

    #[test]
    fn purge_expired_drops_old_entries() {
        let mut buf = MessageBuffer::new(100, usize::MAX, Duration::from_millis(1));
        buf.insert(msg(1));
        std::thread::sleep(Duration::from_millis(5));
        buf.purge_expired(Instant::now());
        assert!(buf.is_empty());
    }

    #[test]
    fn evict_older_half_halves_buffer() {
        let mut buf = MessageBuffer::new(100, usize::MAX, Duration::from_secs(60));
        for _ in 0..10 {
            buf.insert(msg(1));
        }
        buf.evict_older_half();
        assert_eq!(buf.len(), 5);
    }
}
