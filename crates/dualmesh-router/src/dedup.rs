//! Duplicate suppression for packets heard over both links
//!
//! The same logical packet can reach the bridge more than once: relayed
//! through both radios, repeated by the mesh, or our own broadcast echoing
//! back. Each packet is reduced to a [`Fingerprint`] and remembered for a
//! short window.
//!
//! # Window semantics
//!
//! The window is insertion ordered. Lookups never refresh an entry, so the
//! least recently *inserted* fingerprint is always the next to expire, and
//! the capacity bound evicts in the same order. The first occurrence wins;
//! later ones inside the window are dropped whichever link delivered them.

use dualmesh_core::{NodeId, OutboundMessage, Packet, PayloadKind};
use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Bytes of canonical payload mixed into a fingerprint
pub const PAYLOAD_PREFIX_LEN: usize = 64;

/// 128-bit digest identifying a logical packet
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// Digest of sender, destination, kind and payload prefix
    pub fn compute(
        sender: NodeId,
        destination: NodeId,
        kind: PayloadKind,
        payload: &[u8],
    ) -> Self {
        let prefix = &payload[..payload.len().min(PAYLOAD_PREFIX_LEN)];

        let mut hasher = blake3::Hasher::new();
        hasher.update(&sender.as_u32().to_be_bytes());
        hasher.update(&destination.as_u32().to_be_bytes());
        hasher.update(&[kind.tag()]);
        hasher.update(prefix);

        let mut digest = [0u8; 16];
        digest.copy_from_slice(&hasher.finalize().as_bytes()[..16]);
        Self(digest)
    }

    /// Fingerprint of a received packet
    pub fn of_packet(packet: &Packet) -> Self {
        Self::compute(
            packet.sender(),
            packet.destination(),
            packet.kind(),
            &packet.payload().canonical_bytes(),
        )
    }

    /// Fingerprint our own message will have when it is heard again
    pub fn of_outbound(message: &OutboundMessage) -> Self {
        let payload = message.payload();
        Self::compute(
            message.from,
            message.destination,
            payload.kind(),
            &payload.canonical_bytes(),
        )
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

/// Dedup statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupStats {
    /// Fingerprints checked
    pub checked: u64,
    /// Checks that found a live fingerprint
    pub duplicates: u64,
    /// Entries aged out of the window
    pub expired: u64,
    /// Entries pushed out by the capacity bound
    pub capacity_evictions: u64,
    /// Outbound messages fingerprinted
    pub outbound_recorded: u64,
}

impl DedupStats {
    /// Share of checks that were duplicates (0.0 to 1.0)
    pub fn duplicate_rate(&self) -> f64 {
        if self.checked == 0 {
            0.0
        } else {
            self.duplicates as f64 / self.checked as f64
        }
    }
}

/// Time-windowed fingerprint set
///
/// Not internally synchronized; the router keeps it behind its own lock.
#[derive(Debug)]
pub struct DedupEngine {
    seen: LruCache<Fingerprint, Instant>,
    window: Duration,
    stats: DedupStats,
}

impl DedupEngine {
    /// Create an engine with the given window and capacity
    pub fn new(window: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: LruCache::new(capacity),
            window,
            stats: DedupStats::default(),
        }
    }

    /// Check a fingerprint now
    ///
    /// Returns `true` the first time a fingerprint is seen inside the
    /// window and records it; `false` for every repeat.
    pub fn should_process(&mut self, fingerprint: Fingerprint) -> bool {
        self.should_process_at(fingerprint, Instant::now())
    }

    /// Check a fingerprint at an explicit instant
    pub fn should_process_at(&mut self, fingerprint: Fingerprint, now: Instant) -> bool {
        self.expire(now);
        self.stats.checked += 1;

        if self.seen.contains(&fingerprint) {
            self.stats.duplicates += 1;
            trace!(fingerprint = %fingerprint, "Duplicate inside window");
            return false;
        }

        self.insert(fingerprint, now);
        true
    }

    /// Remember our own outgoing message so its echo is recognized
    pub fn record_outbound(&mut self, message: &OutboundMessage) {
        self.record_outbound_at(message, Instant::now());
    }

    /// Remember an outgoing message at an explicit instant
    pub fn record_outbound_at(&mut self, message: &OutboundMessage, now: Instant) {
        self.expire(now);
        let fingerprint = Fingerprint::of_outbound(message);
        // Re-sending the same text restarts its window
        self.seen.pop(&fingerprint);
        self.insert(fingerprint, now);
        self.stats.outbound_recorded += 1;
        debug!(
            fingerprint = %fingerprint,
            network = %message.network,
            "Recorded outbound fingerprint"
        );
    }

    /// Drop a fingerprint before its window ends
    ///
    /// Used when an outbound message recorded ahead of its send never left.
    pub fn forget(&mut self, fingerprint: &Fingerprint) -> bool {
        self.seen.pop(fingerprint).is_some()
    }

    fn insert(&mut self, fingerprint: Fingerprint, now: Instant) {
        if self.seen.push(fingerprint, now).is_some() {
            self.stats.capacity_evictions += 1;
        }
    }

    /// Drop every entry whose age reached the window
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        while let Some((_, first_seen)) = self.seen.peek_lru() {
            if now.saturating_duration_since(*first_seen) < self.window {
                break;
            }
            self.seen.pop_lru();
            expired += 1;
        }
        self.stats.expired += expired as u64;
        expired
    }

    /// Whether a fingerprint is currently inside the window
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Number of live fingerprints
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if no fingerprint is remembered
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Configured window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Counters
    pub fn stats(&self) -> DedupStats {
        self.stats.clone()
    }
}

impl Default for DedupEngine {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualmesh_core::{NetworkSource, Payload, BROADCAST};

    fn fp(sender: u32, text: &str) -> Fingerprint {
        Fingerprint::compute(NodeId(sender), BROADCAST, PayloadKind::Text, text.as_bytes())
    }

    #[test]
    fn test_fingerprint_fields() {
        let base = fp(0xAA, "hello");
        assert_eq!(base, fp(0xAA, "hello"));
        assert_ne!(base, fp(0xAB, "hello"));
        assert_ne!(base, fp(0xAA, "hello!"));
        assert_ne!(
            base,
            Fingerprint::compute(NodeId(0xAA), NodeId(1), PayloadKind::Text, b"hello")
        );
        assert_ne!(
            base,
            Fingerprint::compute(NodeId(0xAA), BROADCAST, PayloadKind::Unknown, b"hello")
        );
    }

    #[test]
    fn test_fingerprint_uses_prefix_only() {
        let a = "x".repeat(PAYLOAD_PREFIX_LEN) + "tail one";
        let b = "x".repeat(PAYLOAD_PREFIX_LEN) + "tail two";
        assert_eq!(fp(1, &a), fp(1, &b));
    }

    #[test]
    fn test_fingerprint_ignores_network_and_link() {
        let hi = || Payload::Text("hi".into());
        let on_a = Packet::new(NetworkSource::NetA, NodeId(5), BROADCAST, 1, hi())
            .with_via_transport("serial:/dev/ttyUSB0");
        let on_b = Packet::new(NetworkSource::NetB, NodeId(5), BROADCAST, 2, hi())
            .with_via_transport("tcp:10.0.0.2:4403");
        assert_eq!(Fingerprint::of_packet(&on_a), Fingerprint::of_packet(&on_b));
    }

    #[test]
    fn test_outbound_matches_echo() {
        let message = OutboundMessage::text(NetworkSource::NetA, NodeId(0x10), BROADCAST, "pong");
        let echo = Packet::new(
            NetworkSource::NetA,
            NodeId(0x10),
            BROADCAST,
            77,
            Payload::Text("pong".into()),
        );
        assert_eq!(Fingerprint::of_outbound(&message), Fingerprint::of_packet(&echo));
    }

    #[test]
    fn test_first_occurrence_wins() {
        let mut engine = DedupEngine::default();
        let start = Instant::now();
        assert!(engine.should_process_at(fp(1, "a"), start));
        for i in 1..5 {
            let later = start + Duration::from_millis(i * 100);
            assert!(!engine.should_process_at(fp(1, "a"), later));
        }
        let stats = engine.stats();
        assert_eq!(stats.checked, 5);
        assert_eq!(stats.duplicates, 4);
    }

    #[test]
    fn test_window_expiry() {
        let mut engine = DedupEngine::new(Duration::from_secs(5), 16);
        let start = Instant::now();

        assert!(engine.should_process_at(fp(1, "a"), start));
        assert!(!engine.should_process_at(fp(1, "a"), start + Duration::from_millis(500)));
        assert!(engine.should_process_at(fp(1, "a"), start + Duration::from_secs(10)));
        assert_eq!(engine.stats().expired, 1);
    }

    #[test]
    fn test_lookup_does_not_refresh() {
        let mut engine = DedupEngine::new(Duration::from_secs(5), 16);
        let start = Instant::now();

        assert!(engine.should_process_at(fp(1, "a"), start));
        // Repeats inside the window do not extend it
        assert!(!engine.should_process_at(fp(1, "a"), start + Duration::from_secs(4)));
        assert!(engine.should_process_at(fp(1, "a"), start + Duration::from_secs(6)));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut engine = DedupEngine::new(Duration::from_secs(60), 2);
        let start = Instant::now();

        assert!(engine.should_process_at(fp(1, "a"), start));
        assert!(engine.should_process_at(fp(2, "b"), start));
        assert!(engine.should_process_at(fp(3, "c"), start));
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.stats().capacity_evictions, 1);

        // Oldest went first
        assert!(!engine.contains(&fp(1, "a")));
        assert!(engine.contains(&fp(2, "b")));
    }

    #[test]
    fn test_record_outbound_suppresses_echo() {
        let mut engine = DedupEngine::default();
        let start = Instant::now();
        let message =
            OutboundMessage::text(NetworkSource::NetB, NodeId(0x10), BROADCAST, "weather: sunny");

        engine.record_outbound_at(&message, start);
        assert!(!engine.should_process_at(
            Fingerprint::of_outbound(&message),
            start + Duration::from_secs(2)
        ));
        assert_eq!(engine.stats().outbound_recorded, 1);
    }

    #[test]
    fn test_forget() {
        let mut engine = DedupEngine::default();
        let now = Instant::now();
        assert!(engine.should_process_at(fp(1, "a"), now));
        assert!(engine.forget(&fp(1, "a")));
        assert!(!engine.forget(&fp(1, "a")));
        assert!(engine.should_process_at(fp(1, "a"), now));
    }

    #[test]
    fn test_duplicate_rate() {
        let mut engine = DedupEngine::default();
        let now = Instant::now();
        engine.should_process_at(fp(1, "a"), now);
        engine.should_process_at(fp(1, "a"), now);
        assert!((engine.stats().duplicate_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(DedupStats::default().duplicate_rate(), 0.0);
    }
}
