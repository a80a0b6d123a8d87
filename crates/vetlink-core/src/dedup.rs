//! Time-windowed duplicate suppression.
//!
//! The notification stream may deliver the same event twice: once as a named
//! event and once as a generic one, or again after a reconnect. An event
//! whose key was accepted less than `window` ago is rejected. Keys older than
//! `retention` are pruned on every check so memory stays bounded by the event
//! rate.
//!
//! Only accepted events refresh the timestamp. A burst of duplicates therefore
//! cannot keep a key suppressed forever.

use std::{collections::HashMap, hash::Hash, ops::Sub, time::Duration};

/// Default suppression window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3);

/// Default key retention.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10);

/// Dedup timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupConfig {
    /// Repeats within this window are rejected
    pub window: Duration,
    /// Keys older than this are forgotten
    pub retention: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { window: DEFAULT_WINDOW, retention: DEFAULT_RETENTION }
    }
}

/// Remembers recently accepted keys.
///
/// # Invariants
///
/// - Every stored timestamp is younger than `retention` after a `check`.
/// - `retention >= window` is assumed; a shorter retention shrinks the
///   effective window to the retention.
#[derive(Debug, Clone)]
pub struct DedupFilter<K, I> {
    config: DedupConfig,
    seen: HashMap<K, I>,
}

impl<K, I> DedupFilter<K, I>
where
    K: Eq + Hash,
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create an empty filter.
    pub fn new(config: DedupConfig) -> Self {
        Self { config, seen: HashMap::new() }
    }

    /// Returns `true` if the event is new and should be processed.
    pub fn check(&mut self, key: K, now: I) -> bool {
        self.prune(now);

        if let Some(&accepted) = self.seen.get(&key)
            && now - accepted < self.config.window
        {
            return false;
        }

        self.seen.insert(key, now);
        true
    }

    /// Number of remembered keys.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no keys are remembered.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.seen.clear();
    }

    fn prune(&mut self, now: I) {
        let retention = self.config.retention;
        self.seen.retain(|_, accepted| now - *accepted < retention);
    }
}
