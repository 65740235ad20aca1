use anyhow::Result;
use std::collections::BTreeMap;
use sysinfo::Networks;

/// Cumulative bytes for one interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub recv: u64,
    pub sent: u64,
}

impl Counters {
    #[inline]
    #[must_use]
    pub fn new(recv: u64, sent: u64) -> Self {
        Self { recv, sent }
    }

    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.recv == 0 && self.sent == 0
    }
}

/// Interface name to counters, ordered by name.
pub type Snapshot = BTreeMap<String, Counters>;

pub trait CounterSource {
    fn read(&mut self) -> Result<Snapshot>;
}

/// Counters as reported by the operating system.
pub struct SystemCounters {
    networks: Networks,
}

impl SystemCounters {
    #[must_use]
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SystemCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for SystemCounters {
    fn read(&mut self) -> Result<Snapshot> {
        // also picks up interfaces that came and went since the last read
        self.networks.refresh_list();
        let mut snapshot = Snapshot::new();
        for (name, data) in &self.networks {
            snapshot.insert(
                name.clone(),
                Counters::new(data.total_received(), data.total_transmitted()),
            );
        }
        Ok(snapshot)
    }
}
