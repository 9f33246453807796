use serde::{Deserialize, Serialize};

/// Resource snapshot of a live process and the grandchildren it tracks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessStats {
    /// CPU usage since the previous sample, in percent of one core.
    pub cpu: f64,
    /// Resident set size, bytes.
    pub rss: u64,
    /// Virtual memory size, bytes.
    pub vms: u64,
    /// Swapped out memory, bytes.
    pub swap: u64,
}

impl ProcessStats {
    /// Adds another process' usage to this one.
    pub fn merge(&mut self, other: &ProcessStats) {
        self.cpu += other.cpu;
        self.rss += other.rss;
        self.vms += other.vms;
        self.swap += other.swap;
    }
}
