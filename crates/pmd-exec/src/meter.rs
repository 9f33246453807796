//! Resource sampling of a process and the grandchildren it reports.
//!
//! CPU is reported in percent of one core over the time since the previous sample,
//! so the first sample of a pid reads zero.
use std::{fs, iter};

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

use pmd_core::Pid;
use pmd_model::ProcessStats;

/// Samples a main pid plus any grandchildren reported by the process.
pub struct Meter {
    system: System,
    main: Option<Pid>,
    tracked: Vec<Pid>,
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

impl Meter {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            main: None,
            tracked: Vec::new(),
        }
    }

    pub fn attach(&mut self, pid: Pid) {
        self.main = Some(pid);
    }

    /// Adds a grandchild to the accounting.
    pub fn track(&mut self, pid: Pid) {
        if Some(pid) != self.main && !self.tracked.contains(&pid) {
            debug!(target: "pmd.exec.meter", pid, "tracking external process");
            self.tracked.push(pid);
        }
    }

    pub fn tracked(&self) -> &[Pid] {
        &self.tracked
    }

    pub fn sample(&mut self) -> ProcessStats {
        let mut stats = ProcessStats::default();
        let Some(main) = self.main else {
            return stats;
        };

        let pids: Vec<sysinfo::Pid> = iter::once(main)
            .chain(self.tracked.iter().copied())
            .map(to_sysinfo)
            .collect();
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&pids),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );

        if let Some(sample) = self.sample_pid(main) {
            stats.merge(&sample);
        }
        let mut alive = Vec::with_capacity(self.tracked.len());
        for pid in std::mem::take(&mut self.tracked) {
            if let Some(sample) = self.sample_pid(pid) {
                stats.merge(&sample);
                alive.push(pid);
            }
        }
        self.tracked = alive;
        stats
    }

    fn sample_pid(&self, pid: Pid) -> Option<ProcessStats> {
        let process = self.system.process(to_sysinfo(pid))?;
        Some(ProcessStats {
            cpu: f64::from(process.cpu_usage()),
            rss: process.memory(),
            vms: process.virtual_memory(),
            swap: swap_of(pid).unwrap_or(0),
        })
    }
}

fn to_sysinfo(pid: Pid) -> sysinfo::Pid {
    sysinfo::Pid::from_u32(pid.unsigned_abs())
}

/// `VmSwap` of `/proc/<pid>/status` in bytes; sysinfo has no per-process swap.
fn swap_of(pid: Pid) -> Option<u64> {
    parse_swap(&fs::read_to_string(format!("/proc/{pid}/status")).ok()?)
}

pub(crate) fn parse_swap(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|l| l.strip_prefix("VmSwap:"))
        .and_then(|v| v.split_whitespace().next()?.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}
