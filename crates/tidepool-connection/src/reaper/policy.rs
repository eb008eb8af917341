//! Kill decision

use std::fmt;

use super::facts::{ServerConnectionLimit, ServerConnectionUsage};

/// Thresholds that drive the kill decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReapPolicy {
    utilization_threshold: f64,
    zombie_min_timeout_secs: u64,
    zombie_max_timeout_secs: u64,
}

/// Why sessions are being killed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapReason {
    /// Usage is above the utilization threshold
    HighUtilization,
    /// Some session has been idle longer than the maximum timeout
    MaxTimeoutExceeded,
}

impl fmt::Display for ReapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReapReason::HighUtilization => f.write_str("high utilization"),
            ReapReason::MaxTimeoutExceeded => f.write_str("max timeout exceeded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapDecision {
    Skip,
    /// Kill every sleeping session of the user idle at least `min_idle_secs`
    KillIdleSince {
        min_idle_secs: u64,
        reason: ReapReason,
    },
}

impl ReapPolicy {
    /// `zombie_max_timeout_secs` is raised to `zombie_min_timeout_secs` if
    /// it is smaller.
    pub fn new(
        utilization_threshold: f64,
        zombie_min_timeout_secs: u64,
        zombie_max_timeout_secs: u64,
    ) -> Self {
        Self {
            utilization_threshold,
            zombie_min_timeout_secs,
            zombie_max_timeout_secs: zombie_max_timeout_secs.max(zombie_min_timeout_secs),
        }
    }

    pub fn utilization_threshold(&self) -> f64 {
        self.utilization_threshold
    }

    pub fn zombie_min_timeout_secs(&self) -> u64 {
        self.zombie_min_timeout_secs
    }

    pub fn zombie_max_timeout_secs(&self) -> u64 {
        self.zombie_max_timeout_secs
    }

    pub fn decide(
        &self,
        limit: &ServerConnectionLimit,
        usage: &ServerConnectionUsage,
    ) -> ReapDecision {
        let max_age = usage.max_idle_secs;

        match usage.utilization(limit) {
            Some(utilization) if utilization > self.utilization_threshold => {
                let age = max_age.clamp(self.zombie_min_timeout_secs, self.zombie_max_timeout_secs);
                if max_age >= age {
                    ReapDecision::KillIdleSince {
                        min_idle_secs: age,
                        reason: ReapReason::HighUtilization,
                    }
                } else {
                    ReapDecision::Skip
                }
            }
            _ if max_age > self.zombie_max_timeout_secs => ReapDecision::KillIdleSince {
                min_idle_secs: self.zombie_max_timeout_secs,
                reason: ReapReason::MaxTimeoutExceeded,
            },
            _ => ReapDecision::Skip,
        }
    }
}

impl Default for ReapPolicy {
    fn default() -> Self {
        Self::new(0.8, 3, 900)
    }
}
