//! Bounded audit trail of navigation decisions.

use serde::Serialize;
use sp_core::NavigationTrigger;
use std::collections::VecDeque;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// One decision, as written by the gate. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationAuditEntry {
    pub timestamp: String,
    pub url: String,
    pub trigger_kind: NavigationTrigger,
    pub trigger_name: &'static str,
    pub is_main_frame: bool,
    pub scheme: String,
    pub success: bool,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl NavigationAuditEntry {
    pub fn new(
        url: &str,
        trigger_kind: NavigationTrigger,
        is_main_frame: bool,
        scheme: &str,
        success: bool,
        duration_ms: f64,
        error_reason: Option<String>,
    ) -> Self {
        Self {
            timestamp: now_rfc3339(),
            url: url.to_owned(),
            trigger_kind,
            trigger_name: trigger_kind.label(),
            is_main_frame,
            scheme: scheme.to_owned(),
            success,
            duration_ms: round2(duration_ms),
            error_reason,
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// FIFO ring of audit entries; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct AuditLog {
    entries: VecDeque<NavigationAuditEntry>,
    capacity: usize,
}

impl AuditLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, entry: NavigationAuditEntry) -> &NavigationAuditEntry {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&NavigationAuditEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NavigationAuditEntry> {
        self.entries.iter()
    }

    /// Oldest-first copy of the retained entries.
    pub fn entries(&self) -> Vec<NavigationAuditEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Summary derived from the audit log on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationStats {
    pub total_navigations: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage, rounded to two decimals.
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    /// Running counter kept outside the log, so eviction never lowers it.
    pub suspicious_attempts: u64,
}

impl NavigationStats {
    pub fn from_log(log: &AuditLog, suspicious_attempts: u64) -> Self {
        let total_navigations = log.len();
        let successful = log.iter().filter(|entry| entry.success).count();
        let failed = total_navigations - successful;

        let success_rate = if total_navigations > 0 {
            round2(successful as f64 / total_navigations as f64 * 100.0)
        } else {
            0.0
        };

        let durations: Vec<f64> = log
            .iter()
            .filter(|entry| entry.success && entry.duration_ms > 0.0)
            .map(|entry| entry.duration_ms)
            .collect();
        let avg_duration_ms = if durations.is_empty() {
            0.0
        } else {
            round2(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        Self {
            total_navigations,
            successful,
            failed,
            success_rate,
            avg_duration_ms,
            suspicious_attempts,
        }
    }
}
