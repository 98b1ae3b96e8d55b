//! # Maintenance Coordinator
//!
//! Two independent flags packed into one `AtomicU8`:
//!
//! | enabled | vacuuming | phase                  |
//! |---------|-----------|------------------------|
//! | false   | false     | `Normal`               |
//! | true    | false     | `Maintenance`          |
//! | true    | true      | `MaintenanceVacuuming` |
//! | false   | true      | `VacuumingOnly`        |
//!
//! Every transition is a single read-modify-write on the byte, so "disable
//! unless vacuuming" cannot interleave with a concurrent `begin_vacuum`.
//!
//! Only `enabled` gates traffic. A running vacuum blocks nothing by itself;
//! it only forbids turning maintenance off.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CoreError, Result};

const ENABLED: u8 = 0b01;
const VACUUMING: u8 = 0b10;

/// Paths that stay reachable while maintenance is enabled.
const ALWAYS_ALLOWED: &[&str] = &["/api/maintenance", "/api/logs/vacuum"];

/// Ingestion and query paths that maintenance mode shuts off.
const PROTECTED: &[&str] = &["/v1/logs", "/api/logs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceStatus {
    pub enabled: bool,
    pub vacuum_in_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Normal,
    Maintenance,
    MaintenanceVacuuming,
    VacuumingOnly,
}

/// Process-wide maintenance state. Starts in `Normal`; never persisted.
#[derive(Debug, Default)]
pub struct MaintenanceMode {
    flags: AtomicU8,
}

impl MaintenanceMode {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&self) -> u8 {
        self.flags.load(Ordering::Acquire)
    }

    /// Turn maintenance on. Always succeeds.
    pub fn enable(&self) {
        let prev = self.flags.fetch_or(ENABLED, Ordering::AcqRel);
        if prev & ENABLED == 0 {
            info!("Maintenance mode enabled");
        }
    }

    /// Turn maintenance off, unless a vacuum is running.
    pub fn disable(&self) -> Result<()> {
        let prev = self
            .flags
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |flags| {
                if flags & VACUUMING != 0 {
                    None
                } else {
                    Some(flags & !ENABLED)
                }
            })
            .map_err(|_| CoreError::MaintenanceConflict)?;
        if prev & ENABLED != 0 {
            info!("Maintenance mode disabled");
        }
        Ok(())
    }

    /// Mark a vacuum as started. Returns false if one was already running.
    pub fn begin_vacuum(&self) -> bool {
        let prev = self.flags.fetch_or(VACUUMING, Ordering::AcqRel);
        prev & VACUUMING == 0
    }

    pub fn end_vacuum(&self) {
        self.flags.fetch_and(!VACUUMING, Ordering::AcqRel);
    }

    /// Claim the vacuum slot for the lifetime of the returned guard.
    pub fn try_begin_vacuum(self: &Arc<Self>) -> Result<VacuumGuard> {
        if self.begin_vacuum() {
            Ok(VacuumGuard {
                mode: Arc::clone(self),
            })
        } else {
            Err(CoreError::VacuumInProgress)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.load() & ENABLED != 0
    }

    pub fn is_vacuum_in_progress(&self) -> bool {
        self.load() & VACUUMING != 0
    }

    /// Both flags from a single load.
    pub fn status(&self) -> MaintenanceStatus {
        let flags = self.load();
        MaintenanceStatus {
            enabled: flags & ENABLED != 0,
            vacuum_in_progress: flags & VACUUMING != 0,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.load() & (ENABLED | VACUUMING) {
            0 => Phase::Normal,
            ENABLED => Phase::Maintenance,
            VACUUMING => Phase::VacuumingOnly,
            _ => Phase::MaintenanceVacuuming,
        }
    }

    /// Whether a request for `path` must be refused right now.
    pub fn blocks(&self, path: &str) -> bool {
        self.is_enabled() && is_protected_path(path)
    }
}

/// Whether `path` is shut off while maintenance is enabled.
pub fn is_protected_path(path: &str) -> bool {
    if ALWAYS_ALLOWED.iter().any(|p| matches_prefix(path, p)) {
        return false;
    }
    PROTECTED.iter().any(|p| matches_prefix(path, p))
}

/// `prefix` itself or anything below it, segment-wise.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Clears the vacuuming flag on drop, including on error and panic paths.
#[derive(Debug)]
pub struct VacuumGuard {
    mode: Arc<MaintenanceMode>,
}

impl Drop for VacuumGuard {
    fn drop(&mut self) {
        self.mode.end_vacuum();
    }
}
