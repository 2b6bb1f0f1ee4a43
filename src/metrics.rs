//! Lightweight global metrics for QuiverGist.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - WAL
//! - Vacuum (scan / unlink)
//! - Free-space map

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

// ----- WAL -----
static WAL_APPENDS_TOTAL: AtomicU64 = AtomicU64::new(0);
static WAL_BYTES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static WAL_FSYNC_CALLS: AtomicU64 = AtomicU64::new(0);
static WAL_TRUNCATIONS: AtomicU64 = AtomicU64::new(0);

// ----- Vacuum -----
static VACUUM_PASSES: AtomicU64 = AtomicU64::new(0);
static VACUUM_PAGES_SCANNED: AtomicU64 = AtomicU64::new(0);
static VACUUM_PAGES_REVISITED: AtomicU64 = AtomicU64::new(0);
static VACUUM_TUPLES_REMOVED: AtomicU64 = AtomicU64::new(0);
static VACUUM_LEAVES_UNLINKED: AtomicU64 = AtomicU64::new(0);
static VACUUM_UNLINKS_SKIPPED: AtomicU64 = AtomicU64::new(0);
static VACUUM_INVALID_TUPLES: AtomicU64 = AtomicU64::new(0);

// ----- Free-space map -----
static FSM_PAGES_RECORDED: AtomicU64 = AtomicU64::new(0);
static FSM_PAGES_REUSED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    // WAL
    pub wal_appends_total: u64,
    pub wal_bytes_written: u64,
    pub wal_fsync_calls: u64,
    pub wal_truncations: u64,

    // Vacuum
    pub vacuum_passes: u64,
    pub vacuum_pages_scanned: u64,
    pub vacuum_pages_revisited: u64,
    pub vacuum_tuples_removed: u64,
    pub vacuum_leaves_unlinked: u64,
    pub vacuum_unlinks_skipped: u64,
    pub vacuum_invalid_tuples: u64,

    // FSM
    pub fsm_pages_recorded: u64,
    pub fsm_pages_reused: u64,
}

impl MetricsSnapshot {
    /// Доля повторных визитов (rightlink после конкурентного split) среди всех просмотренных страниц.
    pub fn revisit_ratio(&self) -> f64 {
        if self.vacuum_pages_scanned == 0 {
            0.0
        } else {
            self.vacuum_pages_revisited as f64 / self.vacuum_pages_scanned as f64
        }
    }
}

// ----- Recorders (WAL) -----
pub fn record_wal_append(bytes: usize) {
    WAL_APPENDS_TOTAL.fetch_add(1, Ordering::Relaxed);
    WAL_BYTES_WRITTEN.fetch_add(bytes as u64, Ordering::Relaxed);
}

pub fn record_wal_fsync() {
    WAL_FSYNC_CALLS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_wal_truncation() {
    WAL_TRUNCATIONS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Vacuum) -----
pub fn record_vacuum_pass() {
    VACUUM_PASSES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_vacuum_page_scanned(revisit: bool) {
    VACUUM_PAGES_SCANNED.fetch_add(1, Ordering::Relaxed);
    if revisit {
        VACUUM_PAGES_REVISITED.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_vacuum_tuples_removed(n: usize) {
    VACUUM_TUPLES_REMOVED.fetch_add(n as u64, Ordering::Relaxed);
}

pub fn record_vacuum_leaf_unlinked() {
    VACUUM_LEAVES_UNLINKED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_vacuum_unlink_skipped() {
    VACUUM_UNLINKS_SKIPPED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_vacuum_invalid_tuple() {
    VACUUM_INVALID_TUPLES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (FSM) -----
pub fn record_fsm_page_recorded() {
    FSM_PAGES_RECORDED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_fsm_page_reused() {
    FSM_PAGES_REUSED.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        wal_appends_total: WAL_APPENDS_TOTAL.load(Ordering::Relaxed),
        wal_bytes_written: WAL_BYTES_WRITTEN.load(Ordering::Relaxed),
        wal_fsync_calls: WAL_FSYNC_CALLS.load(Ordering::Relaxed),
        wal_truncations: WAL_TRUNCATIONS.load(Ordering::Relaxed),

        vacuum_passes: VACUUM_PASSES.load(Ordering::Relaxed),
        vacuum_pages_scanned: VACUUM_PAGES_SCANNED.load(Ordering::Relaxed),
        vacuum_pages_revisited: VACUUM_PAGES_REVISITED.load(Ordering::Relaxed),
        vacuum_tuples_removed: VACUUM_TUPLES_REMOVED.load(Ordering::Relaxed),
        vacuum_leaves_unlinked: VACUUM_LEAVES_UNLINKED.load(Ordering::Relaxed),
        vacuum_unlinks_skipped: VACUUM_UNLINKS_SKIPPED.load(Ordering::Relaxed),
        vacuum_invalid_tuples: VACUUM_INVALID_TUPLES.load(Ordering::Relaxed),

        fsm_pages_recorded: FSM_PAGES_RECORDED.load(Ordering::Relaxed),
        fsm_pages_reused: FSM_PAGES_REUSED.load(Ordering::Relaxed),
    }
}

