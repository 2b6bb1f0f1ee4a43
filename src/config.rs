//! Centralized configuration and builder for QuiverGist.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - GistConfig::from_env() reads QG_* env vars; ConfigBuilder overrides them.
//!
//! Defaults:
//! - wal_fsync = true (every WAL append is durable before the page is written back)
//! - data_fsync = false (durability of data segments relies on WAL + checkpoint)
//! - vacuum_cost_delay_ms = 0 (vacuum never sleeps unless asked to)
//! - vacuum_cost_limit = 200 pages between sleeps

use std::fmt;

/// Top-level configuration for an opened index.
#[derive(Clone, Debug)]
pub struct GistConfig {
    /// fsync the WAL file after every appended record.
    /// Env: QG_WAL_FSYNC (default true; "0|false|off|no" => false)
    pub wal_fsync: bool,

    /// fsync data segments when dirty pages are written back.
    /// Env: QG_DATA_FSYNC (default false; "1|true|on|yes" => true)
    pub data_fsync: bool,

    /// Sleep duration at a vacuum delay point, in milliseconds (0 disables).
    /// Env: QG_VACUUM_COST_DELAY_MS (default 0)
    pub vacuum_cost_delay_ms: u64,

    /// Number of visited pages between two vacuum sleeps.
    /// Env: QG_VACUUM_COST_LIMIT (default 200, minimum 1)
    pub vacuum_cost_limit: u64,
}

impl Default for GistConfig {
    fn default() -> Self {
        Self {
            wal_fsync: true,
            data_fsync: false,
            vacuum_cost_delay_ms: 0,
            vacuum_cost_limit: 200,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        let s = v.trim().to_ascii_lowercase();
        s == "1" || s == "true" || s == "on" || s == "yes"
    })
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
}

impl GistConfig {
    /// Load configuration from environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(on) = env_flag("QG_WAL_FSYNC") {
            cfg.wal_fsync = on;
        }
        if let Some(on) = env_flag("QG_DATA_FSYNC") {
            cfg.data_fsync = on;
        }
        if let Some(ms) = env_u64("QG_VACUUM_COST_DELAY_MS") {
            cfg.vacuum_cost_delay_ms = ms;
        }
        if let Some(n) = env_u64("QG_VACUUM_COST_LIMIT") {
            cfg.vacuum_cost_limit = n.max(1);
        }

        cfg
    }
}

impl fmt::Display for GistConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GistConfig {{ \
             wal_fsync: {}, \
             data_fsync: {}, \
             vacuum_cost_delay_ms: {}, \
             vacuum_cost_limit: {} \
             }}",
            self.wal_fsync, self.data_fsync, self.vacuum_cost_delay_ms, self.vacuum_cost_limit,
        )
    }
}

/// Lightweight builder that produces a GistConfig.
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    cfg: GistConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        // Start from env to preserve current behavior, then allow overrides.
        Self {
            cfg: GistConfig::from_env(),
        }
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: GistConfig::default(),
        }
    }

    pub fn wal_fsync(mut self, on: bool) -> Self {
        self.cfg.wal_fsync = on;
        self
    }

    pub fn data_fsync(mut self, on: bool) -> Self {
        self.cfg.data_fsync = on;
        self
    }

    pub fn vacuum_cost_delay_ms(mut self, ms: u64) -> Self {
        self.cfg.vacuum_cost_delay_ms = ms;
        self
    }

    pub fn vacuum_cost_limit(mut self, pages: u64) -> Self {
        self.cfg.vacuum_cost_limit = pages.max(1);
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> GistConfig {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let cfg = ConfigBuilder::from_default()
            .wal_fsync(false)
            .vacuum_cost_delay_ms(5)
            .vacuum_cost_limit(0)
            .build();
        assert!(!cfg.wal_fsync);
        assert!(!cfg.data_fsync);
        assert_eq!(cfg.vacuum_cost_delay_ms, 5);
        // limit is clamped so the throttle never divides by zero
        assert_eq!(cfg.vacuum_cost_limit, 1);
    }

    #[test]
    fn display_lists_all_fields() {
        let s = GistConfig::default().to_string();
        assert!(s.contains("wal_fsync: true"));
        assert!(s.contains("vacuum_cost_limit: 200"));
    }
}
