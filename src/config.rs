//! Process-wide configuration.
//!
//! The on-disk loader (file discovery, hot reload, schema migration) is an external collaborator
//! per spec §1 — this is just the recognized-options contract plus an env-var convenience
//! constructor, in the shape of the teacher's `SessionConfig::from_env()`
//! (`scrapers/binance_session.rs`).

use std::time::Duration;

/// Recognized global config options (spec §6).
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    /// Turns on IPC auth middleware when present. The IPC layer itself is out of scope; this
    /// flag is carried only so the contract matches spec §6.
    pub ipc_password: Option<String>,

    /// Seconds of stagger applied per account before the first active-match tick
    /// (spec §4.4: `initial delay = 1h + loadBalancingDelay * accountCount seconds`).
    pub load_balancing_delay: Duration,

    /// Seconds the global inventory-fetch semaphore is held after a request completes,
    /// in addition to releasing immediately (spec §4.2 inventory fetch).
    pub inventory_limiter_delay: Duration,

    /// Milliseconds the per-service rate guard is held before being released in the background
    /// (spec §4.5). Zero bypasses both guards.
    pub web_limiter_delay: Duration,

    /// Per-request timeout applied to every HTTP call (spec §5).
    pub connection_timeout: Duration,

    /// Outbound proxy for all web requests, if any.
    pub web_proxy: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            ipc_password: None,
            load_balancing_delay: Duration::from_secs(0),
            inventory_limiter_delay: Duration::from_secs(0),
            web_limiter_delay: Duration::from_millis(0),
            connection_timeout: Duration::from_secs(100),
            web_proxy: None,
        }
    }
}

impl GlobalConfig {
    /// Load from environment, falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("IPCPassword") {
            if !v.is_empty() {
                config.ipc_password = Some(v);
            }
        }
        if let Ok(v) = std::env::var("LoadBalancingDelay") {
            if let Ok(secs) = v.parse() {
                config.load_balancing_delay = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("InventoryLimiterDelay") {
            if let Ok(secs) = v.parse() {
                config.inventory_limiter_delay = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("WebLimiterDelay") {
            if let Ok(ms) = v.parse() {
                config.web_limiter_delay = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var("ConnectionTimeout") {
            if let Ok(secs) = v.parse() {
                config.connection_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("WebProxy") {
            if !v.is_empty() {
                config.web_proxy = Some(v);
            }
        }

        config
    }

    /// session-validity-window default: one-sixth of the connection timeout (spec §4.2).
    pub fn session_validity_window(&self) -> Duration {
        self.connection_timeout / 6
    }
}

/// Tunable constants (spec §6), kept as plain `const`s rather than config fields since the spec
/// fixes their values.
pub mod constants {
    use std::time::Duration;

    pub const MAX_MATCHED_BOTS_HARD: usize = 40;
    pub const MAX_MATCHED_BOTS_SOFT: u32 = 20;
    pub const MAX_MATCHING_ROUNDS: u32 = 10;
    pub const MIN_ANNOUNCEMENT_CHECK_TTL: Duration = Duration::from_secs(6 * 3600);
    pub const MIN_HEARTBEAT_TTL: Duration = Duration::from_secs(10 * 60);
    pub const MIN_ITEMS_COUNT: usize = 100;
    pub const MIN_PERSONA_STATE_TTL: Duration = Duration::from_secs(8 * 3600);
    pub const MAX_ITEMS_IN_SINGLE_INVENTORY_REQUEST: u32 = 5000;
    pub const ACTIVE_MATCH_PERIOD: Duration = Duration::from_secs(8 * 3600);
    pub const ACTIVE_MATCH_ROUND_DELAY: Duration = Duration::from_secs(5 * 60);
    pub const TRIES_BLACKLISTED: u8 = 255;
    pub const DEFAULT_MAX_TRIES: u32 = 3;
    /// Items (either side) a single trade-offer request may carry before it must be split into
    /// multiple sub-trades (spec §4.2 trade submission).
    pub const MAX_ITEMS_PER_TRADE_OFFER: usize = 255;
    /// Trade attempts per candidate within one matching round (spec §4.4.1 step 6: "for up to
    /// trades-per-account iterations"; the spec leaves the exact count to the implementation).
    pub const TRADES_PER_ACCOUNT: u32 = 5;
    /// Ceiling on the number of sub-trade-offers a single fair exchange may be split into when it
    /// exceeds [`MAX_ITEMS_PER_TRADE_OFFER`] (spec §4.2 trade submission: "split into additional
    /// trades up to per-account max"). The spec leaves the exact count to the platform's current
    /// limits; picked generously since a well-formed exchange from the matcher never approaches
    /// this ceiling (each attempt is already capped below one trade-offer's worth of items).
    pub const MAX_TRADE_OFFERS_PER_SUBMISSION: usize = 5;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = GlobalConfig::default();
        assert_eq!(config.session_validity_window(), Duration::from_secs(16));
        assert!(config.ipc_password.is_none());
    }

    #[test]
    fn session_validity_window_is_one_sixth_of_timeout() {
        let mut config = GlobalConfig::default();
        config.connection_timeout = Duration::from_secs(60);
        assert_eq!(config.session_validity_window(), Duration::from_secs(10));
    }
}
