//! swapfarm-core — session-aware web client, announcement engine, and active item matcher for a
//! card-trading automation bot.
//!
//! Binaries depend on the modules here directly; `swapfarmd` (`src/main.rs`) wires them
//! together into a running process.

pub mod announce;
pub mod cacheable;
pub mod cancellation;
pub mod collaborators;
pub mod config;
pub mod directory;
pub mod error;
pub mod matcher;
pub mod rate_limiter;
pub mod web;

pub use collaborators::{AccountHandle, Confirmer, SessionTokens, TradingPreferences};
pub use config::GlobalConfig;
pub use error::{TriState, WebError};
