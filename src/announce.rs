//! Announcement / heartbeat engine (spec §4.3).
//!
//! One instance per account. Two clocks drive it: a persona-state callback (pushed by the
//! out-of-scope connection manager) and a plain interval timer for heartbeats — the same
//! two-clock shape the teacher uses for its `binance_session.rs` keepalive plus book-refresh
//! pair, just driving a directory announcement instead of an order book.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::cancellation::CancellationToken;
use crate::collaborators::AccountHandle;
use crate::config::constants::{
    MIN_ANNOUNCEMENT_CHECK_TTL, MIN_HEARTBEAT_TTL, MIN_ITEMS_COUNT, MIN_PERSONA_STATE_TTL,
};
use crate::directory::{AnnounceRequest, DirectoryClient};
use crate::error::TriState;
use crate::web::types::ItemType;
use crate::web::{InventorySource, WebClient};

/// Per-account announcement bookkeeping (spec §3). All timestamps start at the epoch minimum so
/// the very first trigger always proceeds.
#[derive(Debug, Clone)]
pub struct AnnouncementState {
    pub last_announcement_check: DateTime<Utc>,
    pub last_heart_beat: DateTime<Utc>,
    pub last_persona_state_request: DateTime<Utc>,
    pub should_send_heart_beats: bool,
}

impl Default for AnnouncementState {
    fn default() -> Self {
        Self {
            last_announcement_check: DateTime::<Utc>::MIN_UTC,
            last_heart_beat: DateTime::<Utc>::MIN_UTC,
            last_persona_state_request: DateTime::<Utc>::MIN_UTC,
            should_send_heart_beats: false,
        }
    }
}

/// Drives announcements and heartbeats for a single account (spec §4.3).
pub struct AnnouncementEngine {
    account: Arc<dyn AccountHandle>,
    web: Arc<WebClient>,
    directory: Arc<DirectoryClient>,
    guid: String,
    state: RwLock<AnnouncementState>,
    request_guard: AsyncMutex<()>,
}

impl AnnouncementEngine {
    pub fn new(
        account: Arc<dyn AccountHandle>,
        web: Arc<WebClient>,
        directory: Arc<DirectoryClient>,
        guid: impl Into<String>,
    ) -> Self {
        Self {
            account,
            web,
            directory,
            guid: guid.into(),
            state: RwLock::new(AnnouncementState::default()),
            request_guard: AsyncMutex::new(()),
        }
    }

    pub fn state(&self) -> AnnouncementState {
        self.state.read().clone()
    }

    /// §4.3.1 eligibility predicate. Local checks short-circuit on `False`; checks requiring a
    /// network call short-circuit on `NetworkFailure` too, matching the "propagate without
    /// recording" rule (spec §4.3.1, §7).
    pub async fn eligibility(&self) -> TriState {
        if !self.account.has_mobile_two_factor() {
            return TriState::False;
        }
        if !self.account.trading_preferences().steam_trade_matcher {
            return TriState::False;
        }

        if !self.account.trading_preferences().matchable_types.any() {
            return TriState::False;
        }

        let (key_ok, key) = self.web.api_key().await;
        let key_state = if key_ok && !key.is_empty() {
            TriState::True
        } else if key_ok {
            TriState::False
        } else {
            TriState::NetworkFailure
        };
        if key_state != TriState::True {
            return key_state;
        }

        let inventory_public = self
            .web
            .fetch_inventory(self.account.account_id(), &ItemType::ACCEPTED)
            .await;
        TriState::from_result(&inventory_public.map(|_| true))
    }

    /// Persona-state callback: the primary announce gate (spec §4.3).
    pub async fn on_persona_state(&self, nickname: &str, avatar_hash: &str) {
        let now = Utc::now();
        {
            let state = self.state.read();
            if Self::announce_cooldown_active(&state, now) {
                return;
            }
        }

        let _guard = self.request_guard.lock().await;

        {
            let mut state = self.state.write();
            if Self::announce_cooldown_active(&state, now) {
                return;
            }
            state.last_announcement_check = now;
        }

        match self.eligibility().await {
            TriState::True => {}
            TriState::False => return,
            TriState::NetworkFailure => {
                self.disable_heartbeats();
                return;
            }
        }

        let assets = match self
            .web
            .fetch_inventory(self.account.account_id(), &ItemType::ACCEPTED)
            .await
        {
            Ok(assets) => assets,
            Err(e) => {
                warn!(error = %e, "inventory fetch failed during announce");
                self.disable_heartbeats();
                return;
            }
        };

        let tradable: Vec<_> = assets.iter().filter(|a| a.tradable).collect();
        if tradable.len() < MIN_ITEMS_COUNT {
            // Spec §8 boundary scenario 1: below-threshold inventory still disables heartbeats.
            self.disable_heartbeats();
            return;
        }

        let games_count = tradable
            .iter()
            .map(|a| a.real_app_id)
            .collect::<HashSet<_>>()
            .len() as u32;

        let request = AnnounceRequest {
            guid: self.guid.clone(),
            account_id: self.account.account_id(),
            nickname: nickname.to_string(),
            avatar_hash: avatar_hash.to_string(),
            items_count: tradable.len(),
            games_count,
            matchable_types: self.account.trading_preferences().matchable_types.item_types(),
            match_everything: self.account.trading_preferences().match_everything,
            trade_token: self.account.trade_token(),
        };

        match self.directory.announce(request).await {
            Ok(true) => {
                let mut state = self.state.write();
                state.should_send_heart_beats = true;
                state.last_heart_beat = Utc::now();
            }
            Ok(false) => self.disable_heartbeats(),
            Err(e) => warn!(error = %e, "announce request failed"),
        }
    }

    /// Heartbeat tick (spec §4.3): refreshes the persona periodically, then sends a heartbeat if
    /// due.
    pub async fn on_heart_beat<F, Fut>(&self, refresh_persona: F)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let now = Utc::now();
        let should_refresh_persona = {
            let state = self.state.read();
            now > state.last_persona_state_request
                + chrono::Duration::from_std(MIN_PERSONA_STATE_TTL).unwrap()
                && now
                    > state.last_announcement_check
                        + chrono::Duration::from_std(MIN_ANNOUNCEMENT_CHECK_TTL).unwrap()
        };

        if should_refresh_persona {
            self.state.write().last_persona_state_request = now;
            refresh_persona().await;
        }

        let should_heartbeat = {
            let state = self.state.read();
            state.should_send_heart_beats
                && now
                    >= state.last_heart_beat + chrono::Duration::from_std(MIN_HEARTBEAT_TTL).unwrap()
        };
        if !should_heartbeat {
            return;
        }

        let _guard = self.request_guard.lock().await;
        match self
            .directory
            .heartbeat(&self.guid, self.account.account_id())
            .await
        {
            Ok(true) => self.state.write().last_heart_beat = Utc::now(),
            Ok(false) => self.disable_heartbeats(),
            Err(e) => warn!(error = %e, "heartbeat request failed"),
        }
    }

    /// Drives [`Self::on_heart_beat`] on a fixed tick until cancelled (spec §5, §9: "every
    /// long-running entry point accepts a cancellation token"). `refresh_persona` is invoked
    /// fresh on every tick that needs it.
    pub async fn run_heartbeat_loop<F, Fut>(&self, refresh_persona: F, mut cancel: CancellationToken)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(MIN_HEARTBEAT_TTL) => {}
                _ = cancel.cancelled() => {
                    debug!("cancellation requested, stopping heartbeat loop");
                    return;
                }
            }
            self.on_heart_beat(|| refresh_persona()).await;
        }
    }

    /// `onLoggedOn` (spec §4.3): best-effort group join.
    pub async fn on_logged_on(&self, group_id: u64) {
        if let Err(e) = self.account.join_group(group_id).await {
            warn!(error = %e, "failed to join group on logon");
        } else {
            info!(account_id = self.account.account_id(), "joined group on logon");
        }
    }

    fn disable_heartbeats(&self) {
        let mut state = self.state.write();
        state.should_send_heart_beats = false;
        state.last_heart_beat = DateTime::<Utc>::MIN_UTC;
    }

    /// Whether `onPersonaState` should skip re-checking eligibility (spec §4.3): the
    /// announcement-check cooldown hasn't elapsed AND heartbeats are either active or were never
    /// run at all. An account that disabled heartbeats after a prior announce still needs to
    /// re-check once the cooldown elapses, so this is *not* simply "cooldown active".
    fn announce_cooldown_active(state: &AnnouncementState, now: DateTime<Utc>) -> bool {
        let cooldown_active =
            now < state.last_announcement_check + chrono::Duration::from_std(MIN_ANNOUNCEMENT_CHECK_TTL).unwrap();
        let heartbeats_active_or_never_run =
            state.should_send_heart_beats || state.last_heart_beat == DateTime::<Utc>::MIN_UTC;
        cooldown_active && heartbeats_active_or_never_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_active_when_heartbeats_are_running() {
        let mut state = AnnouncementState::default();
        let now = Utc::now();
        state.last_announcement_check = now;
        state.should_send_heart_beats = true;
        state.last_heart_beat = now;
        assert!(AnnouncementEngine::announce_cooldown_active(&state, now));
    }

    #[test]
    fn cooldown_active_when_heartbeats_were_never_run() {
        // Boundary scenario 1 (spec §8): a 99-item account ends up with should_send=false and
        // last_heart_beat still at MIN_UTC. The cooldown must still apply within the TTL window
        // instead of re-running eligibility on every persona-state callback.
        let mut state = AnnouncementState::default();
        let now = Utc::now();
        state.last_announcement_check = now;
        state.should_send_heart_beats = false;
        assert_eq!(state.last_heart_beat, DateTime::<Utc>::MIN_UTC);
        assert!(AnnouncementEngine::announce_cooldown_active(&state, now));
    }

    #[test]
    fn cooldown_not_active_once_disabled_and_cooldown_elapsed() {
        let mut state = AnnouncementState::default();
        state.last_announcement_check = DateTime::<Utc>::MIN_UTC;
        state.should_send_heart_beats = false;
        let now = Utc::now();
        assert!(!AnnouncementEngine::announce_cooldown_active(&state, now));
    }

    #[test]
    fn cooldown_expires_after_the_ttl_window() {
        let mut state = AnnouncementState::default();
        state.last_announcement_check = DateTime::<Utc>::MIN_UTC;
        state.should_send_heart_beats = true;
        let now = Utc::now();
        assert!(!AnnouncementEngine::announce_cooldown_active(&state, now));
    }
}
