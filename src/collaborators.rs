//! Ports for the external collaborators named in spec §1.
//!
//! The outer account lifecycle/connection manager, the mobile 2FA confirmation handler, the
//! localized message catalog, and the on-disk config loader are all out of scope — "referenced
//! by capability only". These traits are that reference surface: narrow enough that a real
//! implementation lives entirely outside this crate, per design note §9 ("replace \[cyclic
//! ownership\] with a back-reference that is never used for lifecycle — the account owns the web
//! client, the web client holds a non-owning handle for callbacks").

use async_trait::async_trait;

use crate::directory::MatchableTypes;

/// Trading preference flags relevant to the announcement/matching engines (spec §4.3.1, §4.4).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradingPreferences {
    pub steam_trade_matcher: bool,
    pub match_actively: bool,
    pub match_everything: bool,
    /// Types the account owner has opted to match (spec §4.3.1: "at least one configured
    /// matchable type is in the accepted set").
    pub matchable_types: MatchableTypes,
}

/// Tokens produced by a session refresh (spec §4.2 refresh protocol).
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub steam_login: String,
    pub steam_login_secure: String,
}

/// Non-owning handle back to the account that owns a [`crate::web::WebClient`] (spec §9).
///
/// Implemented by the out-of-scope `Account`/connection-manager component; this crate only ever
/// holds `Arc<dyn AccountHandle>`.
#[async_trait]
pub trait AccountHandle: Send + Sync {
    fn account_id(&self) -> u64;
    fn universe(&self) -> u8;
    fn is_connected_and_logged_on(&self) -> bool;
    fn has_mobile_two_factor(&self) -> bool;
    fn trading_preferences(&self) -> TradingPreferences;
    fn parental_code(&self) -> Option<String>;
    fn is_limited_account(&self) -> bool;
    fn trade_token(&self) -> String;

    /// Renegotiate session tokens with the identity endpoint. Single-flight at the call site
    /// (spec §4.2 refresh protocol is exclusive).
    async fn refresh_session(&self) -> anyhow::Result<SessionTokens>;

    /// Best-effort group join on logon (spec §4.3 `onLoggedOn`).
    async fn join_group(&self, group_id: u64) -> anyhow::Result<()>;
}

/// The mobile two-factor confirmation handler (spec §1, §4.4.1 step 6).
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm_trade_offers(&self, offer_ids: &[u64]) -> anyhow::Result<()>;
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Minimal [`AccountHandle`] stand-in for tests elsewhere in the crate.
    #[derive(Debug, Clone)]
    pub struct FakeAccount {
        pub account_id: u64,
        pub connected: bool,
        pub limited: bool,
    }

    impl Default for FakeAccount {
        fn default() -> Self {
            Self {
                account_id: 76561197960287930,
                connected: true,
                limited: false,
            }
        }
    }

    #[async_trait]
    impl AccountHandle for FakeAccount {
        fn account_id(&self) -> u64 {
            self.account_id
        }
        fn universe(&self) -> u8 {
            1
        }
        fn is_connected_and_logged_on(&self) -> bool {
            self.connected
        }
        fn has_mobile_two_factor(&self) -> bool {
            true
        }
        fn trading_preferences(&self) -> TradingPreferences {
            TradingPreferences {
                steam_trade_matcher: true,
                match_actively: true,
                match_everything: false,
                matchable_types: MatchableTypes {
                    cards: true,
                    ..Default::default()
                },
            }
        }
        fn parental_code(&self) -> Option<String> {
            None
        }
        fn is_limited_account(&self) -> bool {
            self.limited
        }
        fn trade_token(&self) -> String {
            "fake-trade-token".into()
        }
        async fn refresh_session(&self) -> anyhow::Result<SessionTokens> {
            Ok(SessionTokens {
                steam_login: "fake-login".into(),
                steam_login_secure: "fake-login-secure".into(),
            })
        }
        async fn join_group(&self, _group_id: u64) -> anyhow::Result<()> {
            Ok(())
        }
    }
}
