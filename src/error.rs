//! Typed error seams.
//!
//! `anyhow` carries narration for the application layer, but the web client and the engines
//! built on top of it need to branch on *kind* (session expired vs. 4xx vs. network failure),
//! so the seam types are a small `thiserror` enum instead of string matching on an `anyhow::Error`.

use thiserror::Error;

/// Failure categories a [`crate::web::WebClient`] request can resolve to.
///
/// Mirrors spec §7: input validation is never retried, network failure is tri-valued for the
/// announcement engine, 4xx disables heartbeats, session-expiry and profile-redirect trigger
/// their own retry policies one level up in [`crate::web::client`].
#[derive(Debug, Error)]
pub enum WebError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("client error {status}: {url}")]
    ClientError4xx { status: u16, url: String },

    #[error("session expired")]
    SessionExpired,

    #[error("profile redirect anomaly")]
    ProfileRedirect,

    #[error("exhausted retries for {0}")]
    RetriesExhausted(&'static str),

    #[error("decode failure: {0}")]
    Decode(String),

    #[error("session refresh failed: {0}")]
    RefreshFailed(String),
}

impl WebError {
    /// True for the "network failure" category the announcement engine treats as
    /// "stop heartbeats without recording check" (spec §4.3.1, §7).
    pub fn is_network_failure(&self) -> bool {
        matches!(self, WebError::Network(_))
    }
}

/// Tri-valued result for eligibility sub-checks (spec §4.3.1): each check is `true`, `false`,
/// or "network failure", and network failure propagates without recording the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    True,
    False,
    NetworkFailure,
}

impl TriState {
    pub fn from_result(result: &Result<bool, WebError>) -> TriState {
        match result {
            Ok(true) => TriState::True,
            Ok(false) => TriState::False,
            Err(_) => TriState::NetworkFailure,
        }
    }
}
